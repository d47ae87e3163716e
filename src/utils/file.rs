use std::fs;
use std::io;
use std::path::Path;

/// Creates a directory (and any missing parents) if it does not exist yet.
pub fn ensure_dir(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)
}

/// Final path component as an owned string, falling back to the full path
/// display for paths without a file name.
pub fn basename(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
