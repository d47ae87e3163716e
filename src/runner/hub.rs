/// Shared track-hub documents.
///
/// Hubs are project-level state: one file per genome, appended to by every
/// sample run on that genome. Appends from concurrently running samples are
/// serialized through an advisory lock file next to the hub document.
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tokio::time::{Duration, sleep};

use crate::config::defs::PipelineError;

const LOCK_RETRY: Duration = Duration::from_millis(250);
const LOCK_ATTEMPTS: u32 = 240;

/// Appends one track entry to the genome's hub document, under its lock.
pub async fn append_track(hub_path: &Path, entry: &str) -> Result<(), PipelineError> {
    if let Some(parent) = hub_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let _lock = HubLock::acquire(&lock_path(hub_path)).await?;
    let mut hub = OpenOptions::new().create(true).append(true).open(hub_path)?;
    writeln!(hub, "{}", entry)?;
    hub.sync_all()?;
    Ok(())
}

/// (Re)writes the genome-browser link page pointing at a hub. Idempotent,
/// not checkpointed.
pub fn write_hub_link(file: &Path, hub_url: &str, genome: &str) -> Result<(), PipelineError> {
    let html = format!(
        "<html><body><a href=\"http://genome.ucsc.edu/cgi-bin/hgTracks?db={0}&hubUrl={1}\">\
         UCSC browser tracks ({0})</a></body></html>\n",
        genome, hub_url
    );
    fs::write(file, html)?;
    Ok(())
}

fn lock_path(hub_path: &Path) -> PathBuf {
    let mut name = hub_path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

/// Advisory lock on a hub file, released on drop.
struct HubLock {
    path: PathBuf,
}

impl HubLock {
    async fn acquire(path: &Path) -> Result<Self, PipelineError> {
        for _ in 0..LOCK_ATTEMPTS {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(_) => {
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => sleep(LOCK_RETRY).await,
                Err(e) => return Err(e.into()),
            }
        }
        Err(PipelineError::LockTimeout(path.display().to_string()))
    }
}

impl Drop for HubLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
