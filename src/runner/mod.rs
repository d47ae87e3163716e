/// Checkpointed execution of external tool commands.
///
/// Each stage of a workflow hands one shell command to the runner together
/// with a checkpoint: either the stage's primary output path, or a stage
/// name for commands whose output equals their input (in-place sorts, plot
/// scripts). A satisfied checkpoint skips execution, which is what makes
/// re-running an interrupted workflow resume where it left off.
pub mod hub;

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, info, warn};
use tokio::process::Command;
use tokio::time::{Duration, sleep};

use crate::config::defs::PipelineError;
use crate::toolkit::ToolCommand;
use crate::utils::file::{basename, ensure_dir};

const LOCK_POLL: Duration = Duration::from_secs(5);
const COMPLETED_DIR: &str = ".completed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Completed,
    /// Checkpoint already satisfied, command not executed.
    Skipped,
    /// Command failed but the stage is failure-tolerant.
    Tolerated,
}

#[derive(Debug, Clone)]
struct CleanupEntry {
    path: PathBuf,
    conditional: bool,
}

pub struct Runner {
    name: String,
    root: PathBuf,
    dry_run: bool,
    cleanup: Vec<CleanupEntry>,
    timestamps_path: PathBuf,
    started: Instant,
}

impl Runner {
    /// Opens a run rooted at the sample directory, creating it if needed.
    pub fn start(name: &str, root: &Path, dry_run: bool) -> Result<Self, PipelineError> {
        ensure_dir(root)?;
        ensure_dir(&root.join(COMPLETED_DIR))?;
        let timestamps_path = root.join(format!("{}_timestamps.tsv", name));
        info!("Starting {} run in {}", name, root.display());
        Ok(Self {
            name: name.to_string(),
            root: root.to_path_buf(),
            dry_run,
            cleanup: Vec::new(),
            timestamps_path,
            started: Instant::now(),
        })
    }

    /// Logs a stage label and records it in the run's timestamp file.
    pub fn timestamp(&mut self, label: &str) {
        info!("{}", label);
        let line = format!(
            "{}\t{}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            label
        );
        let appended = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.timestamps_path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(e) = appended {
            warn!(
                "Could not record timestamp in {}: {}",
                self.timestamps_path.display(),
                e
            );
        }
    }

    /// Runs a command whose checkpoint is its primary output path.
    ///
    /// # Arguments
    /// * `cmd` - Toolkit command; its declared output is the checkpoint.
    /// * `nofail` - Tolerate failure instead of aborting the workflow.
    ///
    /// # Returns
    /// The stage outcome, or the failure that aborts the workflow.
    pub async fn run(
        &mut self,
        cmd: &ToolCommand,
        nofail: bool,
    ) -> Result<StageOutcome, PipelineError> {
        let target = cmd.output.clone().ok_or_else(|| {
            PipelineError::InvalidConfig(format!(
                "command `{}` declares no output; checkpoint it by name",
                cmd.tool()
            ))
        })?;
        let lock_path = self.root.join(format!("lock.{}", basename(&target)));
        self.execute(cmd, &lock_path, Some(&target), None, nofail)
            .await
    }

    /// Runs a command under a named checkpoint, for stages whose output
    /// path equals their input path or that have no single output file.
    pub async fn run_named(
        &mut self,
        cmd: &ToolCommand,
        lock_name: &str,
        nofail: bool,
    ) -> Result<StageOutcome, PipelineError> {
        let lock_path = self.root.join(format!("lock.{}", lock_name));
        self.execute(cmd, &lock_path, None, Some(lock_name), nofail)
            .await
    }

    /// True if a named checkpoint has been recorded by a previous run.
    pub fn named_complete(&self, name: &str) -> bool {
        self.flag_path(name).exists()
    }

    /// Records a named checkpoint.
    pub fn mark_named(&self, name: &str) -> Result<(), PipelineError> {
        fs::write(self.flag_path(name), b"")?;
        Ok(())
    }

    /// Registers an artifact for deletion at successful finalize.
    pub fn clean_add(&mut self, path: &Path, conditional: bool) {
        self.cleanup.push(CleanupEntry {
            path: path.to_path_buf(),
            conditional,
        });
    }

    /// Finalizes the run: deletes registered artifacts unless dry-run.
    pub fn stop(&mut self) -> Result<(), PipelineError> {
        self.timestamp("Run finished");
        if self.dry_run {
            info!(
                "Dry run: keeping {} registered intermediate files",
                self.cleanup.len()
            );
        } else {
            for entry in self.cleanup.drain(..) {
                match fs::remove_file(&entry.path) {
                    Ok(()) => debug!(
                        "Removed {}{}",
                        entry.path.display(),
                        if entry.conditional { " (conditional)" } else { "" }
                    ),
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => warn!("Could not remove {}: {}", entry.path.display(), e),
                }
            }
        }
        info!(
            "{} run completed in {} milliseconds",
            self.name,
            self.started.elapsed().as_millis()
        );
        Ok(())
    }

    fn flag_path(&self, name: &str) -> PathBuf {
        self.root.join(COMPLETED_DIR).join(name)
    }

    fn satisfied(&self, target: Option<&Path>, flag: Option<&str>) -> bool {
        match (target, flag) {
            (Some(path), _) => path.exists(),
            (None, Some(name)) => self.named_complete(name),
            (None, None) => false,
        }
    }

    async fn execute(
        &mut self,
        cmd: &ToolCommand,
        lock_path: &Path,
        target: Option<&Path>,
        flag: Option<&str>,
        nofail: bool,
    ) -> Result<StageOutcome, PipelineError> {
        loop {
            self.wait_for_lock(lock_path).await;
            if self.satisfied(target, flag) {
                debug!("Checkpoint satisfied, skipping `{}`", cmd.tool());
                return Ok(StageOutcome::Skipped);
            }
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(lock_path)
            {
                Ok(_) => break,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }

        debug!("Running: {}", cmd.line);
        let status = Command::new("sh").arg("-c").arg(&cmd.line).status().await;
        // The lock must not outlive this attempt, or a rerun would wait on
        // it forever.
        let _ = fs::remove_file(lock_path);
        let status = status.map_err(|e| PipelineError::ToolExecution {
            tool: cmd.tool().to_string(),
            error: e.to_string(),
        })?;

        if !status.success() {
            return match status.code() {
                // Killed by a signal: user interruption, never tolerated.
                None => Err(PipelineError::Interrupted),
                Some(code) if nofail => {
                    warn!(
                        "{} exited with status {}; stage is tolerant, continuing",
                        cmd.tool(),
                        code
                    );
                    Ok(StageOutcome::Tolerated)
                }
                Some(code) => Err(PipelineError::ToolExecution {
                    tool: cmd.tool().to_string(),
                    error: format!("exited with status {}", code),
                }),
            };
        }

        if let Some(path) = target {
            if !path.exists() {
                warn!(
                    "{} succeeded but declared output {} is missing",
                    cmd.tool(),
                    path.display()
                );
            }
        }
        if let Some(name) = flag {
            self.mark_named(name)?;
        }
        Ok(StageOutcome::Completed)
    }

    async fn wait_for_lock(&self, lock_path: &Path) {
        if !lock_path.exists() {
            return;
        }
        info!(
            "Lock {} held by another process; waiting (remove it if the owner is gone)",
            lock_path.display()
        );
        while lock_path.exists() {
            sleep(LOCK_POLL).await;
        }
    }
}
