/// Command builders for the external tools driven by the workflows.
///
/// Every builder is a pure function from typed parameters to a shell
/// command plus the primary path it will produce; nothing here touches the
/// filesystem or mutates its inputs.
pub mod align;
pub mod peaks;
pub mod quant;
pub mod reads;
pub mod tracks;

use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::config::defs::PipelineError;

/// One invocable tool command and the primary output it declares.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    pub line: String,
    /// Primary output path, used as the stage checkpoint. Absent for
    /// commands that rewrite their input in place or only have side
    /// effects.
    pub output: Option<PathBuf>,
}

impl ToolCommand {
    pub fn new(line: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            line: line.into(),
            output: Some(output.into()),
        }
    }

    pub fn bare(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            output: None,
        }
    }

    /// First word of the command line, for log and error attribution.
    pub fn tool(&self) -> &str {
        self.line.split_whitespace().next().unwrap_or("sh")
    }
}

/// Fails fast if any of the given executables cannot be resolved on PATH.
pub async fn require_tools(tools: &[&str]) -> Result<(), PipelineError> {
    for tool in tools {
        let status = Command::new("sh")
            .arg("-c")
            .arg(format!("command -v {} >/dev/null 2>&1", tool))
            .status()
            .await
            .map_err(|e| PipelineError::ToolExecution {
                tool: tool.to_string(),
                error: e.to_string(),
            })?;
        if !status.success() {
            return Err(PipelineError::InvalidConfig(format!(
                "{} not found on PATH. Is it installed?",
                tool
            )));
        }
    }
    Ok(())
}

pub(crate) fn display(path: &Path) -> String {
    path.display().to_string()
}
