use std::fs;

use anyhow::Result;
use tempfile::tempdir;

use ngs_pipelines::config::defs::PipelineError;
use ngs_pipelines::runner::{Runner, StageOutcome};
use ngs_pipelines::toolkit::ToolCommand;

#[tokio::test]
async fn satisfied_checkpoint_skips_execution() -> Result<()> {
    let tmp = tempdir()?;
    let out = tmp.path().join("stage.out");
    let log = tmp.path().join("exec.log");
    let cmd = ToolCommand::new(
        format!("echo ran >> {} && touch {}", log.display(), out.display()),
        &out,
    );

    let mut pipe = Runner::start("test", tmp.path(), false)?;
    assert_eq!(pipe.run(&cmd, false).await?, StageOutcome::Completed);
    assert!(out.exists());
    assert_eq!(fs::read_to_string(&log)?.lines().count(), 1);

    // Second invocation must not re-execute the command.
    assert_eq!(pipe.run(&cmd, false).await?, StageOutcome::Skipped);
    assert_eq!(fs::read_to_string(&log)?.lines().count(), 1);
    Ok(())
}

#[tokio::test]
async fn resume_reexecutes_only_stages_with_missing_checkpoints() -> Result<()> {
    let tmp = tempdir()?;
    let log = tmp.path().join("exec.log");
    let outs: Vec<_> = (1..=3)
        .map(|i| tmp.path().join(format!("stage{}.out", i)))
        .collect();
    let cmds: Vec<_> = outs
        .iter()
        .enumerate()
        .map(|(i, out)| {
            ToolCommand::new(
                format!(
                    "echo stage{} >> {} && touch {}",
                    i + 1,
                    log.display(),
                    out.display()
                ),
                out,
            )
        })
        .collect();

    let mut pipe = Runner::start("test", tmp.path(), false)?;
    for cmd in &cmds {
        pipe.run(cmd, false).await?;
    }
    assert_eq!(fs::read_to_string(&log)?.lines().count(), 3);

    // Simulate an aborted run whose first checkpoint survived.
    fs::remove_file(&outs[1])?;
    fs::remove_file(&outs[2])?;
    let mut resumed = Runner::start("test", tmp.path(), false)?;
    for cmd in &cmds {
        resumed.run(cmd, false).await?;
    }
    let lines: Vec<String> = fs::read_to_string(&log)?
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(lines, vec!["stage1", "stage2", "stage3", "stage2", "stage3"]);
    Ok(())
}

#[tokio::test]
async fn hard_failure_aborts_and_tolerant_failure_continues() -> Result<()> {
    let tmp = tempdir()?;
    let out = tmp.path().join("never.out");
    let cmd = ToolCommand::new(format!("false # {}", out.display()), &out);

    let mut pipe = Runner::start("test", tmp.path(), false)?;
    let err = pipe.run(&cmd, false).await.unwrap_err();
    assert!(matches!(err, PipelineError::ToolExecution { .. }));

    // The same failure under a tolerant stage is logged and swallowed.
    assert_eq!(pipe.run(&cmd, true).await?, StageOutcome::Tolerated);

    // A failed stage leaves no lock behind, so a rerun can retry it.
    assert!(!tmp.path().join("lock.never.out").exists());
    Ok(())
}

#[tokio::test]
async fn named_checkpoints_cover_in_place_outputs() -> Result<()> {
    let tmp = tempdir()?;
    let log = tmp.path().join("exec.log");
    let cmd = ToolCommand::bare(format!("echo sorted >> {}", log.display()));

    let mut pipe = Runner::start("test", tmp.path(), false)?;
    assert_eq!(
        pipe.run_named(&cmd, "sort_index_filtered", false).await?,
        StageOutcome::Completed
    );
    assert!(pipe.named_complete("sort_index_filtered"));
    assert_eq!(
        pipe.run_named(&cmd, "sort_index_filtered", false).await?,
        StageOutcome::Skipped
    );
    assert_eq!(fs::read_to_string(&log)?.lines().count(), 1);
    Ok(())
}

#[tokio::test]
async fn commands_without_output_must_be_named() -> Result<()> {
    let tmp = tempdir()?;
    let mut pipe = Runner::start("test", tmp.path(), false)?;
    let err = pipe
        .run(&ToolCommand::bare("echo no checkpoint"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidConfig(_)));
    Ok(())
}

#[tokio::test]
async fn finalize_deletes_registered_artifacts_unless_dry_run() -> Result<()> {
    let tmp = tempdir()?;
    let keep = tmp.path().join("keep.bam");
    let drop = tmp.path().join("drop.fastq");
    fs::write(&keep, b"")?;
    fs::write(&drop, b"")?;

    let mut dry = Runner::start("test", tmp.path(), true)?;
    dry.clean_add(&drop, true);
    dry.stop()?;
    assert!(drop.exists());

    let mut wet = Runner::start("test", tmp.path(), false)?;
    wet.clean_add(&drop, true);
    wet.stop()?;
    assert!(!drop.exists());
    assert!(keep.exists());
    Ok(())
}

#[tokio::test]
async fn signal_killed_command_reports_interruption() -> Result<()> {
    let tmp = tempdir()?;
    let out = tmp.path().join("interrupted.out");
    let cmd = ToolCommand::new(format!("kill -TERM $$ # {}", out.display()), &out);

    let mut pipe = Runner::start("test", tmp.path(), false)?;
    let err = pipe.run(&cmd, true).await.unwrap_err();
    // Interruption is never tolerated, even on nofail stages.
    assert!(matches!(err, PipelineError::Interrupted));
    Ok(())
}
