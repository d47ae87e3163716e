use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use tempfile::tempdir;

use ngs_pipelines::config::defs::{PeakCaller, Trimmer};
use ngs_pipelines::config::input::{RunOptions, Sample, UnmappedReads};
use ngs_pipelines::pipelines::chipseq::{ChipPaths, ChipStage, chip_stages};
use ngs_pipelines::pipelines::common::merge_replicates;
use ngs_pipelines::runner::Runner;

fn sample(root: PathBuf) -> Sample {
    Sample {
        name: "rep_sample".to_string(),
        genome: "hg19".to_string(),
        paired: false,
        tagmented: false,
        histone: false,
        broad: false,
        read_length: 50,
        track_colour: "255,0,0".to_string(),
        sample_root: root,
        unmapped_bam: UnmappedReads::Replicates(vec![
            PathBuf::from("/data/rep1.bam"),
            PathBuf::from("/data/rep2.bam"),
        ]),
        ctrl: None,
    }
}

fn options() -> RunOptions {
    RunOptions {
        trimmer: Trimmer::Trimmomatic,
        peak_caller: PeakCaller::Macs2,
        cpus: 2,
        quality: 30,
        maxinsert: 2000,
        dry_run: false,
    }
}

#[tokio::test]
async fn merge_narrows_replicates_even_when_resumed() -> Result<()> {
    let tmp = tempdir()?;
    let mut s = sample(tmp.path().to_path_buf());
    let paths = ChipPaths::new(&s, &options());

    // A previous run already produced the merged bam; the merge command
    // must be skipped, yet the sample field still narrows to the single
    // merged path.
    fs::create_dir_all(paths.merged_bam.parent().unwrap())?;
    fs::write(&paths.merged_bam, b"")?;

    let mut pipe = Runner::start("chipseq", tmp.path(), false)?;
    merge_replicates(&mut pipe, &mut s, &paths.merged_bam).await?;
    assert_eq!(
        s.unmapped_bam,
        UnmappedReads::Single(paths.merged_bam.clone())
    );

    // Narrowing happens at most once per run: a second call is a no-op.
    merge_replicates(&mut pipe, &mut s, &paths.merged_bam).await?;
    assert_eq!(
        s.unmapped_bam,
        UnmappedReads::Single(paths.merged_bam.clone())
    );

    // A plan built after the merge no longer schedules it.
    assert!(!chip_stages(&s, &options()).contains(&ChipStage::MergeReplicates));
    Ok(())
}
