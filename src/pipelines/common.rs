/// Stages and path slots shared by the ChIP-seq and Quant-seq workflows:
/// replicate merging, raw-read quality reports, BAM-to-FASTQ conversion and
/// adapter trimming.
use std::path::{Path, PathBuf};

use crate::config::defs::{PipelineError, Trimmer};
use crate::config::input::{Sample, UnmappedReads};
use crate::runner::Runner;
use crate::toolkit;

/// FASTQ slots populated by the format-conversion stage. Paired samples get
/// exactly the read1/read2/unpaired-mates slots, single-end samples exactly
/// one.
#[derive(Debug, Clone)]
pub enum FastqSlots {
    Single {
        fastq: PathBuf,
    },
    Paired {
        fastq1: PathBuf,
        fastq2: PathBuf,
        unpaired: PathBuf,
    },
}

impl FastqSlots {
    pub fn new(dir: &Path, name: &str, paired: bool) -> Self {
        if paired {
            Self::Paired {
                fastq1: dir.join(format!("{}.1.fastq", name)),
                fastq2: dir.join(format!("{}.2.fastq", name)),
                unpaired: dir.join(format!("{}.unpaired.fastq", name)),
            }
        } else {
            Self::Single {
                fastq: dir.join(format!("{}.fastq", name)),
            }
        }
    }

    pub fn primary(&self) -> &Path {
        match self {
            Self::Single { fastq } => fastq,
            Self::Paired { fastq1, .. } => fastq1,
        }
    }

    pub fn mate(&self) -> Option<&Path> {
        match self {
            Self::Single { .. } => None,
            Self::Paired { fastq2, .. } => Some(fastq2),
        }
    }

    pub fn all(&self) -> Vec<&Path> {
        match self {
            Self::Single { fastq } => vec![fastq],
            Self::Paired {
                fastq1,
                fastq2,
                unpaired,
            } => vec![fastq1, fastq2, unpaired],
        }
    }
}

/// Trimmed-read slots. Their shape depends on the trimmer flavor as well as
/// endedness: trimmomatic keeps orphaned mates in separate outputs, skewer
/// has no such outputs.
#[derive(Debug, Clone)]
pub enum TrimmedSlots {
    Single {
        trimmed: PathBuf,
    },
    PairedTrimmomatic {
        trimmed1: PathBuf,
        trimmed1_unpaired: PathBuf,
        trimmed2: PathBuf,
        trimmed2_unpaired: PathBuf,
    },
    PairedSkewer {
        trimmed1: PathBuf,
        trimmed2: PathBuf,
    },
}

impl TrimmedSlots {
    pub fn new(dir: &Path, name: &str, paired: bool, trimmer: Trimmer) -> Self {
        match (paired, trimmer) {
            (false, _) => Self::Single {
                trimmed: dir.join(format!("{}.trimmed.fastq", name)),
            },
            (true, Trimmer::Trimmomatic) => Self::PairedTrimmomatic {
                trimmed1: dir.join(format!("{}.trimmed.1.fastq", name)),
                trimmed1_unpaired: dir.join(format!("{}.trimmed.1.unpaired.fastq", name)),
                trimmed2: dir.join(format!("{}.trimmed.2.fastq", name)),
                trimmed2_unpaired: dir.join(format!("{}.trimmed.2.unpaired.fastq", name)),
            },
            (true, Trimmer::Skewer) => Self::PairedSkewer {
                trimmed1: dir.join(format!("{}.trimmed.1.fastq", name)),
                trimmed2: dir.join(format!("{}.trimmed.2.fastq", name)),
            },
        }
    }

    pub fn primary(&self) -> &Path {
        match self {
            Self::Single { trimmed } => trimmed,
            Self::PairedTrimmomatic { trimmed1, .. } => trimmed1,
            Self::PairedSkewer { trimmed1, .. } => trimmed1,
        }
    }

    pub fn mate(&self) -> Option<&Path> {
        match self {
            Self::Single { .. } => None,
            Self::PairedTrimmomatic { trimmed2, .. } => Some(trimmed2),
            Self::PairedSkewer { trimmed2, .. } => Some(trimmed2),
        }
    }

    /// Orphaned-mate outputs; only the paired trimmomatic flavor has them.
    pub fn unpaired(&self) -> Vec<&Path> {
        match self {
            Self::PairedTrimmomatic {
                trimmed1_unpaired,
                trimmed2_unpaired,
                ..
            } => vec![trimmed1_unpaired, trimmed2_unpaired],
            _ => Vec::new(),
        }
    }

    pub fn all(&self) -> Vec<&Path> {
        match self {
            Self::Single { trimmed } => vec![trimmed],
            Self::PairedTrimmomatic {
                trimmed1,
                trimmed1_unpaired,
                trimmed2,
                trimmed2_unpaired,
            } => vec![trimmed1, trimmed1_unpaired, trimmed2, trimmed2_unpaired],
            Self::PairedSkewer { trimmed1, trimmed2 } => vec![trimmed1, trimmed2],
        }
    }
}

/// Merges technical replicates into one unmapped BAM and narrows the
/// sample's unmapped-reads field to the merged path. A no-op for samples
/// that already hold a single path, so the mutation happens at most once
/// per run; on resume the merge command itself is skipped by its
/// checkpoint but the field is still narrowed.
pub async fn merge_replicates(
    pipe: &mut Runner,
    sample: &mut Sample,
    merged_target: &Path,
) -> Result<(), PipelineError> {
    let replicates = match &sample.unmapped_bam {
        UnmappedReads::Replicates(bams) => bams.clone(),
        UnmappedReads::Single(_) => return Ok(()),
    };
    let cmd = toolkit::reads::merge_bams(&replicates, merged_target);
    pipe.run(&cmd, false).await?;
    sample.unmapped_bam = UnmappedReads::Single(merged_target.to_path_buf());
    Ok(())
}

pub async fn quality_report(pipe: &mut Runner, sample: &Sample) -> Result<(), PipelineError> {
    let cmd = toolkit::reads::fastqc(
        sample.unmapped_bam.path()?,
        &sample.sample_root,
        &sample.name,
    );
    pipe.run(&cmd, false).await?;
    Ok(())
}

/// Converts the unmapped BAM to FASTQ and registers every produced FASTQ
/// for deferred cleanup.
pub async fn bam_to_fastq(
    pipe: &mut Runner,
    sample: &Sample,
    slots: &FastqSlots,
) -> Result<(), PipelineError> {
    let input = sample.unmapped_bam.path()?;
    let cmd = match slots {
        FastqSlots::Single { fastq } => toolkit::reads::bam2fastq(input, fastq, None, None),
        FastqSlots::Paired {
            fastq1,
            fastq2,
            unpaired,
        } => toolkit::reads::bam2fastq(
            input,
            fastq1,
            Some(fastq2.as_path()),
            Some(unpaired.as_path()),
        ),
    };
    pipe.run(&cmd, false).await?;
    for path in slots.all() {
        pipe.clean_add(path, true);
    }
    Ok(())
}

/// Trims adapters with the requested flavor and registers every trimmed
/// intermediate for deferred cleanup.
pub async fn trim_reads(
    pipe: &mut Runner,
    trimmer: Trimmer,
    fastq: &FastqSlots,
    trimmed: &TrimmedSlots,
    output_prefix: &Path,
    adapters: &Path,
    trim_log: &Path,
    cpus: usize,
) -> Result<(), PipelineError> {
    let cmd = match trimmed {
        TrimmedSlots::Single { trimmed } => match trimmer {
            Trimmer::Trimmomatic => toolkit::reads::trimmomatic(
                fastq.primary(),
                None,
                trimmed,
                None,
                None,
                None,
                cpus,
                adapters,
                trim_log,
            ),
            Trimmer::Skewer => toolkit::reads::skewer(
                fastq.primary(),
                None,
                output_prefix,
                trimmed,
                None,
                trim_log,
                cpus,
                adapters,
            ),
        },
        TrimmedSlots::PairedTrimmomatic {
            trimmed1,
            trimmed1_unpaired,
            trimmed2,
            trimmed2_unpaired,
        } => toolkit::reads::trimmomatic(
            fastq.primary(),
            fastq.mate(),
            trimmed1,
            Some(trimmed1_unpaired.as_path()),
            Some(trimmed2.as_path()),
            Some(trimmed2_unpaired.as_path()),
            cpus,
            adapters,
            trim_log,
        ),
        TrimmedSlots::PairedSkewer { trimmed1, trimmed2 } => toolkit::reads::skewer(
            fastq.primary(),
            fastq.mate(),
            output_prefix,
            trimmed1,
            Some(trimmed2.as_path()),
            trim_log,
            cpus,
            adapters,
        ),
    };
    pipe.run(&cmd, false).await?;
    for path in trimmed.all() {
        pipe.clean_add(path, true);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paired_fastq_slots_are_exactly_three() {
        let slots = FastqSlots::new(Path::new("/t/unmapped"), "s1", true);
        assert_eq!(slots.all().len(), 3);
        assert_eq!(slots.primary(), Path::new("/t/unmapped/s1.1.fastq"));
        assert_eq!(slots.mate(), Some(Path::new("/t/unmapped/s1.2.fastq")));
    }

    #[test]
    fn single_end_fastq_slot_is_exactly_one() {
        let slots = FastqSlots::new(Path::new("/t/unmapped"), "s1", false);
        assert_eq!(slots.all().len(), 1);
        assert!(slots.mate().is_none());
    }

    #[test]
    fn skewer_slots_have_no_unpaired_outputs() {
        let skewer = TrimmedSlots::new(Path::new("/t/unmapped"), "s1", true, Trimmer::Skewer);
        assert!(skewer.unpaired().is_empty());
        assert_eq!(skewer.all().len(), 2);

        let trimmomatic =
            TrimmedSlots::new(Path::new("/t/unmapped"), "s1", true, Trimmer::Trimmomatic);
        assert_eq!(trimmomatic.unpaired().len(), 2);
        assert_eq!(trimmomatic.all().len(), 4);
    }
}
