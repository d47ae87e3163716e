/// Read preparation: replicate merging, quality reports, format conversion
/// and adapter trimming.
use std::path::{Path, PathBuf};

use super::{ToolCommand, display};
use crate::config::defs::{FASTQC_TAG, SAM_TO_FASTQ_TAG, SAMTOOLS_TAG, SKEWER_TAG, TRIMMOMATIC_TAG};

/// Merges technical-replicate BAMs into a single unmapped BAM.
pub fn merge_bams(input_bams: &[PathBuf], output_bam: &Path) -> ToolCommand {
    let inputs = input_bams
        .iter()
        .map(|bam| display(bam))
        .collect::<Vec<_>>()
        .join(" ");
    ToolCommand::new(
        format!("{} merge -f {} {}", SAMTOOLS_TAG, display(output_bam), inputs),
        output_bam,
    )
}

/// Raw read quality report. The report archive is the checkpoint.
pub fn fastqc(input_bam: &Path, output_dir: &Path, sample_name: &str) -> ToolCommand {
    let archive = output_dir.join(format!("{}_fastqc.zip", sample_name));
    ToolCommand::new(
        format!(
            "{} --noextract --outdir {} {}",
            FASTQC_TAG,
            display(output_dir),
            display(input_bam)
        ),
        archive,
    )
}

/// Unmapped BAM to FASTQ. Paired input produces read1, read2 and an
/// unpaired-mates file; single-end input produces one FASTQ.
pub fn bam2fastq(
    input_bam: &Path,
    output_fastq: &Path,
    output_fastq2: Option<&Path>,
    unpaired_fastq: Option<&Path>,
) -> ToolCommand {
    let mut line = format!(
        "java -Xmx4g -jar `which {}` INPUT={} FASTQ={}",
        SAM_TO_FASTQ_TAG,
        display(input_bam),
        display(output_fastq)
    );
    if let Some(fastq2) = output_fastq2 {
        line.push_str(&format!(" SECOND_END_FASTQ={}", display(fastq2)));
    }
    if let Some(unpaired) = unpaired_fastq {
        line.push_str(&format!(" UNPAIRED_FASTQ={}", display(unpaired)));
    }
    ToolCommand::new(line, output_fastq)
}

/// Adapter trimming with trimmomatic. Paired mode writes four outputs
/// (kept and orphaned mates per read), single-end mode one.
pub fn trimmomatic(
    input_fastq1: &Path,
    input_fastq2: Option<&Path>,
    output_fastq1: &Path,
    output_fastq1_unpaired: Option<&Path>,
    output_fastq2: Option<&Path>,
    output_fastq2_unpaired: Option<&Path>,
    cpus: usize,
    adapters: &Path,
    log: &Path,
) -> ToolCommand {
    let paired = input_fastq2.is_some();
    let mut line = format!("java -Xmx4g -jar `which {}`", TRIMMOMATIC_TAG);
    line.push_str(&format!(
        " {} -threads {} -trimlog {} {}",
        if paired { "PE" } else { "SE" },
        cpus,
        display(log),
        display(input_fastq1)
    ));
    if let Some(fastq2) = input_fastq2 {
        line.push_str(&format!(" {}", display(fastq2)));
    }
    line.push_str(&format!(" {}", display(output_fastq1)));
    if let (Some(unpaired1), Some(fastq2), Some(unpaired2)) =
        (output_fastq1_unpaired, output_fastq2, output_fastq2_unpaired)
    {
        line.push_str(&format!(
            " {} {} {}",
            display(unpaired1),
            display(fastq2),
            display(unpaired2)
        ));
    }
    line.push_str(&format!(" ILLUMINACLIP:{}:1:40:15:8:true", display(adapters)));
    line.push_str(" HEADCROP:12");
    line.push_str(" TRAILING:3");
    line.push_str(" SLIDINGWINDOW:4:10");
    line.push_str(" MINLEN:36");
    ToolCommand::new(line, output_fastq1)
}

/// Adapter trimming with skewer. Skewer names its outputs after the given
/// prefix, so they are moved into the declared slots afterwards; it never
/// writes an orphaned-mates file.
pub fn skewer(
    input_fastq1: &Path,
    input_fastq2: Option<&Path>,
    output_prefix: &Path,
    output_fastq1: &Path,
    output_fastq2: Option<&Path>,
    trim_log: &Path,
    cpus: usize,
    adapters: &Path,
) -> ToolCommand {
    let prefix = display(output_prefix);
    let mut line = format!("{} -q 3 -t {} -x {}", SKEWER_TAG, cpus, display(adapters));
    if input_fastq2.is_some() {
        line.push_str(" -m pe");
    }
    line.push_str(&format!(" -o {} {}", prefix, display(input_fastq1)));
    if let Some(fastq2) = input_fastq2 {
        line.push_str(&format!(" {}", display(fastq2)));
    }
    match (input_fastq2, output_fastq2) {
        (Some(_), Some(fastq2)) => {
            line.push_str(&format!(
                " && mv {0}-trimmed-pair1.fastq {1} && mv {0}-trimmed-pair2.fastq {2}",
                prefix,
                display(output_fastq1),
                display(fastq2)
            ));
        }
        _ => {
            line.push_str(&format!(
                " && mv {}-trimmed.fastq {}",
                prefix,
                display(output_fastq1)
            ));
        }
    }
    line.push_str(&format!(" && mv {}-trimmed.log {}", prefix, display(trim_log)));
    ToolCommand::new(line, output_fastq1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trimmomatic_paired_lists_four_outputs() {
        let cmd = trimmomatic(
            Path::new("/tmp/s.1.fastq"),
            Some(Path::new("/tmp/s.2.fastq")),
            Path::new("/tmp/s.trimmed.1.fastq"),
            Some(Path::new("/tmp/s.trimmed.1.unpaired.fastq")),
            Some(Path::new("/tmp/s.trimmed.2.fastq")),
            Some(Path::new("/tmp/s.trimmed.2.unpaired.fastq")),
            4,
            Path::new("/ref/adapters.fa"),
            Path::new("/tmp/s.trimlog.txt"),
        );
        assert!(cmd.line.contains(" PE "));
        assert!(cmd.line.contains("s.trimmed.1.unpaired.fastq"));
        assert!(cmd.line.contains("s.trimmed.2.unpaired.fastq"));
        assert!(cmd.line.contains("ILLUMINACLIP:/ref/adapters.fa:1:40:15:8:true"));
        assert_eq!(cmd.output.as_deref(), Some(Path::new("/tmp/s.trimmed.1.fastq")));
    }

    #[test]
    fn trimmomatic_single_end_has_no_unpaired_slots() {
        let cmd = trimmomatic(
            Path::new("/tmp/s.fastq"),
            None,
            Path::new("/tmp/s.trimmed.fastq"),
            None,
            None,
            None,
            4,
            Path::new("/ref/adapters.fa"),
            Path::new("/tmp/s.trimlog.txt"),
        );
        assert!(cmd.line.contains(" SE "));
        assert!(!cmd.line.contains("unpaired"));
    }

    #[test]
    fn skewer_never_mentions_unpaired_outputs() {
        let cmd = skewer(
            Path::new("/tmp/s.1.fastq"),
            Some(Path::new("/tmp/s.2.fastq")),
            Path::new("/tmp/unmapped/s"),
            Path::new("/tmp/s.trimmed.1.fastq"),
            Some(Path::new("/tmp/s.trimmed.2.fastq")),
            Path::new("/tmp/s.trimlog.txt"),
            4,
            Path::new("/ref/adapters.fa"),
        );
        assert!(cmd.line.contains("-m pe"));
        assert!(!cmd.line.contains("unpaired"));
        assert!(cmd.line.contains("-trimmed-pair2.fastq"));
    }
}
