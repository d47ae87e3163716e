/// Alignment and post-alignment BAM handling.
use std::path::{Path, PathBuf};

use super::{ToolCommand, display};
use crate::config::defs::{BOWTIE2_TAG, SAMBAMBA_TAG, SAMTOOLS_TAG, TOPHAT_TAG};

/// Aligns trimmed reads with bowtie2 and writes a sorted BAM. Alignment
/// rates go to `log`, per-read metrics to `metrics`.
pub fn bowtie2_map(
    input_fastq1: &Path,
    input_fastq2: Option<&Path>,
    output_bam: &Path,
    log: &Path,
    metrics: &Path,
    genome_index: &Path,
    max_insert: u32,
    cpus: usize,
) -> ToolCommand {
    let mut line = format!(
        "{} --very-sensitive -p {} --met-file {} -x {}",
        BOWTIE2_TAG,
        cpus,
        display(metrics),
        display(genome_index)
    );
    match input_fastq2 {
        Some(fastq2) => line.push_str(&format!(
            " -X {} -1 {} -2 {}",
            max_insert,
            display(input_fastq1),
            display(fastq2)
        )),
        None => line.push_str(&format!(" -U {}", display(input_fastq1))),
    }
    line.push_str(&format!(
        " 2> {} | {} view -S -b - | {} sort -o {} -",
        display(log),
        SAMTOOLS_TAG,
        SAMTOOLS_TAG,
        display(output_bam)
    ));
    ToolCommand::new(line, output_bam)
}

/// Spliced alignment against genome plus transcriptome with tophat. The
/// accepted-hits BAM inside the output directory is the checkpoint.
pub fn tophat_map(
    input_fastq: &Path,
    out_dir: &Path,
    genome_index: &Path,
    transcriptome: &Path,
    cpus: usize,
) -> ToolCommand {
    let accepted_hits = out_dir.join("accepted_hits.bam");
    let line = format!(
        "{} --GTF {} --library-type fr-unstranded --max-multihits 100 --no-coverage-search \
         --num-threads {} --output-dir {} {} {}",
        TOPHAT_TAG,
        display(transcriptome),
        cpus,
        display(out_dir),
        display(genome_index),
        display(input_fastq)
    );
    ToolCommand::new(line, accepted_hits)
}

/// Removes duplicates and reads below the mapping-quality threshold. For
/// paired samples only proper pairs are kept.
pub fn filter_reads(
    input_bam: &Path,
    output_bam: &Path,
    metrics_file: &Path,
    paired: bool,
    cpus: usize,
    quality: u8,
) -> ToolCommand {
    let pair_flag = if paired { " -f 2" } else { "" };
    let nodups = PathBuf::from(format!("{}.nodups.tmp.bam", display(output_bam)));
    let line = format!(
        "{} markdup -t {} -r {} {} 2> {} && {} view -b -q {}{} {} > {} && rm {}",
        SAMBAMBA_TAG,
        cpus,
        display(input_bam),
        display(&nodups),
        display(metrics_file),
        SAMTOOLS_TAG,
        quality,
        pair_flag,
        display(&nodups),
        display(output_bam),
        display(&nodups)
    );
    ToolCommand::new(line, output_bam)
}

/// Shifts read starts of a tagmented sample to the transposition event
/// centre.
pub fn shift_reads(input_bam: &Path, genome: &str, output_bam: &Path) -> ToolCommand {
    let line = format!(
        "{} view -h {} | shift_reads.py {} | {} view -S -b - > {}",
        SAMTOOLS_TAG,
        display(input_bam),
        genome,
        SAMTOOLS_TAG,
        display(output_bam)
    );
    ToolCommand::new(line, output_bam)
}

pub fn index_bam(input_bam: &Path) -> ToolCommand {
    let index = PathBuf::from(format!("{}.bai", display(input_bam)));
    ToolCommand::new(
        format!("{} index {}", SAMTOOLS_TAG, display(input_bam)),
        index,
    )
}

/// Sorts a BAM in place and indexes it. The output path equals the input
/// path, so callers must checkpoint this stage by name.
pub fn sort_index_bam(input_bam: &Path, cpus: usize) -> ToolCommand {
    let sorted = format!("{}.sorted.tmp.bam", display(input_bam));
    ToolCommand::bare(format!(
        "{0} sort -@ {1} -o {2} {3} && mv {2} {3} && {0} index {3}",
        SAMTOOLS_TAG,
        cpus,
        sorted,
        display(input_bam)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bowtie2_paired_carries_insert_limit() {
        let cmd = bowtie2_map(
            Path::new("/t/s.1.fastq"),
            Some(Path::new("/t/s.2.fastq")),
            Path::new("/t/s.bam"),
            Path::new("/t/s.alnRates.txt"),
            Path::new("/t/s.alnMetrics.txt"),
            Path::new("/ref/hg19"),
            2000,
            8,
        );
        assert!(cmd.line.contains("-X 2000"));
        assert!(cmd.line.contains("-1 /t/s.1.fastq -2 /t/s.2.fastq"));
        assert!(!cmd.line.contains(" -U "));
    }

    #[test]
    fn bowtie2_single_end_uses_unpaired_input() {
        let cmd = bowtie2_map(
            Path::new("/t/s.fastq"),
            None,
            Path::new("/t/s.bam"),
            Path::new("/t/s.alnRates.txt"),
            Path::new("/t/s.alnMetrics.txt"),
            Path::new("/ref/hg19"),
            2000,
            8,
        );
        assert!(cmd.line.contains("-U /t/s.fastq"));
        assert!(!cmd.line.contains("-X 2000"));
    }

    #[test]
    fn filter_keeps_proper_pairs_only_when_paired() {
        let paired = filter_reads(
            Path::new("/t/s.bam"),
            Path::new("/t/s.filtered.bam"),
            Path::new("/t/s.duplicates.txt"),
            true,
            4,
            30,
        );
        assert!(paired.line.contains("-q 30 -f 2"));

        let single = filter_reads(
            Path::new("/t/s.bam"),
            Path::new("/t/s.filtered.bam"),
            Path::new("/t/s.duplicates.txt"),
            false,
            4,
            30,
        );
        assert!(!single.line.contains("-f 2"));
    }

    #[test]
    fn sort_index_declares_no_output() {
        let cmd = sort_index_bam(Path::new("/t/s.filtered.bam"), 4);
        assert!(cmd.output.is_none());
        assert!(cmd.line.contains("samtools index /t/s.filtered.bam"));
    }
}
