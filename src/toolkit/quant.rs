/// Transcript quantification.
use std::path::Path;

use super::{ToolCommand, display};
use crate::config::defs::{HTSEQ_COUNT_TAG, KALLISTO_TAG, SAMTOOLS_TAG};

/// Count-based quantification of a filtered alignment against a transcript
/// annotation.
pub fn htseq_count(input_bam: &Path, gtf: &Path, output: &Path) -> ToolCommand {
    let line = format!(
        "{} view {} | {} -f sam -t exon -i gene_id -m union -s yes - {} > {}",
        SAMTOOLS_TAG,
        display(input_bam),
        HTSEQ_COUNT_TAG,
        display(gtf),
        display(output)
    );
    ToolCommand::new(line, output)
}

/// k-mer pseudo-alignment quantification of trimmed reads. Writes the
/// abundance table into the output directory and keeps the pseudo-aligned
/// BAM.
pub fn kallisto(
    input_fastq: &Path,
    input_fastq2: Option<&Path>,
    output_dir: &Path,
    output_bam: &Path,
    transcriptome_index: &Path,
    cpus: usize,
) -> ToolCommand {
    let abundance = output_dir.join("abundance.tsv");
    let mut line = format!(
        "{} quant -i {} -o {} -t {} --pseudobam",
        KALLISTO_TAG,
        display(transcriptome_index),
        display(output_dir),
        cpus
    );
    match input_fastq2 {
        Some(fastq2) => line.push_str(&format!(" {} {}", display(input_fastq), display(fastq2))),
        None => line.push_str(&format!(" --single -l 180 -s 20 {}", display(input_fastq))),
    }
    line.push_str(&format!(
        " | {} view -Sb - > {}",
        SAMTOOLS_TAG,
        display(output_bam)
    ));
    ToolCommand::new(line, abundance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kallisto_single_end_sets_fragment_model() {
        let cmd = kallisto(
            Path::new("/t/s.trimmed.fastq"),
            None,
            Path::new("/t/quant"),
            Path::new("/t/quant/s.pseudoalignment.bam"),
            Path::new("/ref/hg19.kallisto.idx"),
            4,
        );
        assert!(cmd.line.contains("--single -l 180 -s 20"));
        assert_eq!(cmd.output.as_deref(), Some(Path::new("/t/quant/abundance.tsv")));
    }
}
