/// Peak calling, signal QC, motif work and peak-level analyses.
use std::path::{Path, PathBuf};

use super::{ToolCommand, display};
use crate::config::defs::{
    BEDTOOLS_TAG, HOMER_ANNOTATE_TAG, HOMER_FIND_MOTIFS_TAG, MACS2_GENOME_SIZES, MACS2_TAG,
    RSCRIPT_TAG,
};

/// Cross-correlation signal/noise metrics (NSC, RSC) via run_spp.
pub fn peak_tools(input_bam: &Path, output: &Path, plot: &Path, cpus: usize) -> ToolCommand {
    let line = format!(
        "{} `which run_spp.R` -rf -savp -savp={} -s=0:5:500 -c={} -out={} -p={}",
        RSCRIPT_TAG,
        display(plot),
        display(input_bam),
        display(output),
        cpus
    );
    ToolCommand::new(line, plot)
}

/// macs2 peak calling against a control. Point-source factors use default
/// model building; broad factors use broad-peak settings.
pub fn macs2_call_peaks(
    treatment_bam: &Path,
    control_bam: &Path,
    output_dir: &Path,
    sample_name: &str,
    genome: &str,
    broad: bool,
) -> ToolCommand {
    let peaks = macs2_peaks_path(output_dir, sample_name, broad);
    let mut line = format!(
        "{} callpeak -t {} -c {} -f BAM -g {} -n {} --outdir {}",
        MACS2_TAG,
        display(treatment_bam),
        display(control_bam),
        effective_genome(genome),
        sample_name,
        display(output_dir)
    );
    if broad {
        line.push_str(" --broad --broad-cutoff 0.1");
    } else {
        line.push_str(" --fix-bimodal -q 0.01");
    }
    ToolCommand::new(line, peaks)
}

pub fn macs2_peaks_path(output_dir: &Path, sample_name: &str, broad: bool) -> PathBuf {
    output_dir.join(format!(
        "{}_peaks.{}",
        sample_name,
        if broad { "broadPeak" } else { "narrowPeak" }
    ))
}

/// Renders the fragment-size model macs2 wrote alongside its peaks.
pub fn macs2_plot_model(sample_name: &str, output_dir: &Path) -> ToolCommand {
    let pdf = output_dir.join(format!("{}_model.pdf", sample_name));
    let line = format!(
        "cd {} && {} {}_model.r",
        display(output_dir),
        RSCRIPT_TAG,
        sample_name
    );
    ToolCommand::new(line, pdf)
}

/// spp peak calling against a control.
pub fn spp_call_peaks(
    treatment_bam: &Path,
    control_bam: &Path,
    treatment_name: &str,
    control_name: &str,
    output_dir: &Path,
    broad: bool,
    cpus: usize,
) -> ToolCommand {
    let peaks = spp_peaks_path(output_dir, treatment_name, broad);
    let line = format!(
        "{} `which spp_peak_calling.R` {} {} {} {} {} {} {}",
        RSCRIPT_TAG,
        display(treatment_bam),
        display(control_bam),
        treatment_name,
        control_name,
        broad,
        cpus,
        display(output_dir)
    );
    ToolCommand::new(line, peaks)
}

pub fn spp_peaks_path(output_dir: &Path, sample_name: &str, broad: bool) -> PathBuf {
    output_dir.join(format!(
        "{}.{}",
        sample_name,
        if broad { "broadPeak" } else { "narrowPeak" }
    ))
}

/// De-novo motif discovery over peak regions. The top-ranked motif file is
/// the checkpoint.
pub fn homer_find_motifs(
    peak_file: &Path,
    genome: &str,
    output_dir: &Path,
    size: u32,
    lengths: &str,
    n_motifs: u32,
) -> ToolCommand {
    let motif1 = output_dir.join("homerResults").join("motif1.motif");
    let line = format!(
        "{} {} {} {} -mask -size {} -len {} -S {}",
        HOMER_FIND_MOTIFS_TAG,
        display(peak_file),
        genome,
        display(output_dir),
        size,
        lengths,
        n_motifs
    );
    ToolCommand::new(line, motif1)
}

/// Re-centers peaks on their best motif occurrence within a fixed window.
pub fn center_peaks_on_motifs(
    peak_file: &Path,
    genome: &str,
    window_width: u32,
    motif_file: &Path,
    output_bed: &Path,
) -> ToolCommand {
    let line = format!(
        "{} {} {} -size {} -center {} | awk -v OFS='\\t' '{{ print $2, $3, $4, $1, $6, $5 }}' \
         | sortBed > {}",
        HOMER_ANNOTATE_TAG,
        display(peak_file),
        genome,
        window_width,
        display(motif_file),
        display(output_bed)
    );
    ToolCommand::new(line, output_bed)
}

/// Annotates peaks with motif occurrence scores.
pub fn annotate_peaks(
    peak_file: &Path,
    genome: &str,
    motif_file: &Path,
    output_bed: &Path,
) -> ToolCommand {
    let line = format!(
        "{} {} {} -mask -mscore -m {} | tail -n +2 | cut -f 1,5,22 > {}",
        HOMER_ANNOTATE_TAG,
        display(peak_file),
        genome,
        display(motif_file),
        display(output_bed)
    );
    ToolCommand::new(line, output_bed)
}

/// Read-density clustering and plotting around peak centres.
pub fn peak_analysis(
    input_bam: &Path,
    peak_file: &Path,
    plots_dir: &Path,
    window_width: u32,
    fragment_size: u32,
    genome: &str,
    n_clusters: u32,
    strand_specific: bool,
    duplicates: bool,
) -> ToolCommand {
    let mut line = format!(
        "python `which peaks_analysis.py` {} {} {} --window-width {} --fragment-size {} \
         --genome {} --n-clusters {}",
        display(input_bam),
        display(peak_file),
        display(plots_dir),
        window_width,
        fragment_size,
        genome,
        n_clusters
    );
    if strand_specific {
        line.push_str(" --strand-specific");
    }
    if duplicates {
        line.push_str(" --duplicates");
    }
    ToolCommand::bare(line)
}

/// Read-density clustering and plotting around annotated TSSs.
pub fn tss_analysis(
    input_bam: &Path,
    tss_file: &Path,
    plots_dir: &Path,
    window_width: u32,
    fragment_size: u32,
    genome: &str,
    n_clusters: u32,
    strand_specific: bool,
    duplicates: bool,
) -> ToolCommand {
    let mut line = format!(
        "python `which tss_analysis.py` {} {} {} --window-width {} --fragment-size {} \
         --genome {} --n-clusters {}",
        display(input_bam),
        display(tss_file),
        display(plots_dir),
        window_width,
        fragment_size,
        genome,
        n_clusters
    );
    if strand_specific {
        line.push_str(" --strand-specific");
    }
    if duplicates {
        line.push_str(" --duplicates");
    }
    ToolCommand::bare(line)
}

/// Fraction of reads falling inside called peak regions.
pub fn calculate_frip(input_bam: &Path, input_bed: &Path, output: &Path) -> ToolCommand {
    let line = format!(
        "cut -f 1,2,3 {} | {} coverage -counts -abam {} -b - \
         | awk '{{ sum += $4 }} END {{ print sum }}' > {}",
        display(input_bed),
        BEDTOOLS_TAG,
        display(input_bam),
        display(output)
    );
    ToolCommand::new(line, output)
}

fn effective_genome(genome: &str) -> &str {
    for (prefix, size) in MACS2_GENOME_SIZES.iter() {
        if genome.starts_with(prefix) {
            return *size;
        }
    }
    genome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macs2_broad_flag_switches_peak_type() {
        let broad = macs2_call_peaks(
            Path::new("/t/s.bam"),
            Path::new("/t/igg.bam"),
            Path::new("/t/peaks"),
            "s1",
            "hg19",
            true,
        );
        assert!(broad.line.contains("--broad --broad-cutoff 0.1"));
        assert_eq!(
            broad.output.as_deref(),
            Some(Path::new("/t/peaks/s1_peaks.broadPeak"))
        );

        let narrow = macs2_call_peaks(
            Path::new("/t/s.bam"),
            Path::new("/t/igg.bam"),
            Path::new("/t/peaks"),
            "s1",
            "hg19",
            false,
        );
        assert!(narrow.line.contains("--fix-bimodal"));
        assert_eq!(
            narrow.output.as_deref(),
            Some(Path::new("/t/peaks/s1_peaks.narrowPeak"))
        );
    }

    #[test]
    fn macs2_maps_assemblies_to_effective_genomes() {
        assert_eq!(effective_genome("hg19"), "hs");
        assert_eq!(effective_genome("mm10"), "mm");
        assert_eq!(effective_genome("sacCer3"), "sacCer3");
    }

    #[test]
    fn motif_checkpoint_is_top_ranked_motif() {
        let cmd = homer_find_motifs(
            Path::new("/t/peaks/s1_peaks.narrowPeak"),
            "hg19",
            Path::new("/t/motifs"),
            50,
            "8,10,12,14,16",
            8,
        );
        assert_eq!(
            cmd.output.as_deref(),
            Some(Path::new("/t/motifs/homerResults/motif1.motif"))
        );
        assert!(cmd.line.contains("-size 50"));
        assert!(cmd.line.contains("-S 8"));
    }
}
