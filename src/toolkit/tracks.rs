/// Genome-browser tracks and genome-wide coverage.
use std::path::Path;

use super::{ToolCommand, display};
use crate::config::defs::{BEDGRAPH_TO_BIGWIG_TAG, BEDTOOLS_TAG, GENOME_COVERAGE_TAG};

/// Builds a bigWig track from a filtered BAM. Reads are extended to the
/// expected fragment length unless the sample is tagmented; coverage is
/// scaled to reads per million when `normalize` is set.
pub fn bam_to_bigwig(
    input_bam: &Path,
    output_bigwig: &Path,
    genome_sizes: &Path,
    tagmented: bool,
    normalize: bool,
) -> ToolCommand {
    let cov = format!("{}.cov", display(output_bigwig));
    let mut line = format!("{} bamtobed -i {}", BEDTOOLS_TAG, display(input_bam));
    if !tagmented {
        line.push_str(&format!(
            " | {} slop -i stdin -g {} -s -l 0 -r 130",
            BEDTOOLS_TAG,
            display(genome_sizes)
        ));
    }
    line.push_str(&format!(
        " | {} -g {} -i stdin -bg > {}",
        GENOME_COVERAGE_TAG,
        display(genome_sizes),
        cov
    ));
    let final_cov = if normalize {
        let normalized = format!("{}.normalized.cov", display(output_bigwig));
        line.push_str(&format!(
            " && awk 'NR==FNR {{ total += $4; next }} \
             {{ print $1, $2, $3, 1000000 * $4 / total }}' OFS='\\t' {0} {0} > {1}",
            cov, normalized
        ));
        normalized
    } else {
        cov.clone()
    };
    line.push_str(&format!(
        " && {} {} {} {}",
        BEDGRAPH_TO_BIGWIG_TAG,
        final_cov,
        display(genome_sizes),
        display(output_bigwig)
    ));
    line.push_str(&format!(" && rm {}", cov));
    if normalize {
        line.push_str(&format!(" && rm {}", final_cov));
    }
    ToolCommand::new(line, output_bigwig)
}

/// One hub-document entry for a sample track. The caller appends it to the
/// genome's hub under the hub lock.
pub fn track_hub_entry(sample_name: &str, track_url: &str, colour: &str) -> String {
    format!(
        "track type=bigWig name='{0}' description='{0}' height=32 visibility=full \
         maxHeightPixels=32:32:25 bigDataUrl={1} color={2}",
        sample_name, track_url, colour
    )
}

/// Read counts over fixed genome-wide windows.
pub fn genome_wide_coverage(input_bam: &Path, genome_windows: &Path, output: &Path) -> ToolCommand {
    ToolCommand::new(
        format!(
            "{} coverage -abam {} -b {} > {}",
            BEDTOOLS_TAG,
            display(input_bam),
            display(genome_windows),
            display(output)
        ),
        output,
    )
}
