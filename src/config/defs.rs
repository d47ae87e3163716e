use lazy_static::lazy_static;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

// External software
pub const SAMTOOLS_TAG: &str = "samtools";
pub const SAMBAMBA_TAG: &str = "sambamba";
pub const FASTQC_TAG: &str = "fastqc";
pub const SAM_TO_FASTQ_TAG: &str = "SamToFastq.jar";
pub const TRIMMOMATIC_TAG: &str = "trimmomatic-0.32.jar";
pub const SKEWER_TAG: &str = "skewer";
pub const BOWTIE2_TAG: &str = "bowtie2";
pub const TOPHAT_TAG: &str = "tophat";
pub const BEDTOOLS_TAG: &str = "bedtools";
pub const GENOME_COVERAGE_TAG: &str = "genomeCoverageBed";
pub const BEDGRAPH_TO_BIGWIG_TAG: &str = "bedGraphToBigWig";
pub const MACS2_TAG: &str = "macs2";
pub const RSCRIPT_TAG: &str = "Rscript";
pub const HOMER_FIND_MOTIFS_TAG: &str = "findMotifsGenome.pl";
pub const HOMER_ANNOTATE_TAG: &str = "annotatePeaks.pl";
pub const HTSEQ_COUNT_TAG: &str = "htseq-count";
pub const KALLISTO_TAG: &str = "kallisto";

/// Genome key of the ERCC spike-in reference in the project annotation maps.
pub const ERCC_GENOME: &str = "ercc";

lazy_static! {
    /// Effective genome size labels accepted by macs2 `-g`, keyed by
    /// assembly prefix. Assemblies without an entry pass through verbatim.
    pub static ref MACS2_GENOME_SIZES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("hg", "hs");
        m.insert("mm", "mm");
        m.insert("dm", "dm");
        m.insert("ce", "ce");

        m
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trimmer {
    Trimmomatic,
    Skewer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeakCaller {
    Macs2,
    Spp,
    Zinba,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid run configuration: {0}")]
    InvalidConfig(String),

    #[error("No {category} annotation for genome {genome}")]
    MissingAnnotation { category: String, genome: String },

    #[error("{tool} failed: {error}")]
    ToolExecution { tool: String, error: String },

    #[error("Timed out waiting for lock {0}")]
    LockTimeout(String),

    #[error("{0} is not implemented")]
    NotImplemented(String),

    #[error("Canceled by user")]
    Interrupted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
