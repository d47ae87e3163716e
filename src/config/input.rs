/// Run input: the (Project, Sample, RunOptions) triple handed to a workflow.
///
/// One JSON document per sample run, produced by the submission layer and
/// consumed (deleted) once the run finishes successfully outside dry-run
/// mode.
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::defs::{PeakCaller, PipelineError, Trimmer};

/// Unmapped input reads for one sample: either a single BAM or the BAMs of
/// several technical replicates. The merge stage collapses the latter into
/// a single path, in place, at most once per run.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum UnmappedReads {
    Single(PathBuf),
    Replicates(Vec<PathBuf>),
}

impl UnmappedReads {
    pub fn is_merged(&self) -> bool {
        matches!(self, UnmappedReads::Single(_))
    }

    /// The single unmapped BAM path. Replicates must have been merged first.
    pub fn path(&self) -> Result<&Path, PipelineError> {
        match self {
            UnmappedReads::Single(path) => Ok(path),
            UnmappedReads::Replicates(_) => Err(PipelineError::InvalidConfig(
                "technical replicates have not been merged".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sample {
    pub name: String,
    pub genome: String,
    #[serde(default)]
    pub paired: bool,
    #[serde(default)]
    pub tagmented: bool,
    #[serde(default)]
    pub histone: bool,
    #[serde(default)]
    pub broad: bool,
    #[serde(default = "default_read_length")]
    pub read_length: u32,
    #[serde(default = "default_track_colour")]
    pub track_colour: String,
    pub sample_root: PathBuf,
    pub unmapped_bam: UnmappedReads,
    /// Control/input sample for peak calling. A read-only association; its
    /// absence ends the ChIP-seq workflow after the signal/noise QC stage.
    #[serde(default)]
    pub ctrl: Option<Box<Sample>>,
}

impl Sample {
    pub fn dirs(&self) -> SampleDirs {
        SampleDirs::under(&self.sample_root)
    }
}

fn default_read_length() -> u32 {
    50
}

fn default_track_colour() -> String {
    // UCSC RGB triple
    "100,149,237".to_string()
}

/// Output directory layout of one sample, rooted at its sample directory.
#[derive(Debug, Clone)]
pub struct SampleDirs {
    pub root: PathBuf,
    pub unmapped: PathBuf,
    pub mapped: PathBuf,
    pub peaks: PathBuf,
    pub motifs: PathBuf,
    pub quant: PathBuf,
}

impl SampleDirs {
    pub fn under(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            unmapped: root.join("unmapped"),
            mapped: root.join("mapped"),
            peaks: root.join("peaks"),
            motifs: root.join("motifs"),
            quant: root.join("quant"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub name: String,
    pub config: ProjectConfig,
    pub dirs: ProjectDirs,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectDirs {
    pub root: PathBuf,
    pub results: PathBuf,
    pub html: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    /// Adapter FASTA shared by both trimmer flavors.
    pub adapters: PathBuf,
    /// Public base URL under which the html directory is served.
    pub url: String,
    #[serde(default)]
    pub options: AnalysisOptions,
    pub annotations: Annotations,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisOptions {
    #[serde(default = "default_peak_window_width")]
    pub peak_window_width: u32,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            peak_window_width: default_peak_window_width(),
        }
    }
}

fn default_peak_window_width() -> u32 {
    2000
}

/// Per-genome reference resources, one map per annotation category.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Annotations {
    #[serde(default)]
    pub genomes: HashMap<String, PathBuf>,
    #[serde(default)]
    pub chrsizes: HashMap<String, PathBuf>,
    #[serde(default)]
    pub genomewindows: HashMap<String, PathBuf>,
    #[serde(default)]
    pub tss: HashMap<String, PathBuf>,
    #[serde(default)]
    pub transcriptomes: HashMap<String, PathBuf>,
    #[serde(default)]
    pub kallisto_index: HashMap<String, PathBuf>,
}

impl Annotations {
    pub fn genome_index(&self, genome: &str) -> Result<&PathBuf, PipelineError> {
        Self::lookup(&self.genomes, "genomes", genome)
    }

    pub fn chrsizes(&self, genome: &str) -> Result<&PathBuf, PipelineError> {
        Self::lookup(&self.chrsizes, "chrsizes", genome)
    }

    pub fn genome_windows(&self, genome: &str) -> Result<&PathBuf, PipelineError> {
        Self::lookup(&self.genomewindows, "genomewindows", genome)
    }

    pub fn tss(&self, genome: &str) -> Result<&PathBuf, PipelineError> {
        Self::lookup(&self.tss, "tss", genome)
    }

    pub fn transcriptome(&self, genome: &str) -> Result<&PathBuf, PipelineError> {
        Self::lookup(&self.transcriptomes, "transcriptomes", genome)
    }

    pub fn kallisto_index(&self, genome: &str) -> Result<&PathBuf, PipelineError> {
        Self::lookup(&self.kallisto_index, "kallistoindex", genome)
    }

    fn lookup<'a>(
        map: &'a HashMap<String, PathBuf>,
        category: &str,
        genome: &str,
    ) -> Result<&'a PathBuf, PipelineError> {
        map.get(genome).ok_or_else(|| PipelineError::MissingAnnotation {
            category: category.to_string(),
            genome: genome.to_string(),
        })
    }
}

/// User/run-level options shared by both workflows.
#[derive(Debug, Clone, Deserialize)]
pub struct RunOptions {
    #[serde(default = "default_trimmer")]
    pub trimmer: Trimmer,
    #[serde(default = "default_peak_caller")]
    pub peak_caller: PeakCaller,
    #[serde(default = "default_cpus")]
    pub cpus: usize,
    /// Minimum mapping quality kept by the filter stage.
    #[serde(default = "default_quality")]
    pub quality: u8,
    /// Maximum paired-end insert size passed to the aligner.
    #[serde(default = "default_maxinsert")]
    pub maxinsert: u32,
    /// Suppresses post-run artifact deletion and run-input consumption.
    #[serde(default)]
    pub dry_run: bool,
}

fn default_trimmer() -> Trimmer {
    Trimmer::Trimmomatic
}

fn default_peak_caller() -> PeakCaller {
    PeakCaller::Macs2
}

fn default_cpus() -> usize {
    num_cpus::get()
}

fn default_quality() -> u8 {
    30
}

fn default_maxinsert() -> u32 {
    2000
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunInput {
    pub project: Project,
    pub sample: Sample,
    pub options: RunOptions,
}

impl RunInput {
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| PipelineError::InvalidConfig(format!("{}: {}", path.display(), e)))
    }

    /// Deletes the serialized run input after a successful run. A no-op
    /// under dry-run.
    pub fn consume(path: &Path, dry_run: bool) -> Result<(), PipelineError> {
        if !dry_run {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmapped_reads_accept_single_or_list() {
        let single: UnmappedReads = serde_json::from_str("\"/data/a.bam\"").unwrap();
        assert!(single.is_merged());
        assert_eq!(single.path().unwrap(), Path::new("/data/a.bam"));

        let reps: UnmappedReads =
            serde_json::from_str("[\"/data/a.bam\", \"/data/b.bam\"]").unwrap();
        assert!(!reps.is_merged());
        assert!(reps.path().is_err());
    }

    #[test]
    fn missing_annotation_names_category_and_genome() {
        let annotations = Annotations::default();
        let err = annotations.genome_index("hg19").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("genomes"));
        assert!(message.contains("hg19"));
    }

    #[test]
    fn run_options_fill_defaults() {
        let opts: RunOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts.trimmer, Trimmer::Trimmomatic);
        assert_eq!(opts.peak_caller, PeakCaller::Macs2);
        assert!(opts.cpus > 0);
        assert_eq!(opts.quality, 30);
        assert!(!opts.dry_run);
    }

    #[test]
    fn sample_with_nested_control() {
        let raw = r#"{
            "name": "tf_chip",
            "genome": "hg19",
            "paired": true,
            "sample_root": "/out/tf_chip",
            "unmapped_bam": "/data/tf_chip.bam",
            "ctrl": {
                "name": "igg",
                "genome": "hg19",
                "sample_root": "/out/igg",
                "unmapped_bam": "/data/igg.bam"
            }
        }"#;
        let sample: Sample = serde_json::from_str(raw).unwrap();
        let ctrl = sample.ctrl.as_deref().unwrap();
        assert_eq!(ctrl.name, "igg");
        assert!(ctrl.ctrl.is_none());
    }
}
