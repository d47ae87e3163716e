/// Quant-seq workflow.
///
/// Merges and trims unmapped reads, then quantifies transcripts three ways:
/// count-based over a tophat alignment, count-based over an independent
/// ERCC spike-in alignment, and k-mer pseudo-alignment with kallisto.
use std::path::PathBuf;

use log::info;

use crate::config::defs::{
    BOWTIE2_TAG, ERCC_GENOME, FASTQC_TAG, HTSEQ_COUNT_TAG, KALLISTO_TAG, PipelineError,
    SAM_TO_FASTQ_TAG, SAMBAMBA_TAG, SAMTOOLS_TAG, TOPHAT_TAG, TRIMMOMATIC_TAG, Trimmer,
};
use crate::config::input::{Project, RunOptions, Sample, SampleDirs};
use crate::pipelines::common::{self, FastqSlots, TrimmedSlots};
use crate::runner::Runner;
use crate::toolkit;
use crate::utils::file::ensure_dir;

/// One entry of the resolved Quant-seq stage plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantStage {
    MergeReplicates,
    QualityReport,
    ToFastq,
    Trim(Trimmer),
    AlignTranscriptome,
    AlignErcc,
    FilterReads,
    FilterErcc,
    SortIndex,
    SortIndexErcc,
    Quantify,
    QuantifyErcc,
    PseudoAlignQuant,
}

impl QuantStage {
    pub fn label(&self) -> &'static str {
        match self {
            Self::MergeReplicates => "Merging bam files from replicates",
            Self::QualityReport => "Measuring sample quality with Fastqc",
            Self::ToFastq => "Converting to Fastq format",
            Self::Trim(_) => "Trimming adapters from sample",
            Self::AlignTranscriptome => "Mapping sample with Tophat",
            Self::AlignErcc => "Mapping ERCC spike-ins with Bowtie2",
            Self::FilterReads => "Filtering reads",
            Self::FilterErcc => "Filtering ERCC reads",
            Self::SortIndex => "Sorting and indexing reads",
            Self::SortIndexErcc => "Sorting and indexing ERCC reads",
            Self::Quantify => "Quantifying sample transcripts with htseq-count",
            Self::QuantifyErcc => "Quantifying ERCC transcripts with htseq-count",
            Self::PseudoAlignQuant => "Quantifying read counts with kallisto",
        }
    }

    /// The spike-in quantification and the pseudo-alignment are optional
    /// extras; only the primary quantification aborts the run.
    pub fn tolerant(&self) -> bool {
        matches!(self, Self::QuantifyErcc | Self::PseudoAlignQuant)
    }
}

/// Resolves the ordered stage plan for one sample. Trimmomatic is enforced
/// for this workflow regardless of the configured trimmer.
pub fn quant_stages(sample: &Sample, _opts: &RunOptions) -> Vec<QuantStage> {
    let mut stages = Vec::new();
    if !sample.unmapped_bam.is_merged() {
        stages.push(QuantStage::MergeReplicates);
    }
    stages.push(QuantStage::QualityReport);
    stages.push(QuantStage::ToFastq);
    stages.push(QuantStage::Trim(Trimmer::Trimmomatic));
    stages.push(QuantStage::AlignTranscriptome);
    stages.push(QuantStage::AlignErcc);
    stages.push(QuantStage::FilterReads);
    stages.push(QuantStage::FilterErcc);
    stages.push(QuantStage::SortIndex);
    stages.push(QuantStage::SortIndexErcc);
    stages.push(QuantStage::Quantify);
    stages.push(QuantStage::QuantifyErcc);
    stages.push(QuantStage::PseudoAlignQuant);
    stages
}

/// File-path slots of one Quant-seq sample run, fixed at workflow start.
#[derive(Debug, Clone)]
pub struct QuantPaths {
    pub merged_bam: PathBuf,
    pub fastq: FastqSlots,
    pub trimmed: TrimmedSlots,
    pub trim_prefix: PathBuf,
    pub trimlog: PathBuf,
    pub mapped: PathBuf,
    pub ercc_mapped: PathBuf,
    pub ercc_aln_rates: PathBuf,
    pub ercc_aln_metrics: PathBuf,
    pub filtered: PathBuf,
    pub dups_metrics: PathBuf,
    pub ercc_filtered: PathBuf,
    pub ercc_dups_metrics: PathBuf,
    pub quant: PathBuf,
    pub ercc_quant: PathBuf,
    pub pseudomapped: PathBuf,
}

impl QuantPaths {
    pub fn new(sample: &Sample) -> Self {
        let dirs = sample.dirs();
        let name = &sample.name;
        Self {
            merged_bam: dirs.unmapped.join(format!("{}.merged.bam", name)),
            fastq: FastqSlots::new(&dirs.unmapped, name, sample.paired),
            trimmed: TrimmedSlots::new(&dirs.unmapped, name, sample.paired, Trimmer::Trimmomatic),
            trim_prefix: dirs.unmapped.join(name),
            trimlog: dirs.root.join(format!("{}.trimlog.txt", name)),
            mapped: dirs.mapped.join("accepted_hits.bam"),
            ercc_mapped: dirs.mapped.join(format!("{}.ercc.bam", name)),
            ercc_aln_rates: dirs.root.join(format!("{}.ercc.alnRates.txt", name)),
            ercc_aln_metrics: dirs.root.join(format!("{}.ercc.alnMetrics.txt", name)),
            filtered: dirs.mapped.join(format!("{}.filtered.bam", name)),
            dups_metrics: dirs.root.join(format!("{}.duplicates.txt", name)),
            ercc_filtered: dirs.mapped.join(format!("{}.ercc.filtered.bam", name)),
            ercc_dups_metrics: dirs.root.join(format!("{}.ercc.duplicates.txt", name)),
            quant: dirs.quant.join(format!("{}.quant.tsv", name)),
            ercc_quant: dirs.quant.join(format!("{}.ercc.quant.tsv", name)),
            pseudomapped: dirs.quant.join(format!("{}.pseudoalignment.bam", name)),
        }
    }
}

fn required_tools(plan: &[QuantStage]) -> Vec<&'static str> {
    fn add(tool: &'static str, tools: &mut Vec<&'static str>) {
        if !tools.contains(&tool) {
            tools.push(tool);
        }
    }
    let mut tools: Vec<&'static str> = Vec::new();
    for stage in plan {
        match stage {
            QuantStage::MergeReplicates | QuantStage::SortIndex | QuantStage::SortIndexErcc => {
                add(SAMTOOLS_TAG, &mut tools)
            }
            QuantStage::QualityReport => add(FASTQC_TAG, &mut tools),
            QuantStage::ToFastq => add(SAM_TO_FASTQ_TAG, &mut tools),
            QuantStage::Trim(_) => add(TRIMMOMATIC_TAG, &mut tools),
            QuantStage::AlignTranscriptome => add(TOPHAT_TAG, &mut tools),
            QuantStage::AlignErcc => {
                add(BOWTIE2_TAG, &mut tools);
                add(SAMTOOLS_TAG, &mut tools);
            }
            QuantStage::FilterReads | QuantStage::FilterErcc => {
                add(SAMBAMBA_TAG, &mut tools);
                add(SAMTOOLS_TAG, &mut tools);
            }
            QuantStage::Quantify | QuantStage::QuantifyErcc => {
                add(HTSEQ_COUNT_TAG, &mut tools);
                add(SAMTOOLS_TAG, &mut tools);
            }
            QuantStage::PseudoAlignQuant => {
                add(KALLISTO_TAG, &mut tools);
                add(SAMTOOLS_TAG, &mut tools);
            }
        }
    }
    tools
}

pub async fn run(
    prj: &Project,
    sample: &mut Sample,
    opts: &RunOptions,
) -> Result<(), PipelineError> {
    info!("Start processing Quant-seq sample {}.", sample.name);
    let dirs = sample.dirs();
    let paths = QuantPaths::new(sample);
    let plan = quant_stages(sample, opts);
    toolkit::require_tools(&required_tools(&plan)).await?;
    ensure_dir(&dirs.unmapped)?;
    ensure_dir(&dirs.mapped)?;
    ensure_dir(&dirs.quant)?;

    let mut pipe = Runner::start("quantseq", &dirs.root, opts.dry_run)?;
    for stage in &plan {
        exec_stage(&mut pipe, stage, prj, sample, opts, &paths, &dirs).await?;
    }
    pipe.stop()?;
    info!("Finished processing sample {}.", sample.name);
    Ok(())
}

async fn exec_stage(
    pipe: &mut Runner,
    stage: &QuantStage,
    prj: &Project,
    sample: &mut Sample,
    opts: &RunOptions,
    paths: &QuantPaths,
    dirs: &SampleDirs,
) -> Result<(), PipelineError> {
    pipe.timestamp(stage.label());
    let annotations = &prj.config.annotations;
    match stage {
        QuantStage::MergeReplicates => {
            common::merge_replicates(pipe, sample, &paths.merged_bam).await?;
        }
        QuantStage::QualityReport => {
            common::quality_report(pipe, sample).await?;
        }
        QuantStage::ToFastq => {
            common::bam_to_fastq(pipe, sample, &paths.fastq).await?;
        }
        QuantStage::Trim(trimmer) => {
            common::trim_reads(
                pipe,
                *trimmer,
                &paths.fastq,
                &paths.trimmed,
                &paths.trim_prefix,
                &prj.config.adapters,
                &paths.trimlog,
                opts.cpus,
            )
            .await?;
        }
        QuantStage::AlignTranscriptome => {
            let cmd = toolkit::align::tophat_map(
                paths.trimmed.primary(),
                &dirs.mapped,
                annotations.genome_index(&sample.genome)?,
                annotations.transcriptome(&sample.genome)?,
                opts.cpus,
            );
            pipe.run(&cmd, false).await?;
            pipe.clean_add(&paths.mapped, true);
        }
        QuantStage::AlignErcc => {
            let cmd = toolkit::align::bowtie2_map(
                paths.trimmed.primary(),
                paths.trimmed.mate(),
                &paths.ercc_mapped,
                &paths.ercc_aln_rates,
                &paths.ercc_aln_metrics,
                annotations.genome_index(ERCC_GENOME)?,
                opts.maxinsert,
                opts.cpus,
            );
            pipe.run(&cmd, false).await?;
            pipe.clean_add(&paths.ercc_mapped, true);
        }
        QuantStage::FilterReads => {
            let cmd = toolkit::align::filter_reads(
                &paths.mapped,
                &paths.filtered,
                &paths.dups_metrics,
                sample.paired,
                opts.cpus,
                opts.quality,
            );
            pipe.run(&cmd, false).await?;
        }
        QuantStage::FilterErcc => {
            let cmd = toolkit::align::filter_reads(
                &paths.ercc_mapped,
                &paths.ercc_filtered,
                &paths.ercc_dups_metrics,
                sample.paired,
                opts.cpus,
                opts.quality,
            );
            pipe.run(&cmd, false).await?;
        }
        QuantStage::SortIndex => {
            // In-place sort: the output path equals the input path, so the
            // checkpoint is keyed by stage name.
            let cmd = toolkit::align::sort_index_bam(&paths.filtered, opts.cpus);
            pipe.run_named(&cmd, "sort_index_filtered", false).await?;
        }
        QuantStage::SortIndexErcc => {
            let cmd = toolkit::align::sort_index_bam(&paths.ercc_filtered, opts.cpus);
            pipe.run_named(&cmd, "sort_index_ercc_filtered", false).await?;
        }
        QuantStage::Quantify => {
            let cmd = toolkit::quant::htseq_count(
                &paths.filtered,
                annotations.transcriptome(&sample.genome)?,
                &paths.quant,
            );
            pipe.run(&cmd, stage.tolerant()).await?;
        }
        QuantStage::QuantifyErcc => {
            let cmd = toolkit::quant::htseq_count(
                &paths.ercc_filtered,
                annotations.transcriptome(ERCC_GENOME)?,
                &paths.ercc_quant,
            );
            pipe.run(&cmd, stage.tolerant()).await?;
        }
        QuantStage::PseudoAlignQuant => {
            let cmd = toolkit::quant::kallisto(
                paths.trimmed.primary(),
                paths.trimmed.mate(),
                &dirs.quant,
                &paths.pseudomapped,
                annotations.kallisto_index(&sample.genome)?,
                opts.cpus,
            );
            pipe.run(&cmd, stage.tolerant()).await?;
        }
    }
    Ok(())
}
