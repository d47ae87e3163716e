/// ChIP-seq workflow.
///
/// Takes unmapped BAMs to trimmed, aligned, quality-filtered, indexed (and
/// shifted for tagmented samples) BAMs plus a browser track, then, for
/// samples with a control, peak calls, motif work, enrichment plots and
/// FRiP. Every branch is resolved once, up front, into an ordered stage
/// plan; the run loop only dispatches plan entries.
use std::path::{Path, PathBuf};

use log::info;

use crate::config::defs::{
    BEDGRAPH_TO_BIGWIG_TAG, BEDTOOLS_TAG, BOWTIE2_TAG, FASTQC_TAG, GENOME_COVERAGE_TAG,
    HOMER_ANNOTATE_TAG, HOMER_FIND_MOTIFS_TAG, MACS2_TAG, PeakCaller, PipelineError, RSCRIPT_TAG,
    SAM_TO_FASTQ_TAG, SAMBAMBA_TAG, SAMTOOLS_TAG, SKEWER_TAG, TRIMMOMATIC_TAG, Trimmer,
};
use crate::config::input::{Project, RunOptions, Sample, SampleDirs};
use crate::pipelines::common::{self, FastqSlots, TrimmedSlots};
use crate::runner::{Runner, hub};
use crate::toolkit;
use crate::utils::file::{basename, ensure_dir};

const MOTIF_LENGTHS: &str = "8,10,12,14,16";

/// One motif-discovery invocation. Transcription-factor samples search a
/// tight window around the binding site and a wider one for co-binders;
/// histone samples use a single broad search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotifScan {
    Histone,
    TfSelf,
    TfCobinders,
}

impl MotifScan {
    pub fn window_size(&self) -> u32 {
        match self {
            Self::Histone => 1000,
            Self::TfSelf => 50,
            Self::TfCobinders => 200,
        }
    }

    pub fn n_motifs(&self) -> u32 {
        match self {
            Self::Histone => 20,
            Self::TfSelf => 8,
            Self::TfCobinders => 12,
        }
    }
}

/// One entry of the resolved ChIP-seq stage plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipStage {
    MergeReplicates,
    QualityReport,
    ToFastq,
    Trim(Trimmer),
    Align,
    FilterReads,
    ShiftReads,
    IndexMapped,
    IndexFiltered,
    IndexShifted,
    MakeTracks,
    Coverage,
    SignalNoiseQc,
    CallPeaks(PeakCaller),
    PlotMacs2Model,
    FindMotifs(MotifScan),
    CenterPeaksOnMotifs,
    AnnotatePeaks,
    PlotPeakEnrichment,
    PlotTssEnrichment,
    Frip,
}

impl ChipStage {
    pub fn label(&self) -> &'static str {
        match self {
            Self::MergeReplicates => "Merging bam files from replicates",
            Self::QualityReport => "Measuring sample quality with Fastqc",
            Self::ToFastq => "Converting to Fastq format",
            Self::Trim(_) => "Trimming adapters from sample",
            Self::Align => "Mapping reads with Bowtie2",
            Self::FilterReads => "Filtering reads for quality",
            Self::ShiftReads => "Shifting reads of tagmented sample",
            Self::IndexMapped => "Indexing mapped bam with samtools",
            Self::IndexFiltered => "Indexing filtered bam with samtools",
            Self::IndexShifted => "Indexing shifted bam with samtools",
            Self::MakeTracks => "Making bigWig tracks from bam file",
            Self::Coverage => "Calculating genome-wide coverage",
            Self::SignalNoiseQc => "Assessing signal/noise in sample",
            Self::CallPeaks(PeakCaller::Macs2) => "Calling peaks with MACS2",
            Self::CallPeaks(PeakCaller::Spp) => "Calling peaks with spp",
            Self::CallPeaks(PeakCaller::Zinba) => "Calling peaks with zinba",
            Self::PlotMacs2Model => "Plotting MACS2 model",
            Self::FindMotifs(_) => "Finding motifs",
            Self::CenterPeaksOnMotifs => "Centering peaks on motifs",
            Self::AnnotatePeaks => "Annotating peaks with motif info",
            Self::PlotPeakEnrichment => "Plotting enrichment at peaks centered on motifs",
            Self::PlotTssEnrichment => "Plotting enrichment around TSSs",
            Self::Frip => "Calculating fraction of reads in peaks (FRiP)",
        }
    }

    /// Failure-tolerant stages log and continue instead of aborting.
    pub fn tolerant(&self) -> bool {
        matches!(
            self,
            Self::SignalNoiseQc | Self::PlotPeakEnrichment | Self::PlotTssEnrichment
        )
    }
}

/// Resolves the ordered stage plan for one sample. All branching on sample
/// and run flags happens here, once; a sample without a control stops after
/// the signal/noise QC stage.
pub fn chip_stages(sample: &Sample, opts: &RunOptions) -> Vec<ChipStage> {
    let mut stages = Vec::new();
    if !sample.unmapped_bam.is_merged() {
        stages.push(ChipStage::MergeReplicates);
    }
    stages.push(ChipStage::QualityReport);
    stages.push(ChipStage::ToFastq);
    stages.push(ChipStage::Trim(opts.trimmer));
    stages.push(ChipStage::Align);
    stages.push(ChipStage::FilterReads);
    if sample.tagmented {
        stages.push(ChipStage::ShiftReads);
    }
    stages.push(ChipStage::IndexMapped);
    stages.push(ChipStage::IndexFiltered);
    if sample.tagmented {
        stages.push(ChipStage::IndexShifted);
    }
    stages.push(ChipStage::MakeTracks);
    stages.push(ChipStage::Coverage);
    stages.push(ChipStage::SignalNoiseQc);

    if sample.ctrl.is_none() {
        return stages;
    }

    stages.push(ChipStage::CallPeaks(opts.peak_caller));
    if opts.peak_caller == PeakCaller::Macs2 {
        stages.push(ChipStage::PlotMacs2Model);
    }
    if sample.histone {
        stages.push(ChipStage::FindMotifs(MotifScan::Histone));
    } else {
        stages.push(ChipStage::FindMotifs(MotifScan::TfSelf));
        stages.push(ChipStage::FindMotifs(MotifScan::TfCobinders));
    }
    stages.push(ChipStage::CenterPeaksOnMotifs);
    stages.push(ChipStage::AnnotatePeaks);
    stages.push(ChipStage::PlotPeakEnrichment);
    stages.push(ChipStage::PlotTssEnrichment);
    stages.push(ChipStage::Frip);
    stages
}

/// File-path slots of one ChIP-seq sample run, fixed at workflow start.
/// Slots gated by a sample flag are `None` when the flag is off and are
/// never dereferenced then.
#[derive(Debug, Clone)]
pub struct ChipPaths {
    pub merged_bam: PathBuf,
    pub fastq: FastqSlots,
    pub trimmed: TrimmedSlots,
    pub trim_prefix: PathBuf,
    pub trimlog: PathBuf,
    pub mapped: PathBuf,
    pub aln_rates: PathBuf,
    pub aln_metrics: PathBuf,
    pub filtered: PathBuf,
    pub dups_metrics: PathBuf,
    pub filtered_shifted: Option<PathBuf>,
    pub coverage: PathBuf,
    pub qc: PathBuf,
    pub qc_plot: PathBuf,
    pub peaks: PathBuf,
    pub motifs_dir: PathBuf,
    pub cobinder_motifs_dir: PathBuf,
    pub peaks_motif_centered: PathBuf,
    pub peaks_motif_annotated: PathBuf,
    pub frip: PathBuf,
}

impl ChipPaths {
    pub fn new(sample: &Sample, opts: &RunOptions) -> Self {
        let dirs = sample.dirs();
        let name = &sample.name;
        let peaks = match opts.peak_caller {
            PeakCaller::Macs2 => {
                toolkit::peaks::macs2_peaks_path(&dirs.peaks, name, sample.broad)
            }
            PeakCaller::Spp => toolkit::peaks::spp_peaks_path(&dirs.peaks, name, sample.broad),
            PeakCaller::Zinba => dirs.peaks.join(format!("{}.zinba.bed", name)),
        };
        Self {
            merged_bam: dirs.unmapped.join(format!("{}.merged.bam", name)),
            fastq: FastqSlots::new(&dirs.unmapped, name, sample.paired),
            trimmed: TrimmedSlots::new(&dirs.unmapped, name, sample.paired, opts.trimmer),
            trim_prefix: dirs.unmapped.join(name),
            trimlog: dirs.root.join(format!("{}.trimlog.txt", name)),
            mapped: dirs.mapped.join(format!("{}.trimmed.bowtie2.bam", name)),
            aln_rates: dirs.root.join(format!("{}.alnRates.txt", name)),
            aln_metrics: dirs.root.join(format!("{}.alnMetrics.txt", name)),
            filtered: dirs
                .mapped
                .join(format!("{}.trimmed.bowtie2.filtered.bam", name)),
            dups_metrics: dirs.root.join(format!("{}.duplicates.txt", name)),
            filtered_shifted: sample.tagmented.then(|| {
                dirs.mapped
                    .join(format!("{}.trimmed.bowtie2.filtered.shifted.bam", name))
            }),
            coverage: dirs.root.join(format!("{}.cov", name)),
            qc: dirs.root.join(format!("{}_QC.tsv", name)),
            qc_plot: dirs.root.join(format!("{}_QC.pdf", name)),
            peaks,
            motifs_dir: dirs.motifs.clone(),
            cobinder_motifs_dir: PathBuf::from(format!("{}_cobinders", dirs.motifs.display())),
            peaks_motif_centered: dirs.peaks.join(format!("{}_peaks.motifCentered.bed", name)),
            peaks_motif_annotated: dirs
                .peaks
                .join(format!("{}_peaks.motifAnnotated.bed", name)),
            frip: dirs.root.join(format!("{}_FRiP.txt", name)),
        }
    }

    fn motif_dir(&self, scan: MotifScan) -> &Path {
        match scan {
            MotifScan::Histone | MotifScan::TfSelf => &self.motifs_dir,
            MotifScan::TfCobinders => &self.cobinder_motifs_dir,
        }
    }

    /// Top motif of the first discovery stage, consumed by the centering
    /// and annotation stages.
    fn first_motif(&self) -> PathBuf {
        self.motifs_dir.join("homerResults").join("motif1.motif")
    }
}

/// External executables the plan will invoke, in first-use order.
fn required_tools(plan: &[ChipStage]) -> Vec<&'static str> {
    fn add(tool: &'static str, tools: &mut Vec<&'static str>) {
        if !tools.contains(&tool) {
            tools.push(tool);
        }
    }
    let mut tools: Vec<&'static str> = Vec::new();
    for stage in plan {
        match stage {
            ChipStage::MergeReplicates
            | ChipStage::ShiftReads
            | ChipStage::IndexMapped
            | ChipStage::IndexFiltered
            | ChipStage::IndexShifted => add(SAMTOOLS_TAG, &mut tools),
            ChipStage::QualityReport => add(FASTQC_TAG, &mut tools),
            ChipStage::ToFastq => add(SAM_TO_FASTQ_TAG, &mut tools),
            ChipStage::Trim(Trimmer::Trimmomatic) => add(TRIMMOMATIC_TAG, &mut tools),
            ChipStage::Trim(Trimmer::Skewer) => add(SKEWER_TAG, &mut tools),
            ChipStage::Align => {
                add(BOWTIE2_TAG, &mut tools);
                add(SAMTOOLS_TAG, &mut tools);
            }
            ChipStage::FilterReads => {
                add(SAMBAMBA_TAG, &mut tools);
                add(SAMTOOLS_TAG, &mut tools);
            }
            ChipStage::MakeTracks => {
                add(BEDTOOLS_TAG, &mut tools);
                add(GENOME_COVERAGE_TAG, &mut tools);
                add(BEDGRAPH_TO_BIGWIG_TAG, &mut tools);
            }
            ChipStage::Coverage | ChipStage::Frip => add(BEDTOOLS_TAG, &mut tools),
            ChipStage::SignalNoiseQc | ChipStage::PlotMacs2Model => add(RSCRIPT_TAG, &mut tools),
            ChipStage::CallPeaks(PeakCaller::Macs2) => add(MACS2_TAG, &mut tools),
            ChipStage::CallPeaks(PeakCaller::Spp) => add(RSCRIPT_TAG, &mut tools),
            ChipStage::CallPeaks(PeakCaller::Zinba) => {}
            ChipStage::FindMotifs(_) => add(HOMER_FIND_MOTIFS_TAG, &mut tools),
            ChipStage::CenterPeaksOnMotifs | ChipStage::AnnotatePeaks => {
                add(HOMER_ANNOTATE_TAG, &mut tools)
            }
            ChipStage::PlotPeakEnrichment | ChipStage::PlotTssEnrichment => {}
        }
    }
    tools
}

pub async fn run(
    prj: &Project,
    sample: &mut Sample,
    opts: &RunOptions,
) -> Result<(), PipelineError> {
    info!("Start processing ChIP-seq sample {}.", sample.name);
    let dirs = sample.dirs();
    let paths = ChipPaths::new(sample, opts);
    let plan = chip_stages(sample, opts);
    toolkit::require_tools(&required_tools(&plan)).await?;
    ensure_dir(&dirs.unmapped)?;
    ensure_dir(&dirs.mapped)?;

    let mut pipe = Runner::start("chipseq", &dirs.root, opts.dry_run)?;
    for stage in &plan {
        exec_stage(&mut pipe, stage, prj, sample, opts, &paths, &dirs).await?;
    }
    pipe.stop()?;
    info!("Finished processing sample {}.", sample.name);
    Ok(())
}

async fn exec_stage(
    pipe: &mut Runner,
    stage: &ChipStage,
    prj: &Project,
    sample: &mut Sample,
    opts: &RunOptions,
    paths: &ChipPaths,
    dirs: &SampleDirs,
) -> Result<(), PipelineError> {
    pipe.timestamp(stage.label());
    let annotations = &prj.config.annotations;
    match stage {
        ChipStage::MergeReplicates => {
            common::merge_replicates(pipe, sample, &paths.merged_bam).await?;
        }
        ChipStage::QualityReport => {
            common::quality_report(pipe, sample).await?;
        }
        ChipStage::ToFastq => {
            common::bam_to_fastq(pipe, sample, &paths.fastq).await?;
        }
        ChipStage::Trim(trimmer) => {
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
        ChipStage::Align => {
            let cmd = toolkit::align::bowtie2_map(
                paths.trimmed.primary(),
                paths.trimmed.mate(),
                &paths.mapped,
                &paths.aln_rates,
                &paths.aln_metrics,
                annotations.genome_index(&sample.genome)?,
                opts.maxinsert,
                opts.cpus,
            );
            pipe.run(&cmd, false).await?;
            // superseded by the filtered bam
            pipe.clean_add(&paths.mapped, true);
        }
        ChipStage::FilterReads => {
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
        ChipStage::ShiftReads => {
            let shifted = shifted_slot(paths)?;
            let cmd = toolkit::align::shift_reads(&paths.filtered, &sample.genome, shifted);
            pipe.run(&cmd, false).await?;
        }
        ChipStage::IndexMapped => {
            pipe.run(&toolkit::align::index_bam(&paths.mapped), false)
                .await?;
        }
        ChipStage::IndexFiltered => {
            pipe.run(&toolkit::align::index_bam(&paths.filtered), false)
                .await?;
        }
        ChipStage::IndexShifted => {
            let shifted = shifted_slot(paths)?;
            pipe.run(&toolkit::align::index_bam(shifted), false).await?;
        }
        ChipStage::MakeTracks => {
            // Tracks are made from the filtered bam with full read
            // extension, also for tagmented samples.
            let bigwig = prj.dirs.html.join(format!("{}.bigWig", sample.name));
            ensure_dir(&prj.dirs.html)?;
            let cmd = toolkit::tracks::bam_to_bigwig(
                &paths.filtered,
                &bigwig,
                annotations.chrsizes(&sample.genome)?,
                false,
                true,
            );
            pipe.run(&cmd, false).await?;

            let hub_path = prj
                .dirs
                .html
                .join(format!("trackHub_{}.txt", sample.genome));
            let track_url = format!("{}/{}/{}", prj.config.url, prj.name, basename(&bigwig));
            let entry =
                toolkit::tracks::track_hub_entry(&sample.name, &track_url, &sample.track_colour);
            let hub_key = format!("{}_track_hub", sample.name);
            if pipe.named_complete(&hub_key) {
                info!("Track already registered in hub, skipping");
            } else {
                hub::append_track(&hub_path, &entry).await?;
                pipe.mark_named(&hub_key)?;
            }

            let hub_url = format!(
                "{}/{}/trackHub_{}.txt",
                prj.config.url, prj.name, sample.genome
            );
            ensure_dir(&prj.dirs.root)?;
            hub::write_hub_link(
                &prj.dirs
                    .root
                    .join(format!("ucsc_tracks_{}.html", sample.genome)),
                &hub_url,
                &sample.genome,
            )?;
        }
        ChipStage::Coverage => {
            let cmd = toolkit::tracks::genome_wide_coverage(
                &paths.filtered,
                annotations.genome_windows(&sample.genome)?,
                &paths.coverage,
            );
            pipe.run(&cmd, false).await?;
        }
        ChipStage::SignalNoiseQc => {
            let cmd =
                toolkit::peaks::peak_tools(&paths.filtered, &paths.qc, &paths.qc_plot, opts.cpus);
            pipe.run(&cmd, stage.tolerant()).await?;
        }
        ChipStage::CallPeaks(caller) => {
            let ctrl = sample.ctrl.as_deref().ok_or_else(|| {
                PipelineError::InvalidConfig(
                    "peak calling requires a control sample".to_string(),
                )
            })?;
            match caller {
                PeakCaller::Macs2 => {
                    // macs2 fails if the output directory does not exist
                    ensure_dir(&dirs.peaks)?;
                    let ctrl_filtered = ChipPaths::new(ctrl, opts).filtered;
                    let cmd = toolkit::peaks::macs2_call_peaks(
                        &paths.filtered,
                        &ctrl_filtered,
                        &dirs.peaks,
                        &sample.name,
                        &sample.genome,
                        sample.broad,
                    );
                    pipe.run(&cmd, false).await?;
                }
                PeakCaller::Spp => {
                    ensure_dir(&dirs.peaks)?;
                    let ctrl_filtered = ChipPaths::new(ctrl, opts).filtered;
                    let cmd = toolkit::peaks::spp_call_peaks(
                        &paths.filtered,
                        &ctrl_filtered,
                        &sample.name,
                        &ctrl.name,
                        &dirs.peaks,
                        sample.broad,
                        opts.cpus,
                    );
                    pipe.run(&cmd, false).await?;
                }
                PeakCaller::Zinba => {
                    return Err(PipelineError::NotImplemented(
                        "peak calling with zinba".to_string(),
                    ));
                }
            }
        }
        ChipStage::PlotMacs2Model => {
            let cmd = toolkit::peaks::macs2_plot_model(&sample.name, &dirs.peaks);
            pipe.run(&cmd, false).await?;
        }
        ChipStage::FindMotifs(scan) => {
            let cmd = toolkit::peaks::homer_find_motifs(
                &paths.peaks,
                &sample.genome,
                paths.motif_dir(*scan),
                scan.window_size(),
                MOTIF_LENGTHS,
                scan.n_motifs(),
            );
            pipe.run(&cmd, false).await?;
        }
        ChipStage::CenterPeaksOnMotifs => {
            // TODO: derive the peak file from the caller that actually ran
            // instead of assuming the macs2 layout.
            let cmd = toolkit::peaks::center_peaks_on_motifs(
                &paths.peaks,
                &sample.genome,
                prj.config.options.peak_window_width,
                &paths.first_motif(),
                &paths.peaks_motif_centered,
            );
            pipe.run(&cmd, false).await?;
        }
        ChipStage::AnnotatePeaks => {
            let cmd = toolkit::peaks::annotate_peaks(
                &paths.peaks,
                &sample.genome,
                &paths.first_motif(),
                &paths.peaks_motif_annotated,
            );
            pipe.run(&cmd, false).await?;
        }
        ChipStage::PlotPeakEnrichment => {
            let plots_dir = prj.dirs.results.join("plots");
            ensure_dir(&plots_dir)?;
            let cmd = toolkit::peaks::peak_analysis(
                &paths.filtered,
                &paths.peaks_motif_centered,
                &plots_dir,
                prj.config.options.peak_window_width,
                fragment_size(sample),
                &sample.genome,
                5,
                true,
                true,
            );
            pipe.run_named(&cmd, &format!("{}_peaks_plot", sample.name), stage.tolerant())
                .await?;
        }
        ChipStage::PlotTssEnrichment => {
            let plots_dir = prj.dirs.results.join("plots");
            ensure_dir(&plots_dir)?;
            let cmd = toolkit::peaks::tss_analysis(
                &paths.filtered,
                annotations.tss(&sample.genome)?,
                &plots_dir,
                prj.config.options.peak_window_width,
                fragment_size(sample),
                &sample.genome,
                5,
                true,
                true,
            );
            pipe.run_named(&cmd, &format!("{}_tss_plot", sample.name), stage.tolerant())
                .await?;
        }
        ChipStage::Frip => {
            let cmd = toolkit::peaks::calculate_frip(&paths.filtered, &paths.peaks, &paths.frip);
            pipe.run(&cmd, false).await?;
        }
    }
    Ok(())
}

fn shifted_slot(paths: &ChipPaths) -> Result<&PathBuf, PipelineError> {
    paths.filtered_shifted.as_ref().ok_or_else(|| {
        PipelineError::InvalidConfig(
            "shifted output referenced for a non-tagmented sample".to_string(),
        )
    })
}

/// Tagmented reads count as single-base insertions; everything else uses
/// the sample's read length.
fn fragment_size(sample: &Sample) -> u32 {
    if sample.tagmented { 1 } else { sample.read_length }
}
