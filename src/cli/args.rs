use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "ngs-pipelines", version = "0.1")]
pub struct Arguments {
    /// Workflow to run: chipseq or quantseq.
    #[arg(short, long)]
    pub module: String,

    /// Serialized run input: a JSON document holding the project, the sample
    /// and the run options. Consumed (deleted) after a successful, non-dry run.
    pub run_input: String,

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,
}
