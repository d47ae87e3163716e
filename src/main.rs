use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use env_logger::Builder;
use log::{LevelFilter, error, info};

use ngs_pipelines::cli;
use ngs_pipelines::config::defs::PipelineError;
use ngs_pipelines::config::input::RunInput;
use ngs_pipelines::pipelines::{chipseq, quantseq};

#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();

    let args = cli::parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    println!("\n-------------\n NGS Pipelines\n-------------\n");

    let input_path = PathBuf::from(&args.run_input);
    let run = match RunInput::load(&input_path) {
        Ok(run) => run,
        Err(e) => {
            error!("Could not load run input: {}", e);
            std::process::exit(1);
        }
    };
    let RunInput {
        project,
        mut sample,
        options,
    } = run;
    info!("Loaded run input for sample {} from {}", sample.name, input_path.display());

    if let Err(e) = match args.module.as_str() {
        "chipseq" => chipseq::run(&project, &mut sample, &options).await,
        "quantseq" => quantseq::run(&project, &mut sample, &options).await,
        _ => Err(PipelineError::InvalidConfig(format!(
            "Invalid module: {}",
            args.module
        ))),
    } {
        error!(
            "Pipeline failed: {} at {} milliseconds.",
            e,
            run_start.elapsed().as_millis()
        );
        let code = if matches!(e, PipelineError::Interrupted) {
            130
        } else {
            1
        };
        std::process::exit(code);
    }

    RunInput::consume(&input_path, options.dry_run)?;

    println!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
    Ok(())
}
