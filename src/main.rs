// Propositional forward / backward chainer.
//
// Behavior:
// - With FILES, solves each file and prints its report.
// - Without FILES, solves every file in --dir whose name starts with
//   --prefix (default "bc" for backward, "fc" for forward), sorted by name.
// - Each file gets its own engine; nothing is shared between runs.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use chainlite::batch::{run_batch, run_file, Run};
use chainlite::config::{BatchConfig, EngineConfig, Strategy};
use chainlite::report::{render_json_runs, render_text};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "chainlite")]
#[command(about = "Forward and backward chaining over propositional rule files")]
struct Args {
    /// Input files; when empty, scan --dir for files starting with --prefix
    files: Vec<PathBuf>,

    /// Inference strategy
    #[arg(short, long, value_enum, default_value_t = Strategy::Backward)]
    strategy: Strategy,

    /// Directory scanned in batch mode
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,

    /// File name prefix for batch mode (defaults per strategy)
    #[arg(short, long)]
    prefix: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Logging level, overridden by RUST_LOG
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Ok(false) when some named input could not be loaded.
fn run(args: &Args) -> Result<bool> {
    let engine = EngineConfig {
        strategy: args.strategy,
    };

    if !args.files.is_empty() {
        let mut ok = true;
        let mut runs = vec![];
        for path in &args.files {
            match run_file(path, &engine) {
                Ok(run) => runs.push((path.as_path(), run)),
                Err(e) => {
                    eprintln!("error: {e}");
                    ok = false;
                }
            }
        }
        print_runs(runs.iter().map(|(path, run)| (*path, run)), args.format)?;
        return Ok(ok);
    }

    let config = BatchConfig {
        dir: args.dir.clone(),
        prefix: args
            .prefix
            .clone()
            .unwrap_or_else(|| args.strategy.default_prefix().to_string()),
        engine,
    };
    let report = run_batch(&config).context("batch run failed")?;

    if args.format == Format::Text {
        println!(
            "{} run started {}, {} file(s) in {} matching `{}*`",
            config.engine.strategy,
            report.started.format("%Y-%m-%d %H:%M:%S"),
            report.runs.len(),
            config.dir.display(),
            config.prefix
        );
    }

    for file in &report.runs {
        if let Err(e) = &file.result {
            eprintln!("error: {e}");
        }
    }
    let loaded = report
        .runs
        .iter()
        .filter_map(|file| Some((file.path.as_path(), file.result.as_ref().ok()?)));
    print_runs(loaded, args.format)?;

    if args.format == Format::Text {
        println!(
            "{} of {} derived, {} unreadable",
            report.derived(),
            report.runs.len(),
            report.failed()
        );
    }
    Ok(true)
}

/// Text reports one after another, or a single JSON array.
fn print_runs<'a>(
    runs: impl IntoIterator<Item = (&'a Path, &'a Run)>,
    format: Format,
) -> Result<()> {
    match format {
        Format::Text => {
            for (path, run) in runs {
                println!("WORK WITH {}", path.display());
                println!("{}", render_text(&run.kb, &run.outcome));
            }
        }
        Format::Json => {
            let json = render_json_runs(
                runs.into_iter()
                    .map(|(path, run)| (&run.kb, &run.outcome, Some(path))),
            )
            .context("cannot serialize report")?;
            println!("{json}");
        }
    }
    Ok(())
}
