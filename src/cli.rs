use std::path::{Path, PathBuf};

use argh::FromArgs;
use eyre::WrapErr;
use human_format::{Formatter, Scales};
use thiserror::Error;
use tracing as trc;

use crate::average::RunningAverages;
use crate::driver::IterationDriver;
use crate::output::{CsvWriters, SummaryWriter};

mod cmd;

pub use cmd::ProcessBenchmark;

/// The file the benchmark's output is captured in for each iteration
static REPORT_FILE_NAME: &str = "benchmark_output.txt";

/// The file the averages are written to at the end of the run
static SUMMARY_FILE_NAME: &str = "stats_summary.txt";

/// An error that ndicates that the program should exit with the given code
#[derive(Error, Debug)]
#[error("Program exited {0}")]
struct Exit(i32);

/// A problem with the command line arguments
#[derive(Error, Debug)]
enum ArgError {
    #[error("Number of iterations must be a positive integer")]
    ZeroIterations,
}

#[derive(FromArgs, Debug)]
/// Run a benchmark repeatedly and average the metrics of each of its phases.
struct Args {
    /// number of times to run the benchmark
    #[argh(positional)]
    iterations: u32,

    /// set RUST_BACKTRACE=1 for the benchmark when nonzero
    #[argh(positional)]
    enable_stack_trace: i64,

    /// the executable that runs the benchmark module
    #[argh(option, default = "PathBuf::from(\"./wasmtime-test\")")]
    runner: PathBuf,

    /// the module passed to the runner
    #[argh(option, default = "PathBuf::from(\"wasi-nn-module.wasm\")")]
    module: PathBuf,

    /// where to create the dated results directory
    #[argh(option, default = "PathBuf::from(\".\")")]
    output_dir: PathBuf,
}

/// Start program logic
fn start() -> eyre::Result<()> {
    let args: Args = trc::debug_span!("Parsing commandline args").in_scope(|| argh::from_env());
    validate(&args)?;

    let run_dir = create_run_dir(&args.output_dir).wrap_err(Exit(1))?;
    let csv = CsvWriters::create(&run_dir).wrap_err(Exit(1))?;
    let summary = SummaryWriter::create(run_dir.join(SUMMARY_FILE_NAME)).wrap_err(Exit(1))?;

    trc::info!("Writing results to `{}`", run_dir.display());

    let benchmark = ProcessBenchmark {
        runner: args.runner,
        module: args.module,
    };
    let outcome = trc::info_span!("Benchmarking").in_scope(|| {
        IterationDriver::new(
            benchmark,
            run_dir.join(REPORT_FILE_NAME),
            args.enable_stack_trace != 0,
            csv,
            summary,
        )
        .run(args.iterations)
    })?;

    log_averages(&outcome.averages);
    trc::info!(
        "Benchmarking completed, results are in `{}`",
        run_dir.display()
    );

    Ok(())
}

/// Check the arguments argh cannot check for us, before anything touches the disk
fn validate(args: &Args) -> eyre::Result<()> {
    if args.iterations == 0 {
        return Err(ArgError::ZeroIterations).wrap_err(Exit(1));
    }
    Ok(())
}

/// Create the `<date>/<time>` directory for this run's results
fn create_run_dir(output_dir: &Path) -> eyre::Result<PathBuf> {
    let now = chrono::Local::now();
    let run_dir = output_dir
        .join(now.format("%Y_%m_%d").to_string())
        .join(now.format("%H_%M_%S").to_string());

    std::fs::create_dir_all(&run_dir)
        .wrap_err_with(|| format!("Could not create results directory {}", run_dir.display()))?;

    Ok(run_dir)
}

fn log_averages(averages: &RunningAverages) {
    let mut formatter = Formatter::new();
    formatter.with_scales(Scales::Binary()).with_units("B");

    for (phase, average) in averages.iter() {
        trc::info!(
            observations = average.observations,
            "{}: {:.3} ms wall clock, {:.2}% CPU, {} max RSS",
            phase,
            average.wall_clock_ms,
            average.cpu_usage_pct,
            formatter.format(average.max_rss_bytes as f64)
        );
    }
}

/// Run the ClI
pub fn run() {
    // Install tracing for logs
    install_tracing();
    // Install color error printing
    color_eyre::install().expect("Could not install error handler");

    // Start the application and capture errors
    match start() {
        // Do nothing for happy runs!
        Ok(()) => (),
        // Hnadle errors
        Err(report) => {
            // If the error is an exit code
            if let Some(e) = report.downcast_ref::<Exit>() {
                let code = e.0;

                // If the code is zero, exit cleanly
                if code == 0 {
                    std::process::exit(0);

                // If the code is non-zero print the error and then exit with that code
                } else {
                    trc::error!("{:?}", report);
                    std::process::exit(e.0);
                }
            // If the error is any other kind of error print it and exit 1
            } else {
                trc::error!("{:?}", report);
                std::process::exit(1);
            }
        }
    }
}

fn install_tracing() {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    // Build the tracing layers
    let fmt_layer = fmt::layer().with_target(false);
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();

    // Add all of the layers to the subscriber and initialize it
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}
