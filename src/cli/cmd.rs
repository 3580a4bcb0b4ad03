use color_eyre::{Section, SectionExt};
use eyre::{Report, WrapErr};
use tracing as trc;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::driver::Benchmark;

/// How many lines of a failed run's output are attached to the error
const OUTPUT_TAIL_LINES: usize = 20;

/// Runs the benchmark runner executable with a module
#[derive(Debug, Clone)]
pub struct ProcessBenchmark {
    pub runner: PathBuf,
    pub module: PathBuf,
}

impl Benchmark for ProcessBenchmark {
    #[trc::instrument(skip(self), fields(runner = %self.runner.display()))]
    fn run(&mut self, trace: bool, report_path: &Path) -> eyre::Result<()> {
        let mut command = Command::new(&self.runner);
        command.arg(&self.module);
        if trace {
            command.env("RUST_BACKTRACE", "1");
        }

        command
            .status_into(report_path)
            .wrap_err("Could not run benchmark")
    }
}

/// Helper trait to run a command with its output sent to a file and handle errors
trait CommandStatus {
    fn status_into(&mut self, output_path: &Path) -> Result<(), Report>;
}

impl CommandStatus for Command {
    #[trc::instrument(level = "debug")]
    fn status_into(&mut self, output_path: &Path) -> Result<(), Report> {
        let stdout = File::create(output_path)
            .wrap_err_with(|| format!("Could not create {}", output_path.display()))?;
        let stderr = stdout.try_clone()?;

        let status = self
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .status()?;

        if !status.success() {
            let output = std::fs::read_to_string(output_path).unwrap_or_default();
            let lines: Vec<_> = output.lines().collect();
            let tail = lines[lines.len().saturating_sub(OUTPUT_TAIL_LINES)..].join("\n");

            Err(eyre::format_err!(
                "cmd exited with non-zero status code: {}",
                status
                    .code()
                    .map(|x| x.to_string())
                    .unwrap_or_else(|| "none".to_string())
            ))
            .with_section(move || tail.header("Output:"))
        } else {
            Ok(())
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(dir: &Path, script: &str) -> ProcessBenchmark {
        let path = dir.join("bench.sh");
        std::fs::write(&path, script).unwrap();
        ProcessBenchmark {
            runner: PathBuf::from("sh"),
            module: path,
        }
    }

    #[test]
    fn output_lands_in_the_report() {
        let dir = tempfile::tempdir().unwrap();
        let report = dir.path().join("report.txt");
        let mut benchmark = shell(dir.path(), "echo out; echo err 1>&2; echo trace=$RUST_BACKTRACE\n");

        benchmark.run(true, &report).unwrap();
        let text = std::fs::read_to_string(&report).unwrap();
        assert!(text.contains("out"));
        assert!(text.contains("err"));
        assert!(text.contains("trace=1"));
    }

    #[test]
    fn failing_run_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let report = dir.path().join("report.txt");
        let mut benchmark = shell(dir.path(), "echo partial output\nexit 3\n");

        let err = benchmark.run(false, &report).unwrap_err();
        assert!(format!("{:?}", err).contains("non-zero status code: 3"));
    }
}
