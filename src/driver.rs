use std::path::{Path, PathBuf};

use eyre::WrapErr;
use serde::Serialize;
use tracing as trc;

use crate::average::RunningAverages;
use crate::output::{render_summary, CsvWriters, SummaryWriter};
use crate::report;

/// Something that can be benchmarked once per iteration
///
/// An implementation leaves its report at `report_path` and returns an error
/// if the benchmark did not succeed.
pub trait Benchmark {
    fn run(&mut self, trace: bool, report_path: &Path) -> eyre::Result<()>;
}

impl<F> Benchmark for F
where
    F: FnMut(bool, &Path) -> eyre::Result<()>,
{
    fn run(&mut self, trace: bool, report_path: &Path) -> eyre::Result<()> {
        self(trace, report_path)
    }
}

/// Counters describing how a run went
#[derive(Serialize, Default, Clone, Debug, PartialEq)]
pub struct RunStats {
    pub iterations: u32,
    pub failed_runs: u32,
    pub missing_reports: u32,
    pub accepted_blocks: u32,
    pub rejected_blocks: u32,
}

/// The result of a finished run
#[derive(Debug)]
pub struct RunOutcome {
    pub stats: RunStats,
    pub averages: RunningAverages,
}

/// Runs a [`Benchmark`] repeatedly and aggregates its reports
pub struct IterationDriver<B> {
    benchmark: B,
    report_path: PathBuf,
    trace: bool,
    iteration: u32,
    stats: RunStats,
    averages: RunningAverages,
    csv: CsvWriters,
    summary: SummaryWriter,
}

impl<B: Benchmark> IterationDriver<B> {
    pub fn new(
        benchmark: B,
        report_path: impl Into<PathBuf>,
        trace: bool,
        csv: CsvWriters,
        summary: SummaryWriter,
    ) -> Self {
        IterationDriver {
            benchmark,
            report_path: report_path.into(),
            trace,
            iteration: 0,
            stats: RunStats::default(),
            averages: RunningAverages::new(),
            csv,
            summary,
        }
    }

    /// Run `iterations` iterations, then close the CSV files and write the summary
    pub fn run(mut self, iterations: u32) -> eyre::Result<RunOutcome> {
        for i in 1..=iterations {
            trc::info_span!("iteration", i).in_scope(|| self.iterate())?;
        }

        self.csv.close()?;

        print!("{}", render_summary(&self.averages));
        trc::info!(
            path = %self.summary.path().display(),
            "Writing summary"
        );
        self.summary.write(&self.averages)?;

        trc::info!(
            iterations = self.stats.iterations,
            failed = self.stats.failed_runs,
            missing_reports = self.stats.missing_reports,
            accepted = self.stats.accepted_blocks,
            rejected = self.stats.rejected_blocks,
            "Benchmarking completed"
        );

        Ok(RunOutcome {
            stats: self.stats,
            averages: self.averages,
        })
    }

    /// Run a single iteration
    ///
    /// Benchmark and report failures only skip the iteration, errors writing our
    /// own output are returned.
    fn iterate(&mut self) -> eyre::Result<()> {
        self.iteration += 1;
        self.stats.iterations += 1;
        trc::info!("Running iteration {}", self.iteration);

        if let Err(report) = self.benchmark.run(self.trace, &self.report_path) {
            trc::error!("Benchmark failed on iteration {}: {:?}", self.iteration, report);
            self.stats.failed_runs += 1;
            return Ok(());
        }

        // Merged stderr can carry bytes that are not UTF-8
        let bytes = match std::fs::read(&self.report_path) {
            Ok(bytes) => bytes,
            Err(e) => {
                trc::error!(
                    "Could not read report {}: {}",
                    self.report_path.display(),
                    e
                );
                self.stats.missing_reports += 1;
                return Ok(());
            }
        };

        let text = String::from_utf8_lossy(&bytes);

        for outcome in report::scan(&text) {
            match outcome {
                Ok(metrics) => {
                    trc::debug!(phase = %metrics.phase, "Accepted metrics block");
                    self.averages.update(&metrics, self.iteration);
                    self.csv.write(&metrics)?;
                    self.stats.accepted_blocks += 1;
                }
                Err(e) => {
                    trc::warn!("Skipping block: {}", e);
                    self.stats.rejected_blocks += 1;
                }
            }
        }

        self.csv
            .flush()
            .wrap_err_with(|| format!("Could not save iteration {} results", self.iteration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Phase;

    const REPORT: &str = "\
Creating the Wasm environment took: 2.1ms
============= Load Model Metrics =============
Wall Clock Time: 10ms
User time: 8ms
System time: 1ms
Max RSS: 1000 bytes
CPU Usage: 90%
=======================================
";

    fn driver<B: Benchmark>(dir: &Path, benchmark: B) -> IterationDriver<B> {
        IterationDriver::new(
            benchmark,
            dir.join("benchmark_output.txt"),
            false,
            CsvWriters::create(dir).unwrap(),
            SummaryWriter::create(dir.join("stats_summary.txt")).unwrap(),
        )
    }

    #[test]
    fn missing_report_skips_the_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = driver(dir.path(), |_trace: bool, _path: &Path| -> eyre::Result<()> { Ok(()) })
            .run(2)
            .unwrap();

        assert_eq!(outcome.stats.iterations, 2);
        assert_eq!(outcome.stats.missing_reports, 2);
        assert_eq!(outcome.stats.accepted_blocks, 0);
    }

    #[test]
    fn trace_flag_reaches_the_benchmark() {
        let dir = tempfile::tempdir().unwrap();
        let mut seen = Vec::new();
        let mut driver = driver(dir.path(), |trace: bool, path: &Path| -> eyre::Result<()> {
            seen.push(trace);
            std::fs::write(path, REPORT)?;
            Ok(())
        });
        driver.trace = true;
        driver.run(1).unwrap();

        assert_eq!(seen, vec![true]);
    }

    #[test]
    fn invalid_utf8_in_report_keeps_valid_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = driver(dir.path(), |_trace: bool, path: &Path| -> eyre::Result<()> {
            let mut bytes = b"image \xff\xfe name: cat\n".to_vec();
            bytes.extend_from_slice(REPORT.as_bytes());
            std::fs::write(path, bytes)?;
            Ok(())
        })
        .run(1)
        .unwrap();

        assert_eq!(outcome.stats.missing_reports, 0);
        assert_eq!(outcome.stats.accepted_blocks, 1);
        assert_eq!(outcome.averages.get(Phase::LoadModel).max_rss_bytes, 1000);
    }

    #[test]
    fn stale_report_is_reread_every_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let mut calls = 0;
        let outcome = driver(dir.path(), |_trace: bool, path: &Path| -> eyre::Result<()> {
            calls += 1;
            if calls == 1 {
                std::fs::write(path, REPORT)?;
            }
            Ok(())
        })
        .run(3)
        .unwrap();

        // The report is not removed between iterations
        assert_eq!(outcome.stats.accepted_blocks, 3);
        assert_eq!(outcome.averages.get(Phase::LoadModel).wall_clock_ms, 10.);
    }
}
