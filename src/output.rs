//! Per-phase CSV files and the end of run summary

use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use eyre::WrapErr;
use serde::Serialize;
use tracing as trc;

use crate::average::{PhaseAverage, RunningAverages};
use crate::metrics::{format_ms, format_pct, Metrics, PerPhase};

/// The header row of every per-phase CSV file
pub static CSV_HEADER: [&str; 5] = [
    "user_time",
    "system_time",
    "cpu_percent",
    "wallclock_time",
    "max_rss",
];

/// One CSV file per phase, appended to for every accepted block
pub struct CsvWriters {
    writers: PerPhase<csv::Writer<File>>,
}

impl CsvWriters {
    /// Open every phase's CSV file inside `dir` and write its header row
    #[trc::instrument(level = "debug")]
    pub fn create(dir: &Path) -> eyre::Result<Self> {
        let writers = PerPhase::try_from_fn(|phase| -> eyre::Result<_> {
            let path = dir.join(phase.csv_file_name());
            let file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(&path)
                .wrap_err_with(|| format!("Could not open CSV file {}", path.display()))?;

            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(file);
            writer.write_record(&CSV_HEADER)?;

            Ok(writer)
        })?;

        Ok(CsvWriters { writers })
    }

    /// Append a row for an accepted block to its phase's file
    pub fn write(&mut self, metrics: &Metrics) -> eyre::Result<()> {
        self.writers[metrics.phase]
            .write_record(&metrics.csv_record())
            .wrap_err_with(|| format!("Could not write {} CSV row", metrics.phase))
    }

    pub fn flush(&mut self) -> eyre::Result<()> {
        for (phase, writer) in self.writers.iter_mut() {
            writer
                .flush()
                .wrap_err_with(|| format!("Could not flush {} CSV file", phase))?;
        }
        Ok(())
    }

    /// Flush and close every file
    pub fn close(mut self) -> eyre::Result<()> {
        self.flush()
    }
}

/// Render the averages as the text summary
pub fn render_summary(averages: &RunningAverages) -> String {
    let mut out = String::new();
    for (phase, average) in averages.iter() {
        out.push_str(&format!("===={} Metrics====\n", phase.display_name()));
        out.push_str(&format!(
            "Average Wall Clock Time: {} ms\n",
            format_ms(average.wall_clock_ms)
        ));
        out.push_str(&format!(
            "Average User Time: {} ms\n",
            format_ms(average.user_time_ms)
        ));
        out.push_str(&format!(
            "Average System Time: {} ms\n",
            format_ms(average.system_time_ms)
        ));
        out.push_str(&format!(
            "Average Cpu Usage: {} %\n",
            format_pct(average.cpu_usage_pct)
        ));
        out.push_str(&format!("Average Max RSS: {}\n", average.max_rss_bytes));
        out.push('\n');
    }
    out
}

#[derive(Serialize)]
struct JsonSummaryEntry<'a> {
    phase: &'static str,
    #[serde(flatten)]
    average: &'a PhaseAverage,
}

/// Writes the final summary, both as text and as a JSON sidecar
#[derive(Debug)]
pub struct SummaryWriter {
    text: File,
    path: PathBuf,
    json_path: PathBuf,
}

impl SummaryWriter {
    /// Create, or truncate, the summary file at `path`
    ///
    /// The JSON sidecar is written next to it with a `.json` extension.
    pub fn create(path: impl Into<PathBuf>) -> eyre::Result<Self> {
        let path = path.into();
        let text = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .wrap_err_with(|| format!("Could not open summary file {}", path.display()))?;

        Ok(SummaryWriter {
            text,
            json_path: path.with_extension("json"),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[trc::instrument(level = "debug", skip(averages))]
    pub fn write(mut self, averages: &RunningAverages) -> eyre::Result<()> {
        self.text
            .write_all(render_summary(averages).as_bytes())
            .wrap_err("Could not write summary file")?;

        let entries: Vec<_> = averages
            .iter()
            .map(|(phase, average)| JsonSummaryEntry {
                phase: phase.display_name(),
                average,
            })
            .collect();
        let json = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.json_path)
            .wrap_err("Could not open JSON summary file")?;
        serde_json::to_writer_pretty(json, &entries).wrap_err("Could not write JSON summary")?;

        Ok(())
    }
}
