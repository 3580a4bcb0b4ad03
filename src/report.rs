//! Scanning of benchmark reports into per-phase [`Metrics`]
//!
//! A report is free-form text in which each phase writes a block like:
//!
//! ```text
//! ============= Inference Metrics =============
//! Wall Clock Time: 12.5ms
//! User time: 1.2s
//! System time: 300µs
//! Max RSS: 4096 bytes
//! CPU Usage: 97.5%
//! =======================================
//! ```
//!
//! Lines outside of a block are ignored.

use thiserror::Error;

use crate::metrics::{Metrics, Phase};

/// The line that closes a metrics block
pub const BLOCK_TERMINATOR: &str = "=======================================";

const WALL_CLOCK_PREFIX: &str = "Wall Clock Time:";
const USER_TIME_PREFIX: &str = "User time:";
const SYSTEM_TIME_PREFIX: &str = "System time:";
const CPU_USAGE_PREFIX: &str = "CPU Usage:";
const MAX_RSS_PREFIX: &str = "Max RSS:";

/// A metrics block that could not be turned into [`Metrics`]
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{phase} block is incomplete, missing: {}", .missing.join(", "))]
pub struct BlockError {
    pub phase: Phase,
    pub missing: Vec<&'static str>,
}

/// Fields collected so far for the block currently being parsed
#[derive(Default, Debug, Clone, PartialEq)]
pub struct BlockFields {
    wall_clock_ms: Option<f64>,
    user_time_ms: Option<f64>,
    system_time_ms: Option<f64>,
    cpu_usage_pct: Option<f64>,
    max_rss_bytes: Option<u64>,
}

impl BlockFields {
    /// Feed one line of a block
    ///
    /// Returns `true` when the line was the block terminator.
    pub fn feed(&mut self, line: &str) -> bool {
        if let Some(rest) = after_prefix(line, WALL_CLOCK_PREFIX) {
            fill_once(&mut self.wall_clock_ms, || parse_time_ms(rest));
        } else if let Some(rest) = after_prefix(line, USER_TIME_PREFIX) {
            fill_once(&mut self.user_time_ms, || parse_time_ms(rest));
        } else if let Some(rest) = after_prefix(line, SYSTEM_TIME_PREFIX) {
            fill_once(&mut self.system_time_ms, || parse_time_ms(rest));
        } else if let Some(rest) = after_prefix(line, CPU_USAGE_PREFIX) {
            fill_once(&mut self.cpu_usage_pct, || parse_number(rest).map(|(x, _)| x));
        } else if let Some(rest) = after_prefix(line, MAX_RSS_PREFIX) {
            fill_once(&mut self.max_rss_bytes, || parse_integer(rest));
        } else if line.contains(BLOCK_TERMINATOR) {
            return true;
        }

        false
    }

    /// The number of fields recognized so far
    #[cfg(test)]
    pub(crate) fn found(&self) -> usize {
        [
            self.wall_clock_ms.is_some(),
            self.user_time_ms.is_some(),
            self.system_time_ms.is_some(),
            self.cpu_usage_pct.is_some(),
            self.max_rss_bytes.is_some(),
        ]
        .iter()
        .filter(|&&found| found)
        .count()
    }

    /// Turn the collected fields into metrics, if all five were found
    pub fn finish(self, phase: Phase) -> Result<Metrics, BlockError> {
        match self {
            BlockFields {
                wall_clock_ms: Some(wall_clock_ms),
                user_time_ms: Some(user_time_ms),
                system_time_ms: Some(system_time_ms),
                cpu_usage_pct: Some(cpu_usage_pct),
                max_rss_bytes: Some(max_rss_bytes),
            } => Ok(Metrics {
                phase,
                user_time_ms,
                system_time_ms,
                wall_clock_ms,
                cpu_usage_pct,
                max_rss_bytes,
            }),
            fields => {
                let missing = [
                    (fields.wall_clock_ms.is_none(), WALL_CLOCK_PREFIX),
                    (fields.user_time_ms.is_none(), USER_TIME_PREFIX),
                    (fields.system_time_ms.is_none(), SYSTEM_TIME_PREFIX),
                    (fields.cpu_usage_pct.is_none(), CPU_USAGE_PREFIX),
                    (fields.max_rss_bytes.is_none(), MAX_RSS_PREFIX),
                ]
                .iter()
                .filter(|&&(missing, _)| missing)
                .map(|&(_, prefix)| prefix.trim_end_matches(':'))
                .collect();

                Err(BlockError { phase, missing })
            }
        }
    }
}

/// Where the scanner is within the report
#[derive(Debug, Clone, PartialEq)]
pub enum ScanState {
    SeekingHeader,
    InBlock { phase: Phase, fields: BlockFields },
}

/// The result of scanning one block
pub type BlockOutcome = Result<Metrics, BlockError>;

/// Line-by-line scanner over a report
#[derive(Debug, Clone, PartialEq)]
pub struct ReportScanner {
    state: ScanState,
}

impl Default for ReportScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportScanner {
    pub fn new() -> Self {
        ReportScanner {
            state: ScanState::SeekingHeader,
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> &ScanState {
        &self.state
    }

    /// Feed the next line, returning a block outcome when the line closes a block
    pub fn feed(&mut self, line: &str) -> Option<BlockOutcome> {
        if let ScanState::InBlock { fields, .. } = &mut self.state {
            return if fields.feed(line) { self.close() } else { None };
        }

        if let Some(phase) = Phase::from_header_line(line) {
            self.state = ScanState::InBlock {
                phase,
                fields: BlockFields::default(),
            };
        }
        None
    }

    /// Signal the end of input, returning the outcome of an unterminated block
    pub fn finish(mut self) -> Option<BlockOutcome> {
        self.close()
    }

    fn close(&mut self) -> Option<BlockOutcome> {
        match std::mem::replace(&mut self.state, ScanState::SeekingHeader) {
            ScanState::SeekingHeader => None,
            ScanState::InBlock { phase, fields } => Some(fields.finish(phase)),
        }
    }
}

/// Scan a whole report, returning every block outcome in report order
pub fn scan(report: &str) -> Vec<BlockOutcome> {
    let mut scanner = ReportScanner::new();
    let mut outcomes: Vec<_> = report.lines().filter_map(|line| scanner.feed(line)).collect();
    outcomes.extend(scanner.finish());
    outcomes
}

fn after_prefix<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    line.find(prefix).map(|at| &line[at + prefix.len()..])
}

fn fill_once<T>(slot: &mut Option<T>, parse: impl FnOnce() -> Option<T>) {
    if slot.is_none() {
        *slot = parse();
    }
}

/// Parse a time value with an optional unit into milliseconds
pub fn parse_time_ms(text: &str) -> Option<f64> {
    let (magnitude, rest) = parse_number(text)?;
    let unit = rest.split_whitespace().next().unwrap_or("");

    Some(match unit {
        "s" | "sec" => magnitude * 1000.,
        "µs" | "us" | "microseconds" => magnitude / 1000.,
        _ => magnitude,
    })
}

/// Read the leading floating point number of `text`, returning it and the rest of the text
fn parse_number(text: &str) -> Option<(f64, &str)> {
    let text = text.trim_start();
    let candidate_len = text
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E')))
        .map(|(at, _)| at)
        .unwrap_or_else(|| text.len());

    // Sign and exponent characters may belong to the unit, so back off until it parses
    (1..=candidate_len)
        .rev()
        .find_map(|len| text[..len].parse::<f64>().ok().map(|x| (x, &text[len..])))
}

fn parse_integer(text: &str) -> Option<u64> {
    let text = text.trim_start();
    let digits = text
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(at, _)| at)
        .unwrap_or_else(|| text.len());

    text[..digits].parse().ok()
}
