use std::ops::{Index, IndexMut};

use serde::Serialize;

/// A stage of the benchmarked workload whose metrics are tracked on their own
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    LoadModel,
    ReadImage,
    RedBox,
    PreProcessing,
    Inference,
    PostProcessing,
    GreenBox,
    Total,
}

impl Phase {
    pub const COUNT: usize = 8;

    /// Every phase, in report and summary order
    pub const ALL: [Phase; Phase::COUNT] = [
        Phase::LoadModel,
        Phase::ReadImage,
        Phase::RedBox,
        Phase::PreProcessing,
        Phase::Inference,
        Phase::PostProcessing,
        Phase::GreenBox,
        Phase::Total,
    ];

    /// The substring that marks the start of this phase's block in a report
    pub fn header(self) -> &'static str {
        match self {
            Phase::LoadModel => "Load Model Metrics",
            Phase::ReadImage => "Read Image Metrics",
            Phase::RedBox => "Red Box Phase Metrics",
            Phase::PreProcessing => "Pre-processing Metrics",
            Phase::Inference => "Inference Metrics",
            Phase::PostProcessing => "Post-processing Metrics",
            Phase::GreenBox => "Green Box Phase Metrics",
            Phase::Total => "Total Metrics",
        }
    }

    /// The name used in the summary report
    pub fn display_name(self) -> &'static str {
        match self {
            Phase::LoadModel => "Load Model",
            Phase::ReadImage => "Read Image (Red Box)",
            Phase::RedBox => "Red Box",
            Phase::PreProcessing => "Read Image (Green Box)",
            Phase::Inference => "Inference",
            Phase::PostProcessing => "Postprocessing",
            Phase::GreenBox => "Green Box",
            Phase::Total => "Total",
        }
    }

    pub fn csv_file_name(self) -> &'static str {
        match self {
            Phase::LoadModel => "loadmodel.csv",
            Phase::ReadImage => "readimg.csv",
            Phase::RedBox => "redbox.csv",
            Phase::PreProcessing => "readimg_greenbox.csv",
            Phase::Inference => "inference.csv",
            Phase::PostProcessing => "postprocessing.csv",
            Phase::GreenBox => "greenbox.csv",
            Phase::Total => "total.csv",
        }
    }

    /// Find the phase whose header appears in `line`, if any
    pub fn from_header_line(line: &str) -> Option<Phase> {
        Phase::ALL
            .iter()
            .copied()
            .find(|phase| line.contains(phase.header()))
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// One value of `T` for every [`Phase`]
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct PerPhase<T>([T; Phase::COUNT]);

impl<T> PerPhase<T> {
    /// Build the map by calling `f` once per phase, in phase order
    pub fn try_from_fn<E, F>(mut f: F) -> Result<Self, E>
    where
        F: FnMut(Phase) -> Result<T, E>,
    {
        let mut values = Vec::with_capacity(Phase::COUNT);
        for &phase in Phase::ALL.iter() {
            values.push(f(phase)?);
        }

        match <[T; Phase::COUNT]>::try_from(values) {
            Ok(array) => Ok(PerPhase(array)),
            Err(_) => unreachable!("one value is pushed per phase"),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Phase, &T)> {
        Phase::ALL.iter().copied().zip(self.0.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Phase, &mut T)> {
        Phase::ALL.iter().copied().zip(self.0.iter_mut())
    }
}

impl<T: Default> Default for PerPhase<T> {
    fn default() -> Self {
        PerPhase(Default::default())
    }
}

impl<T> Index<Phase> for PerPhase<T> {
    type Output = T;

    fn index(&self, phase: Phase) -> &T {
        &self.0[phase.index()]
    }
}

impl<T> IndexMut<Phase> for PerPhase<T> {
    fn index_mut(&mut self, phase: Phase) -> &mut T {
        &mut self.0[phase.index()]
    }
}

/// A single observation of one phase, taken from one report
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Metrics {
    pub phase: Phase,
    pub user_time_ms: f64,
    pub system_time_ms: f64,
    pub wall_clock_ms: f64,
    pub cpu_usage_pct: f64,
    pub max_rss_bytes: u64,
}

impl Metrics {
    /// The CSV fields for this observation, in column order
    pub fn csv_record(&self) -> [String; 5] {
        [
            format_ms(self.user_time_ms),
            format_ms(self.system_time_ms),
            format!("{}%", format_pct(self.cpu_usage_pct)),
            format_ms(self.wall_clock_ms),
            self.max_rss_bytes.to_string(),
        ]
    }
}

pub(crate) fn format_ms(value: f64) -> String {
    format!("{:.3}", value)
}

pub(crate) fn format_pct(value: f64) -> String {
    format!("{:.2}", value)
}
