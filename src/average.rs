use serde::Serialize;

use crate::metrics::{Metrics, PerPhase, Phase};

/// The running average of one phase's metrics
#[derive(Serialize, Default, Clone, Debug, PartialEq)]
pub struct PhaseAverage {
    pub user_time_ms: f64,
    pub system_time_ms: f64,
    pub wall_clock_ms: f64,
    pub cpu_usage_pct: f64,
    pub max_rss_bytes: u64,
    /// How many observations were folded in
    pub observations: u32,
}

impl PhaseAverage {
    /// Fold an observation taken during `iteration` into the average
    ///
    /// The weight of the previous average is `iteration - 1`, no matter how many
    /// observations this phase actually had. A phase that is missing from some
    /// reports therefore averages as though it had a zero for every iteration it
    /// skipped before its last observation. Max RSS is averaged with truncating
    /// integer division.
    pub fn update(&mut self, metrics: &Metrics, iteration: u32) {
        debug_assert!(iteration > 0, "iterations are counted from 1");
        let weight = iteration.saturating_sub(1);

        self.user_time_ms = fold(self.user_time_ms, metrics.user_time_ms, weight);
        self.system_time_ms = fold(self.system_time_ms, metrics.system_time_ms, weight);
        self.wall_clock_ms = fold(self.wall_clock_ms, metrics.wall_clock_ms, weight);
        self.cpu_usage_pct = fold(self.cpu_usage_pct, metrics.cpu_usage_pct, weight);
        self.max_rss_bytes = fold_rss(self.max_rss_bytes, metrics.max_rss_bytes, weight);
        self.observations += 1;
    }
}

/// Integer average in `u128`, the result is never above the larger input
fn fold_rss(average: u64, value: u64, weight: u32) -> u64 {
    let weight = u128::from(weight);
    let folded = (weight * u128::from(average) + u128::from(value)) / (weight + 1);
    u64::try_from(folded).unwrap_or(u64::MAX)
}

fn fold(average: f64, value: f64, weight: u32) -> f64 {
    let weight = f64::from(weight);
    (weight * average + value) / (weight + 1.)
}

/// Running averages for every phase
#[derive(Serialize, Default, Clone, Debug, PartialEq)]
pub struct RunningAverages {
    phases: PerPhase<PhaseAverage>,
}

impl RunningAverages {
    pub fn new() -> Self {
        Default::default()
    }

    /// Fold an accepted block into its phase's average
    pub fn update(&mut self, metrics: &Metrics, iteration: u32) {
        self.phases[metrics.phase].update(metrics, iteration);
    }

    pub fn get(&self, phase: Phase) -> &PhaseAverage {
        &self.phases[phase]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Phase, &PhaseAverage)> {
        self.phases.iter()
    }
}
