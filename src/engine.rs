//! Hot/cold branch-mix workload engine
//!
//! Each iteration takes a cheap predictable branch, then either a rare cold
//! path (every `rare_period`-th iteration) or a multi-way numeric dispatch on
//! `i % complexity`. The loop is strictly sequential so profiles taken over it
//! show a stable instruction trace.
//!
//! Features:
//! - Exact rare-branch frequency (`floor(iterations / rare_period)` hits)
//! - Cold path kept behind a `#[cold]`, never-inlined call boundary
//! - Static or dynamic dispatch into item strategies
//! - Non-finite results clamped to `0.0`

use serde::{Deserialize, Serialize};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{self, WorkloadError};
use crate::params::{Mode, WorkParams};
use crate::strategy::{ProcessingStrategy, Strategy, SAMPLE_INPUTS};

/// Value substituted for a non-finite aggregate or percentile
pub const NON_FINITE_SENTINEL: f64 = 0.0;

/// How the engine calls into item strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dispatch {
    /// Monomorphized call through the tagged strategy enum
    #[default]
    Static,
    /// Virtual call through `&mut dyn ProcessingStrategy`
    Dynamic,
}

/// Tunables of the branch mix
///
/// # Example
/// ```
/// use pgoload::engine::EngineConfig;
///
/// let config = EngineConfig::default();
/// assert_eq!(config.rare_period, 97);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rare branch fires when `i % rare_period == 0`
    ///
    /// Default: 97 (about 1.03% of iterations)
    pub rare_period: u64,

    /// Blocking stall injected by the cold path, in microseconds
    ///
    /// Zero removes the stall, which makes repeated runs bit-identical
    /// and timing-stable. Default: 1
    pub cold_latency_us: u64,

    /// Rank reported as `p95_estimate` for item-based modes, in percent
    pub percentile: f64,

    /// Call style into item strategies
    pub dispatch: Dispatch,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rare_period: 97,
            cold_latency_us: 1,
            percentile: 95.0,
            dispatch: Dispatch::Static,
        }
    }
}

impl EngineConfig {
    /// Configuration with the cold-path stall disabled
    pub fn deterministic() -> Self {
        Self {
            cold_latency_us: 0,
            ..Self::default()
        }
    }

    pub fn cold_latency(&self) -> Duration {
        Duration::from_micros(self.cold_latency_us)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.rare_period < 2 {
            return Err(format!(
                "rare_period must be >= 2 so the hot path dominates, got {}",
                self.rare_period
            ));
        }

        if !(0.0..=100.0).contains(&self.percentile) {
            return Err(format!(
                "percentile must be in [0, 100], got {}",
                self.percentile
            ));
        }

        Ok(())
    }
}

/// Result of one engine run
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadSummary {
    /// Sum of every iteration's contribution, clamped if non-finite
    pub aggregate_score: f64,
    /// Percentile of per-iteration scores (item-based modes only)
    pub p95_estimate: Option<f64>,
    /// Wall-clock time of the loop
    pub elapsed: Duration,
    pub iterations: u64,
    pub label: String,
    pub mode: Mode,
    /// Number of iterations that took the cold path
    pub rare_hits: u64,
}

struct LoopOutcome {
    aggregate: f64,
    rare_hits: u64,
    scores: Option<Vec<f64>>,
}

/// Drives the hot/cold loop for one invocation
#[derive(Debug, Clone, Default)]
pub struct WorkloadEngine {
    config: EngineConfig,
}

impl WorkloadEngine {
    /// Build an engine; out-of-range tunables are rejected
    pub fn new(config: EngineConfig) -> error::Result<Self> {
        config.validate().map_err(WorkloadError::InvalidConfig)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `params.iterations` iterations with `strategy` driving the hot branch
    pub fn run(
        &self,
        params: &WorkParams,
        strategy: &mut Strategy,
    ) -> error::Result<WorkloadSummary> {
        params.validate()?;

        tracing::debug!(
            iterations = params.iterations,
            complexity = params.complexity,
            strategy = strategy.name(),
            dispatch = ?self.config.dispatch,
            "workload start"
        );

        let start = Instant::now();
        let outcome = match strategy {
            Strategy::Numeric => self.run_numeric(params),
            Strategy::Items(items) => match self.config.dispatch {
                Dispatch::Static => self.run_items(params, items),
                Dispatch::Dynamic => self.run_items::<dyn ProcessingStrategy>(params, items),
            },
        };
        let elapsed = start.elapsed();

        let aggregate_score = clamp_finite(outcome.aggregate, "aggregate");
        let p95_estimate = outcome.scores.map(|mut scores| {
            scores.sort_by(f64::total_cmp);
            clamp_finite(percentile(&scores, self.config.percentile), "percentile")
        });

        tracing::debug!(
            elapsed_us = elapsed.as_micros() as u64,
            rare_hits = outcome.rare_hits,
            "workload finished"
        );

        Ok(WorkloadSummary {
            aggregate_score,
            p95_estimate,
            elapsed,
            iterations: params.iterations,
            label: params.label.clone(),
            mode: params.mode,
            rare_hits: outcome.rare_hits,
        })
    }

    fn run_numeric(&self, params: &WorkParams) -> LoopOutcome {
        let period = self.config.rare_period;
        let latency = self.config.cold_latency();
        let mut res = 0.0_f64;
        let mut rare_hits = 0_u64;

        for i in 1..=params.iterations {
            let x = i as f64 * 0.01;
            if i & 1 == 0 {
                res += x.sin();
            } else {
                res += x.cos();
            }

            if is_rare(i, period) {
                rare_hits += 1;
                res += expensive_cold_path(i, latency);
                continue;
            }

            res += secondary_dispatch(i, params.complexity);
        }

        LoopOutcome {
            aggregate: res,
            rare_hits,
            scores: None,
        }
    }

    fn run_items<P>(&self, params: &WorkParams, processor: &mut P) -> LoopOutcome
    where
        P: ProcessingStrategy + ?Sized,
    {
        let period = self.config.rare_period;
        let latency = self.config.cold_latency();
        let sample_count = SAMPLE_INPUTS.len() as u64;
        let mut res = 0.0_f64;
        let mut rare_hits = 0_u64;
        let mut scores = Vec::with_capacity(params.iterations.min(1 << 20) as usize);

        for i in 1..=params.iterations {
            let sample = SAMPLE_INPUTS[(i % sample_count) as usize];
            let mut score = processor.process(sample) as f64;

            if is_rare(i, period) {
                rare_hits += 1;
                score += expensive_cold_path(i, latency);
            } else {
                score += secondary_dispatch(i, params.complexity);
            }

            res += score;
            scores.push(score);
        }

        LoopOutcome {
            aggregate: res,
            rare_hits,
            scores: Some(scores),
        }
    }
}

/// Rare-branch predicate
#[inline]
pub fn is_rare(i: u64, period: u64) -> bool {
    i % period == 0
}

/// Multi-way numeric dispatch taken on non-rare iterations
#[inline]
pub fn secondary_dispatch(i: u64, complexity: u64) -> f64 {
    let x = i as f64;
    match i % complexity {
        0 => x.sqrt(),
        1 => x.ln(),
        2 => (x * 0.01).min(10.0).exp(),
        _ => x * 0.01,
    }
}

/// Higher-latency path taken on rare iterations
///
/// Stalls the current thread for `latency` to mimic a slow library or I/O
/// call, then returns `i^1.3`.
#[cold]
#[inline(never)]
pub fn expensive_cold_path(i: u64, latency: Duration) -> f64 {
    if !latency.is_zero() {
        thread::sleep(latency);
    }
    (i as f64).powf(1.3)
}

/// Linear-interpolated percentile of sorted data
pub fn percentile(sorted_data: &[f64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }
    if sorted_data.len() == 1 {
        return sorted_data[0];
    }

    let index = (percentile / 100.0) * (sorted_data.len() - 1) as f64;
    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;

    if lower == upper {
        sorted_data[lower]
    } else {
        let weight = index - lower as f64;
        sorted_data[lower] * (1.0 - weight) + sorted_data[upper] * weight
    }
}

fn clamp_finite(value: f64, what: &str) -> f64 {
    if value.is_finite() {
        value
    } else {
        tracing::debug!("non-finite {} {} clamped to sentinel", what, value);
        NON_FINITE_SENTINEL
    }
}
