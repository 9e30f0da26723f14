//! Parameter resolution for workload invocations
//!
//! Turns an optional raw JSON payload into a validated [`WorkParams`].
//! Missing fields fall back to defaults one at a time, so `{"name": "x"}`
//! keeps the default iteration count and complexity.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, WorkloadError};

/// Default number of loop iterations
pub const DEFAULT_ITERATIONS: u64 = 100_000;
/// Largest accepted iteration count; item modes keep one score per iteration
pub const MAX_ITERATIONS: u64 = 10_000_000;
/// Default secondary-dispatch width
pub const DEFAULT_COMPLEXITY: u64 = 4;
/// Smallest complexity that still yields a multi-way dispatch
pub const MIN_COMPLEXITY: u64 = 3;
/// Default invocation label
pub const DEFAULT_LABEL: &str = "world";

/// Which processing strategy drives the hot branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Parity-selected trigonometry derived from the iteration index
    #[default]
    Numeric,
    /// Cached JSON key counting over the sample set
    Parse,
    /// Regex matching over the sample set
    Match,
}

impl Mode {
    /// All modes, in integer-index order
    pub const ALL: [Mode; 3] = [Mode::Numeric, Mode::Parse, Mode::Match];

    /// Look up a mode by case-insensitive name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "numeric" => Some(Mode::Numeric),
            "parse" => Some(Mode::Parse),
            "match" => Some(Mode::Match),
            _ => None,
        }
    }

    /// Look up a mode by integer index
    pub fn from_index(index: i64) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    /// Whether this mode processes sample items through a strategy
    pub fn is_item_based(self) -> bool {
        !matches!(self, Mode::Numeric)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Numeric => write!(f, "numeric"),
            Mode::Parse => write!(f, "parse"),
            Mode::Match => write!(f, "match"),
        }
    }
}

/// How malformed payload bytes are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodePolicy {
    /// Malformed bytes fail the invocation with `Decode`
    #[default]
    Strict,
    /// Malformed bytes are logged and replaced by the defaults
    Lenient,
}

/// Fully resolved parameters for one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkParams {
    /// Number of loop iterations, in `1..=MAX_ITERATIONS`
    pub iterations: u64,
    /// Width of the secondary dispatch (>= 3)
    pub complexity: u64,
    /// Hot-branch strategy
    pub mode: Mode,
    /// Caller-supplied label echoed in the response
    pub label: String,
}

impl Default for WorkParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            complexity: DEFAULT_COMPLEXITY,
            mode: Mode::default(),
            label: DEFAULT_LABEL.to_string(),
        }
    }
}

impl WorkParams {
    /// Check the ranges the engine relies on
    ///
    /// [`resolve`] only returns parameters that pass; hand-built values are
    /// checked again before a run.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_ITERATIONS).contains(&self.iterations) {
            return Err(iterations_error(self.iterations));
        }
        if self.complexity < MIN_COMPLEXITY {
            return Err(complexity_error(self.complexity));
        }
        Ok(())
    }
}

fn iterations_error(n: impl fmt::Display) -> WorkloadError {
    WorkloadError::invalid(
        "iterations",
        format!("must be in [1, {}], got {}", MAX_ITERATIONS, n),
    )
}

fn complexity_error(c: impl fmt::Display) -> WorkloadError {
    WorkloadError::invalid(
        "complexity",
        format!("must be >= {}, got {}", MIN_COMPLEXITY, c),
    )
}

/// `mode` may arrive as a name or as an integer index
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ModeField {
    Index(i64),
    Name(String),
}

/// Wire shape of a request; every field is optional
#[derive(Debug, Default, Deserialize)]
struct RawRequest {
    iterations: Option<i64>,
    complexity: Option<i64>,
    mode: Option<ModeField>,
    #[serde(alias = "label")]
    name: Option<String>,
}

/// Resolve raw payload bytes into validated parameters
///
/// # Example
/// ```
/// use pgoload::params::{resolve, DecodePolicy, Mode};
///
/// let params = resolve(br#"{"iterations": 10, "mode": "parse"}"#, DecodePolicy::Strict).unwrap();
/// assert_eq!(params.iterations, 10);
/// assert_eq!(params.complexity, 4);
/// assert_eq!(params.mode, Mode::Parse);
/// ```
pub fn resolve(input: &[u8], policy: DecodePolicy) -> Result<WorkParams> {
    if input.iter().all(u8::is_ascii_whitespace) {
        return Ok(WorkParams::default());
    }

    let raw: RawRequest = match serde_json::from_slice(input) {
        Ok(raw) => raw,
        Err(e) => match policy {
            DecodePolicy::Strict => return Err(WorkloadError::Decode(e)),
            DecodePolicy::Lenient => {
                tracing::warn!("Malformed request, falling back to defaults: {}", e);
                return Ok(WorkParams::default());
            }
        },
    };

    raw.into_params()
}

impl RawRequest {
    fn into_params(self) -> Result<WorkParams> {
        let defaults = WorkParams::default();

        let iterations = match self.iterations {
            None => defaults.iterations,
            Some(n) if (1..=MAX_ITERATIONS as i64).contains(&n) => n as u64,
            Some(n) => return Err(iterations_error(n)),
        };

        let complexity = match self.complexity {
            None => defaults.complexity,
            Some(c) if c >= MIN_COMPLEXITY as i64 => c as u64,
            Some(c) => return Err(complexity_error(c)),
        };

        let mode = match self.mode {
            None => defaults.mode,
            Some(ModeField::Name(name)) => Mode::from_name(&name).ok_or_else(|| {
                WorkloadError::invalid(
                    "mode",
                    format!("must be one of numeric, parse, match; got {:?}", name),
                )
            })?,
            Some(ModeField::Index(index)) => Mode::from_index(index).ok_or_else(|| {
                WorkloadError::invalid("mode", format!("index must be 0..=2, got {}", index))
            })?,
        };

        Ok(WorkParams {
            iterations,
            complexity,
            mode,
            label: self.name.unwrap_or(defaults.label),
        })
    }
}
