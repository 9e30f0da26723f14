//! Invocation boundary: raw request bytes in, raw response bytes out

use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, Write};
use std::time::Instant;

use crate::engine::{EngineConfig, WorkloadEngine, WorkloadSummary};
use crate::error::{Result, WorkloadError};
use crate::params::{self, DecodePolicy, Mode};
use crate::strategy::Strategy;

/// Host-supplied invocation context
///
/// The deadline is carried for the host's benefit only; a run in progress is
/// never cut short, its iteration count bounds how long it takes.
#[derive(Debug, Clone, Copy, Default)]
pub struct InvocationContext {
    pub deadline: Option<Instant>,
}

/// Response body of one invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Aggregate score of the run
    pub result: f64,
    /// Percentile of per-iteration scores (item-based modes)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p95_estimate: Option<f64>,
    /// Human-readable elapsed time, e.g. `"12.5ms"`
    pub duration: String,
    pub iterations: u64,
    pub name: String,
    pub mode: Mode,
    pub rare_hits: u64,
}

impl From<WorkloadSummary> for Response {
    fn from(summary: WorkloadSummary) -> Self {
        Self {
            result: summary.aggregate_score,
            p95_estimate: summary.p95_estimate,
            duration: format!("{:?}", summary.elapsed),
            iterations: summary.iterations,
            name: summary.label,
            mode: summary.mode,
            rare_hits: summary.rare_hits,
        }
    }
}

/// Request handler wiring resolver, strategy and engine together
#[derive(Debug, Clone, Default)]
pub struct Handler {
    engine: WorkloadEngine,
    policy: DecodePolicy,
}

impl Handler {
    pub fn new(engine: EngineConfig, policy: DecodePolicy) -> Result<Self> {
        Ok(Self {
            engine: WorkloadEngine::new(engine)?,
            policy,
        })
    }

    /// Run one invocation and return the decoded response
    pub fn invoke(&self, ctx: &InvocationContext, input: &[u8]) -> Result<Response> {
        let params = params::resolve(input, self.policy)?;
        if ctx.deadline.is_some_and(|d| d <= Instant::now()) {
            tracing::debug!("deadline already passed; running anyway");
        }

        let mut strategy = Strategy::for_mode(params.mode);
        let summary = self.engine.run(&params, &mut strategy)?;
        tracing::info!(
            name = %summary.label,
            mode = %summary.mode,
            iterations = summary.iterations,
            elapsed_us = summary.elapsed.as_micros() as u64,
            "invocation complete"
        );
        Ok(Response::from(summary))
    }

    /// Run one invocation and encode the response as JSON
    ///
    /// # Example
    /// ```
    /// use pgoload::engine::EngineConfig;
    /// use pgoload::handler::{Handler, InvocationContext};
    /// use pgoload::params::DecodePolicy;
    ///
    /// let handler = Handler::new(EngineConfig::deterministic(), DecodePolicy::Strict).unwrap();
    /// let out = handler
    ///     .handle(&InvocationContext::default(), br#"{"iterations": 10, "name": "alice"}"#)
    ///     .unwrap();
    /// let body: serde_json::Value = serde_json::from_slice(&out).unwrap();
    /// assert_eq!(body["name"], "alice");
    /// ```
    pub fn handle(&self, ctx: &InvocationContext, input: &[u8]) -> Result<Vec<u8>> {
        let response = self.invoke(ctx, input)?;
        serde_json::to_vec(&response).map_err(WorkloadError::Encode)
    }

    /// Serve newline-delimited requests until `input` is exhausted
    ///
    /// Each non-blank line yields exactly one response line. Failed requests
    /// produce `{"error": "..."}` and do not stop the loop. Returns the number
    /// of requests handled.
    pub fn serve<R: BufRead, W: Write>(&self, input: R, mut output: W) -> io::Result<usize> {
        let ctx = InvocationContext::default();
        let mut handled = 0;

        for line in input.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            match self.handle(&ctx, line.as_bytes()) {
                Ok(bytes) => output.write_all(&bytes)?,
                Err(e) => {
                    tracing::warn!("Request failed: {}", e);
                    serde_json::to_writer(&mut output, &serde_json::json!({ "error": e.to_string() }))?;
                }
            }
            output.write_all(b"\n")?;
            output.flush()?;
            handled += 1;
        }

        Ok(handled)
    }
}
