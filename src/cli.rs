//! CLI argument parsing for pgoload

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::config::Config;
use crate::engine::Dispatch;
use crate::params::DecodePolicy;

/// Dispatch style as a CLI value
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DispatchArg {
    /// Monomorphized calls into the strategy
    Static,
    /// Calls through a trait object
    Dynamic,
}

impl From<DispatchArg> for Dispatch {
    fn from(arg: DispatchArg) -> Self {
        match arg {
            DispatchArg::Static => Dispatch::Static,
            DispatchArg::Dynamic => Dispatch::Dynamic,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "pgoload")]
#[command(version)]
#[command(about = "Synthetic hot/cold branch workload for PGO profile capture", long_about = None)]
pub struct Cli {
    /// JSON request for a single invocation (empty or omitted = defaults)
    #[arg(short, long, value_name = "JSON", conflicts_with_all = ["serve", "burst"])]
    pub input: Option<String>,

    /// Read newline-delimited JSON requests from stdin until EOF
    #[arg(long, conflicts_with = "burst")]
    pub serve: bool,

    /// Run one default workload burst, flush the profile and exit
    #[arg(long)]
    pub burst: bool,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// CPU profile destination
    #[arg(long = "profile-path", value_name = "FILE")]
    pub profile_path: Option<PathBuf>,

    /// Disable CPU profile capture
    #[arg(long = "no-profile")]
    pub no_profile: bool,

    /// CPU sampling frequency in Hz
    #[arg(long = "profile-frequency", value_name = "HZ")]
    pub profile_frequency: Option<u32>,

    /// Take the cold path every N-th iteration
    #[arg(long = "rare-period", value_name = "N")]
    pub rare_period: Option<u64>,

    /// Cold-path stall in microseconds (0 disables the stall)
    #[arg(long = "cold-latency-us", value_name = "US")]
    pub cold_latency_us: Option<u64>,

    /// Replace malformed requests with defaults instead of failing
    #[arg(long)]
    pub lenient: bool,

    /// How the engine calls into item strategies
    #[arg(long, value_enum, value_name = "STYLE")]
    pub dispatch: Option<DispatchArg>,

    /// Enable debug tracing output to stderr
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Apply flag overrides on top of a file (or default) configuration
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(path) = &self.profile_path {
            config.profile.path = path.clone();
        }
        if self.no_profile {
            config.profile.enabled = false;
        }
        if let Some(frequency) = self.profile_frequency {
            config.profile.frequency = frequency;
        }
        if let Some(period) = self.rare_period {
            config.engine.rare_period = period;
        }
        if let Some(latency) = self.cold_latency_us {
            config.engine.cold_latency_us = latency;
        }
        if self.lenient {
            config.input.policy = DecodePolicy::Lenient;
        }
        if let Some(dispatch) = self.dispatch {
            config.engine.dispatch = dispatch.into();
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["pgoload"]);
        assert!(cli.input.is_none());
        assert!(!cli.serve);
        assert!(!cli.burst);
        assert!(!cli.no_profile);
        assert!(!cli.debug);
        assert_eq!(cli.apply(Config::default()), Config::default());
    }

    #[test]
    fn test_cli_input_flag() {
        let cli = Cli::parse_from(["pgoload", "--input", r#"{"iterations": 5}"#]);
        assert_eq!(cli.input.as_deref(), Some(r#"{"iterations": 5}"#));
    }

    #[test]
    fn test_cli_input_conflicts_with_serve() {
        let result = Cli::try_parse_from(["pgoload", "--input", "{}", "--serve"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_serve_conflicts_with_burst() {
        assert!(Cli::try_parse_from(["pgoload", "--serve", "--burst"]).is_err());
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from([
            "pgoload",
            "--profile-path",
            "/tmp/other.pprof",
            "--no-profile",
            "--profile-frequency",
            "250",
            "--rare-period",
            "50",
            "--cold-latency-us",
            "0",
            "--lenient",
            "--dispatch",
            "dynamic",
        ]);
        let config = cli.apply(Config::default());

        assert_eq!(config.profile.path, PathBuf::from("/tmp/other.pprof"));
        assert!(!config.profile.enabled);
        assert_eq!(config.profile.frequency, 250);
        assert_eq!(config.engine.rare_period, 50);
        assert_eq!(config.engine.cold_latency_us, 0);
        assert_eq!(config.input.policy, DecodePolicy::Lenient);
        assert_eq!(config.engine.dispatch, Dispatch::Dynamic);
    }

    #[test]
    fn test_cli_rejects_unknown_dispatch() {
        assert!(Cli::try_parse_from(["pgoload", "--dispatch", "jit"]).is_err());
    }
}
