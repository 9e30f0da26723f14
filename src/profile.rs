//! Process-wide CPU profile capture
//!
//! A [`ProfileSession`] samples the whole process from startup until it is
//! stopped, then writes a pprof protobuf file that standard tooling
//! (`go tool pprof`, `pprof`, `llvm-profgen` pipelines) can read.
//!
//! Lifecycle: `Idle -> Capturing -> Stopped`. Stopping is idempotent; only the
//! first call finalizes the capture file. Capture failures are logged and
//! leave the session `Idle`; they never block the workload.
//!
//! [`ShutdownListener`] turns SIGINT/SIGTERM into a stop followed by a
//! host-supplied action (the binary exits with status 0).

use nix::sys::signal::{SigSet, Signal};
use pprof::protos::Message;
use pprof::{ProfilerGuard, ProfilerGuardBuilder};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Default capture destination
pub const DEFAULT_PROFILE_PATH: &str = "/tmp/cpu.pprof";

/// Frames from these libraries are dropped from samples
const BLOCKLIST: &[&str] = &["libc", "libgcc", "pthread", "vdso"];

/// Set while a session owns the process-wide capture slot
static SESSION_CLAIMED: AtomicBool = AtomicBool::new(false);

/// Errors from the profiling lifecycle
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Failed to start CPU capture at {path}: {reason}")]
    CaptureInit { path: String, reason: String },

    #[error("A profile session is already active in this process")]
    AlreadyActive,

    #[error("Failed to build CPU profile report for {path}: {source}")]
    Report {
        path: String,
        #[source]
        source: pprof::Error,
    },

    #[error("Failed to write CPU profile to {path}: {source}")]
    Flush {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Profiling configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Start a capture at process startup
    pub enabled: bool,
    /// Capture destination
    pub path: PathBuf,
    /// Sampling frequency in Hz
    pub frequency: u32,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from(DEFAULT_PROFILE_PATH),
            frequency: 1000,
        }
    }
}

impl ProfileConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=10_000).contains(&self.frequency) {
            return Err(format!(
                "frequency must be in [1, 10000] Hz, got {}",
                self.frequency
            ));
        }
        if self.path.as_os_str().is_empty() {
            return Err("path must not be empty".to_string());
        }
        Ok(())
    }
}

/// Observable lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Capturing,
    Stopped,
}

enum Slot {
    Idle,
    Capturing(Capture),
    Stopped,
}

impl Slot {
    fn state(&self) -> SessionState {
        match self {
            Slot::Idle => SessionState::Idle,
            Slot::Capturing(_) => SessionState::Capturing,
            Slot::Stopped => SessionState::Stopped,
        }
    }
}

/// An open capture: the running sampler and its destination file
struct Capture {
    guard: ProfilerGuard<'static>,
    file: File,
}

impl Capture {
    fn open(path: &Path, frequency: u32) -> Result<Self, ProfileError> {
        let init_err = |reason: String| ProfileError::CaptureInit {
            path: path.display().to_string(),
            reason,
        };

        // Sampler first: a sampler that cannot start must not leave an empty file.
        let guard = ProfilerGuardBuilder::default()
            .frequency(frequency as i32)
            .blocklist(BLOCKLIST)
            .build()
            .map_err(|e| init_err(e.to_string()))?;
        let file = File::create(path).map_err(|e| init_err(e.to_string()))?;

        Ok(Self { guard, file })
    }

    /// Encode collected samples, stop the sampler and flush the file
    fn finish(self, path: &Path) -> Result<usize, ProfileError> {
        let report_err = |source: pprof::Error| ProfileError::Report {
            path: path.display().to_string(),
            source,
        };
        let flush_err = |source: io::Error| ProfileError::Flush {
            path: path.display().to_string(),
            source,
        };

        let report = self.guard.report().build().map_err(report_err)?;
        let profile = report.pprof().map_err(report_err)?;
        let bytes = profile.encode_to_vec();

        // Sampling stops when the guard goes away.
        drop(self.guard);

        let mut writer = BufWriter::new(self.file);
        writer.write_all(&bytes).map_err(flush_err)?;
        let file = writer.into_inner().map_err(|e| flush_err(e.into_error()))?;
        file.sync_all().map_err(flush_err)?;

        Ok(bytes.len())
    }
}

/// The process-wide CPU capture session
pub struct ProfileSession {
    path: PathBuf,
    slot: Mutex<Slot>,
    finalize_count: AtomicUsize,
}

impl ProfileSession {
    /// Claim the process-wide slot without starting a capture
    pub fn claim(path: impl Into<PathBuf>) -> Result<Self, ProfileError> {
        if SESSION_CLAIMED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ProfileError::AlreadyActive);
        }

        Ok(Self {
            path: path.into(),
            slot: Mutex::new(Slot::Idle),
            finalize_count: AtomicUsize::new(0),
        })
    }

    /// Claim the slot and begin capturing
    ///
    /// Only `AlreadyActive` is returned as an error. A capture that cannot be
    /// opened is logged and the session stays `Idle`.
    pub fn start(config: &ProfileConfig) -> Result<Self, ProfileError> {
        let session = Self::claim(config.path.clone())?;
        if let Err(e) = session.begin(config.frequency) {
            tracing::warn!("{}; continuing without CPU profile", e);
        }
        Ok(session)
    }

    /// Transition `Idle -> Capturing`
    pub fn begin(&self, frequency: u32) -> Result<(), ProfileError> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if !matches!(*slot, Slot::Idle) {
            return Ok(());
        }

        let capture = Capture::open(&self.path, frequency)?;
        *slot = Slot::Capturing(capture);
        tracing::info!(
            path = %self.path.display(),
            frequency,
            "CPU profile capture started"
        );
        Ok(())
    }

    /// Transition to `Stopped`, finalizing the capture if one is running
    ///
    /// Returns `Ok(true)` for the call that performed the transition and
    /// `Ok(false)` for every later call. A later call made while the first is
    /// still writing blocks until the capture file is complete.
    pub fn stop(&self) -> Result<bool, ProfileError> {
        // Held until the capture is finalized.
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);

        let result = match std::mem::replace(&mut *slot, Slot::Stopped) {
            Slot::Stopped => return Ok(false),
            Slot::Idle => Ok(true),
            Slot::Capturing(capture) => {
                self.finalize_count.fetch_add(1, Ordering::SeqCst);
                capture.finish(&self.path).map(|bytes| {
                    tracing::info!(
                        path = %self.path.display(),
                        bytes,
                        "CPU profile written"
                    );
                    true
                })
            }
        };

        SESSION_CLAIMED.store(false, Ordering::Release);
        result
    }

    pub fn state(&self) -> SessionState {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// How many times a capture was finalized (0 or 1)
    pub fn finalize_count(&self) -> usize {
        self.finalize_count.load(Ordering::SeqCst)
    }
}

impl Drop for ProfileSession {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("{}", e);
        }
    }
}

impl std::fmt::Debug for ProfileSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileSession")
            .field("path", &self.path)
            .field("state", &self.state())
            .field("finalize_count", &self.finalize_count())
            .finish()
    }
}

/// Background waiter for SIGINT/SIGTERM
///
/// [`ShutdownListener::install`] blocks both signals on the calling thread.
/// Call it on the main thread before any other thread is spawned so every
/// thread inherits the mask and only the listener receives them.
#[derive(Debug)]
pub struct ShutdownListener {
    signals: SigSet,
}

impl ShutdownListener {
    pub fn install() -> nix::Result<Self> {
        let mut signals = SigSet::empty();
        signals.add(Signal::SIGINT);
        signals.add(Signal::SIGTERM);
        signals.thread_block()?;
        Ok(Self { signals })
    }

    /// Spawn the listener thread
    ///
    /// Every received signal stops `session` (a no-op after the first) and
    /// then runs `on_signal`.
    pub fn spawn<F>(
        self,
        session: Option<Arc<ProfileSession>>,
        on_signal: F,
    ) -> std::io::Result<JoinHandle<()>>
    where
        F: Fn(Signal) + Send + 'static,
    {
        thread::Builder::new()
            .name("profile-shutdown".to_string())
            .spawn(move || loop {
                let signal = match self.signals.wait() {
                    Ok(signal) => signal,
                    Err(e) => {
                        tracing::warn!("Signal wait failed, listener exiting: {}", e);
                        return;
                    }
                };

                tracing::info!(signal = %signal, "termination signal received");
                if let Some(session) = &session {
                    match session.stop() {
                        Ok(true) => {}
                        Ok(false) => tracing::debug!("profile session already stopped"),
                        Err(e) => tracing::warn!("{}", e),
                    }
                }
                on_signal(signal);
            })
    }
}
