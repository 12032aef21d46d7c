//! One-shot liveness check right after launch

use crate::runtime::process::ProcessHandle;
use std::time::Duration;

/// Grace period used when nothing else is configured
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Outcome of probing a freshly spawned child.
///
/// A child that finishes inside the grace period is `Exited` even when it
/// succeeded, so a fast utility and a crashing service look the same.
/// Inspect the code when that matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Still alive when the grace period ended
    Started,
    /// Exited inside the grace period
    Exited(i32),
}

impl Liveness {
    /// Status the launcher reports for this launch
    pub fn exit_status(&self) -> i32 {
        match self {
            Liveness::Started => 0,
            Liveness::Exited(code) => *code,
        }
    }

    pub fn is_started(&self) -> bool {
        matches!(self, Liveness::Started)
    }
}

impl std::fmt::Display for Liveness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Liveness::Started => write!(f, "started"),
            Liveness::Exited(code) => write!(f, "exited with code {}", code),
        }
    }
}

/// Classifies a launch as started or exited.
///
/// Resolves as soon as the child exits, or once the grace period elapses
/// with the child still running. Only checked once; nothing is monitored
/// afterwards.
#[derive(Debug, Clone, Copy)]
pub struct LivenessProbe {
    grace_period: Duration,
}

impl Default for LivenessProbe {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_PERIOD)
    }
}

impl LivenessProbe {
    pub fn new(grace_period: Duration) -> Self {
        Self { grace_period }
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    pub async fn probe(&self, handle: &mut ProcessHandle) -> Result<Liveness, ProbeError> {
        let liveness = match tokio::time::timeout(self.grace_period, handle.wait_exit()).await {
            Ok(Ok(code)) => Liveness::Exited(code),
            Ok(Err(e)) => {
                return Err(ProbeError {
                    pid: handle.pid(),
                    source: e,
                })
            }
            Err(_) => Liveness::Started,
        };

        log::debug!(
            "[{}] PID {} {} within {:?}",
            handle.program(),
            handle.pid(),
            liveness,
            self.grace_period
        );
        Ok(liveness)
    }
}

/// Waiting on the child failed
#[derive(Debug, thiserror::Error)]
#[error("Failed to check status of PID {pid}: {source}")]
pub struct ProbeError {
    pub pid: u32,
    #[source]
    pub source: std::io::Error,
}
