//! Call lifecycle and local persistence settings.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Smallest ringing timeout honoured; anything lower falls back to the default.
pub const MIN_RINGING_TIMEOUT_MS: u32 = 10_000;

/// Ringing timeout used when none (or an out-of-policy value) is configured.
pub const DEFAULT_RINGING_TIMEOUT_MS: u32 = 45_000;

/// Call configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    /// How long an outbound ring waits for answers before unanswered
    /// peers are released.
    pub ringing_timeout_ms: u32,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            ringing_timeout_ms: DEFAULT_RINGING_TIMEOUT_MS,
        }
    }
}

impl CallConfig {
    /// Ringing timeout after applying the floor policy.
    pub fn effective_ringing_timeout(&self) -> Duration {
        let ms = if self.ringing_timeout_ms < MIN_RINGING_TIMEOUT_MS {
            DEFAULT_RINGING_TIMEOUT_MS
        } else {
            self.ringing_timeout_ms
        };
        Duration::from_millis(u64::from(ms))
    }
}

/// Opt-in persistence of the joined workspace identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct StorageConfig {
    pub enabled: bool,
    /// Explicit session file. Defaults to the platform data directory.
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the session file path, falling back to the data directory.
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.path.clone().or_else(|| {
            dirs::data_dir().map(|dir| dir.join("webrtc-workspaces").join("session.json"))
        })
    }
}
