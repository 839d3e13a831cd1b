use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Engine configuration, loaded from `cairn.toml`.
///
/// Every section and field has a default so a missing or partial file is
/// never fatal to a worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub claim: ClaimConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimConfig {
    /// How many different items to try claiming before giving up on a
    /// session. Race losses retry immediately with the next candidate.
    #[serde(default = "default_claim_attempts")]
    pub max_attempts: u32,
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_claim_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// How many quota pauses to tolerate before surfacing the exhaustion.
    #[serde(default = "default_quota_pauses")]
    pub max_pauses: u32,
    /// Ceiling on a single wait, regardless of the backend's reset hint.
    #[serde(default = "default_quota_max_wait_secs")]
    pub max_wait_secs: u64,
}

impl QuotaConfig {
    /// Clamp a backend reset hint to the configured ceiling.
    #[must_use]
    pub fn clamp_wait(&self, hint: Duration) -> Duration {
        hint.min(Duration::from_secs(self.max_wait_secs))
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            max_pauses: default_quota_pauses(),
            max_wait_secs: default_quota_max_wait_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Write a final checkpoint when the session ends normally.
    #[serde(default = "default_true")]
    pub checkpoint_on_finish: bool,
    /// Act with coordinator authority (tracker owners only).
    #[serde(default)]
    pub coordinator: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            checkpoint_on_finish: default_true(),
            coordinator: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// I/O or parse failure, with the offending path in context.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config at {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config at {}", path.display()))
    }

    /// Load from `path` if it exists, defaults otherwise.
    ///
    /// # Errors
    ///
    /// Parse failure on an existing file. A missing file is not an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

const fn default_claim_attempts() -> u32 {
    5
}

const fn default_quota_pauses() -> u32 {
    3
}

const fn default_quota_max_wait_secs() -> u64 {
    900
}

const fn default_true() -> bool {
    true
}
