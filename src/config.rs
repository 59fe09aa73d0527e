//! Runtime configuration: a handful of knobs that affect the
//! interpreter's diagnostics without affecting its semantics. Loaded
//! from `EFFLUX_`-prefixed environment variables (and from a `.env`
//! file, via `dotenvy`, if one is present) the same way the rest of
//! this crate's stack prefers environment-driven configuration over
//! bespoke file formats.

use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Process-wide interpreter configuration.
///
/// # Example
///
/// ```rust,no_run
/// use efflux::config::RuntimeConfig;
///
/// let config = RuntimeConfig::from_env()?;
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// `tracing_subscriber::EnvFilter` directive [`Self::init_tracing`]
    /// installs a subscriber with. Only consulted if a caller actually
    /// calls `init_tracing`; this crate never installs a subscriber on
    /// its own.
    pub log_level: String,

    /// Panic payloads longer than this (in bytes) are truncated before
    /// being wrapped into `EffectError::HandlerPanicked`/
    /// `DefaultHandlerPanicked`, so a misbehaving handler can't balloon
    /// an error message.
    pub panic_message_limit: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            panic_message_limit: 2048,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from `EFFLUX_*` environment variables,
    /// reading a `.env` file first if one exists. Unset variables fall
    /// back to [`RuntimeConfig::default`].
    pub fn from_env() -> Result<Self> {
        // A missing `.env` file is the common case, not an error.
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Config::try_from(&RuntimeConfig::default())?)
            .add_source(config::Environment::with_prefix("EFFLUX").separator("_"))
            .build()
            .context("failed to assemble runtime configuration")?;

        config
            .try_deserialize()
            .context("failed to deserialize runtime configuration")
    }

    /// Install `self` as the process-wide active configuration, if none
    /// has been installed yet. Returns `false` (and leaves the existing
    /// configuration in place) if [`Self::active`] already ran, or
    /// [`Self::install`] already won, earlier in the process.
    pub fn install(self) -> bool {
        active_cell().set(self).is_ok()
    }

    /// The configuration handler-panic truncation and any future
    /// diagnostics consult. Lazily falls back to [`RuntimeConfig::default`]
    /// on first access if nothing was ever [`Self::install`]ed.
    pub fn active() -> &'static RuntimeConfig {
        active_cell().get_or_init(RuntimeConfig::default)
    }

    /// Install a `tracing-subscriber` formatting layer filtered at
    /// [`Self::log_level`]. A no-op (returns `Ok`) if a global
    /// subscriber is already installed — callers embedding this crate
    /// in a larger application that owns its own subscriber should skip
    /// this and just install their own.
    pub fn init_tracing(&self) -> Result<()> {
        let filter = tracing_subscriber::EnvFilter::try_new(&self.log_level)
            .context("invalid log_level directive")?;
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        Ok(())
    }
}

fn active_cell() -> &'static OnceLock<RuntimeConfig> {
    static ACTIVE: OnceLock<RuntimeConfig> = OnceLock::new();
    &ACTIVE
}
