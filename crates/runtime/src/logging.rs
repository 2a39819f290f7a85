//! Process-wide logging set-up for function servers.

use std::str::FromStr;

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Level {
    /// No output at all.
    Disabled,
    /// Human-readable, debug and up.
    Debug,
    /// JSON lines, info and up.
    #[default]
    Info,
}

impl Level {
    pub fn from_debug_flag(debug: bool) -> Self { if debug { Level::Debug } else { Level::Info } }

    fn default_directive(self) -> &'static str {
        match self {
            Level::Disabled => "off",
            Level::Debug => "debug",
            Level::Info => "info",
        }
    }
}

/// Filter for `level`; `XFN_LOG` overrides it unless logging is disabled.
pub fn filter(level: Level) -> EnvFilter {
    let fallback = || EnvFilter::new(level.default_directive());
    if level == Level::Disabled {
        return fallback();
    }
    match std::env::var("XFN_LOG") {
        Ok(env) => EnvFilter::from_str(&env).unwrap_or_else(|_| fallback()),
        Err(_) => fallback(),
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn configure(level: Level) -> Result<()> {
    let f = filter(level);
    let res = match level {
        Level::Info => tracing_subscriber::fmt().json().with_env_filter(f).with_current_span(true).try_init(),
        Level::Debug | Level::Disabled => tracing_subscriber::fmt().with_env_filter(f).with_target(true).try_init(),
    };
    res.map_err(|e| anyhow!("installing tracing subscriber: {e}"))
}
