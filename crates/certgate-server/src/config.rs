//! Gateway configuration from environment variables
//!
//! | Variable | Default |
//! |----------|---------|
//! | `CERTGATE_PORT` | `3000` (also used for invalid values) |
//! | `CERTGATE_ZONE` | `dev` when unset, `prod` when unrecognized |
//! | `CERTGATE_LOG_LEVEL` | `info` |
//! | `CERTGATE_TLS_KEY` | `./tls/server.key.pem` |
//! | `CERTGATE_TLS_CERT` | `./tls/server.cert.pem` |
//! | `CERTGATE_TLS_CA` | `./tls/ca.cert.pem` |
//! | `CERTGATE_DATABASE_URL` | unset (in-memory store) |
//! | `CERTGATE_PATCH_RETRIES` | `5` (minimum 1) |

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_PATCH_RETRIES: u32 = 5;

/// Deployment zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Dev,
    Staging,
    Prod,
    Test,
}

impl Zone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Dev => "dev",
            Zone::Staging => "staging",
            Zone::Prod => "prod",
            Zone::Test => "test",
        }
    }

    /// Logging is silenced in the test zone
    pub fn logs_enabled(&self) -> bool {
        !matches!(self, Zone::Test)
    }
}

impl FromStr for Zone {
    type Err = std::convert::Infallible;

    /// Unrecognized zones are treated as production.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Zone::Dev,
            "staging" => Zone::Staging,
            "test" => Zone::Test,
            _ => Zone::Prod,
        })
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// PEM file locations for the TLS listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub key: PathBuf,
    pub cert: PathBuf,
    /// Roots that client certificates must chain to in order to be trusted
    pub client_ca: PathBuf,
}

/// Gateway configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub port: u16,
    pub zone: Zone,
    pub log_level: Level,
    pub tls: TlsPaths,
    pub database_url: Option<String>,
    pub patch_retries: u32,
}

impl GatewayConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = var("CERTGATE_PORT")
            .and_then(|p| p.parse::<u16>().ok())
            .filter(|p| *p != 0)
            .unwrap_or(DEFAULT_PORT);

        let zone = var("CERTGATE_ZONE")
            .map(|z| z.parse().unwrap_or(Zone::Prod))
            .unwrap_or(Zone::Dev);

        let log_level = var("CERTGATE_LOG_LEVEL")
            .and_then(|l| l.parse().ok())
            .unwrap_or(Level::INFO);

        let path =
            |key: &str, default: &str| PathBuf::from(var(key).unwrap_or_else(|| default.into()));
        let tls = TlsPaths {
            key: path("CERTGATE_TLS_KEY", "./tls/server.key.pem"),
            cert: path("CERTGATE_TLS_CERT", "./tls/server.cert.pem"),
            client_ca: path("CERTGATE_TLS_CA", "./tls/ca.cert.pem"),
        };

        let patch_retries = var("CERTGATE_PATCH_RETRIES")
            .and_then(|r| r.parse::<u32>().ok())
            .unwrap_or(DEFAULT_PATCH_RETRIES)
            .max(1);

        Self {
            port,
            zone,
            log_level,
            tls,
            database_url: var("CERTGATE_DATABASE_URL"),
            patch_retries,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
