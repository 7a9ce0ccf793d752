//! Environment configuration
//!
//! Values come from the process environment, optionally seeded from a `.env`
//! file. Optional settings fall back to defaults; a setting that is present
//! but unparsable is an error rather than a silent default.

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("environment variable {0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// What the generic contact endpoint does when the user already has a
/// contact entry on the listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Record the message but leave the existing entry alone.
    #[default]
    Ignore,
    /// Fail with `AlreadyContacted`.
    Reject,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(DuplicatePolicy::Ignore),
            "reject" => Ok(DuplicatePolicy::Reject),
            other => Err(format!("expected `ignore` or `reject`, got `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub upload_dir: PathBuf,
    pub nearby_radius_km: f64,
    pub contact_duplicates: DuplicatePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: "data.db".to_string(),
            jwt_secret: String::new(),
            upload_dir: PathBuf::from("uploads"),
            nearby_radius_km: 1.0,
            contact_duplicates: DuplicatePolicy::Ignore,
        }
    }
}

impl Config {
    /// Loads `.env` (if present) and reads the configuration from the environment.
    ///
    /// # Environment Variables
    ///
    /// - `PORT` - Server port number (default: 8080)
    /// - `DATABASE_URL` - Path to database file (default: "data.db")
    /// - `JWT_SECRET` - HMAC secret used to verify bearer tokens (required)
    /// - `UPLOAD_DIR` - Directory holding uploaded images (default: "uploads")
    /// - `NEARBY_RADIUS_KM` - Default proximity radius (default: 1.0)
    /// - `CONTACT_DUPLICATE_POLICY` - `ignore` or `reject` (default: ignore)
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let jwt_secret = lookup("JWT_SECRET")
            .filter(|secret| !secret.is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let nearby_radius_km: f64 =
            try_load(&lookup, "NEARBY_RADIUS_KM", defaults.nearby_radius_km)?;
        if !nearby_radius_km.is_finite() || nearby_radius_km <= 0.0 {
            return Err(ConfigError::Invalid {
                key: "NEARBY_RADIUS_KM",
                reason: "must be a positive number".to_string(),
            });
        }

        Ok(Self {
            port: try_load(&lookup, "PORT", defaults.port)?,
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            jwt_secret,
            upload_dir: lookup("UPLOAD_DIR").map(PathBuf::from).unwrap_or(defaults.upload_dir),
            nearby_radius_km,
            contact_duplicates: try_load(
                &lookup,
                "CONTACT_DUPLICATE_POLICY",
                defaults.contact_duplicates,
            )?,
        })
    }
}

fn try_load<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr + std::fmt::Debug,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => {
            info!("{key} not set, using default: {default:?}");
            Ok(default)
        }
    }
}
