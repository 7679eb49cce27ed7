//! Server configuration from environment variables
//!
//! `.env` is loaded by `main` before this runs.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    /// Externally reachable base the provider calls back on
    pub public_base_url: String,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub recording_storage_path: PathBuf,
    pub recording_storage_quota_gb: f64,
    pub transcription_api_url: Option<String>,
    pub transcription_api_key: Option<String>,
    pub jwt_secret: String,
    pub keypad_timeout_seconds: u32,
    pub recording_max_attempts: u32,
    pub default_tts_voice: String,
    pub default_tts_language: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let config = Self {
            database_url: required("DATABASE_URL")?,
            port: parse_or(get("PORT"), "PORT", 3000)?,
            public_base_url: required("PUBLIC_BASE_URL")?,
            twilio_account_sid: get("TWILIO_ACCOUNT_SID").unwrap_or_default(),
            twilio_auth_token: get("TWILIO_AUTH_TOKEN").unwrap_or_default(),
            recording_storage_path: get("RECORDING_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./recordings")),
            recording_storage_quota_gb: parse_or(get("RECORDING_STORAGE_QUOTA_GB"), "RECORDING_STORAGE_QUOTA_GB", 50.0)?,
            transcription_api_url: get("TRANSCRIPTION_API_URL"),
            transcription_api_key: get("TRANSCRIPTION_API_KEY"),
            jwt_secret: required("JWT_SECRET")?,
            keypad_timeout_seconds: parse_or(get("KEYPAD_TIMEOUT_SECONDS"), "KEYPAD_TIMEOUT_SECONDS", 10)?,
            recording_max_attempts: parse_or(get("RECORDING_MAX_ATTEMPTS"), "RECORDING_MAX_ATTEMPTS", 3)?,
            default_tts_voice: get("DEFAULT_TTS_VOICE").unwrap_or_else(|| "Polly.Joanna".to_string()),
            default_tts_language: get("DEFAULT_TTS_LANGUAGE").unwrap_or_else(|| "en-US".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match url::Url::parse(&self.public_base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => {
                return Err(ConfigError::Invalid {
                    name: "PUBLIC_BASE_URL",
                    value: self.public_base_url.clone(),
                })
            }
        }

        if self.recording_storage_quota_gb <= 0.0 {
            return Err(ConfigError::Invalid {
                name: "RECORDING_STORAGE_QUOTA_GB",
                value: self.recording_storage_quota_gb.to_string(),
            });
        }

        if self.keypad_timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                name: "KEYPAD_TIMEOUT_SECONDS",
                value: "0".to_string(),
            });
        }

        if self.recording_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "RECORDING_MAX_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        Ok(())
    }

    pub fn twilio_configured(&self) -> bool {
        !self.twilio_account_sid.is_empty() && !self.twilio_auth_token.is_empty()
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError> {
    match value {
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    const MINIMAL: &[(&str, &str)] = &[
        ("DATABASE_URL", "postgres://localhost/calltrack"),
        ("PUBLIC_BASE_URL", "https://hooks.example.com"),
        ("JWT_SECRET", "secret"),
    ];

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(MINIMAL)).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.recording_storage_path, PathBuf::from("./recordings"));
        assert_eq!(config.recording_storage_quota_gb, 50.0);
        assert_eq!(config.keypad_timeout_seconds, 10);
        assert_eq!(config.recording_max_attempts, 3);
        assert_eq!(config.default_tts_voice, "Polly.Joanna");
        assert_eq!(config.default_tts_language, "en-US");
        assert!(config.transcription_api_url.is_none());
        assert!(!config.twilio_configured());
    }

    #[test]
    fn test_missing_required() {
        let result = AppConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://x"), ("JWT_SECRET", "s")]));
        assert_eq!(result.unwrap_err(), ConfigError::Missing("PUBLIC_BASE_URL"));
    }

    #[test]
    fn test_invalid_values() {
        let mut pairs = MINIMAL.to_vec();
        pairs.push(("PORT", "eighty"));
        assert!(matches!(
            AppConfig::from_lookup(lookup(&pairs)),
            Err(ConfigError::Invalid { name: "PORT", .. })
        ));

        let mut pairs = MINIMAL.to_vec();
        pairs.retain(|(k, _)| *k != "PUBLIC_BASE_URL");
        pairs.push(("PUBLIC_BASE_URL", "hooks.example.com"));
        assert!(matches!(
            AppConfig::from_lookup(lookup(&pairs)),
            Err(ConfigError::Invalid { name: "PUBLIC_BASE_URL", .. })
        ));

        let mut pairs = MINIMAL.to_vec();
        pairs.push(("RECORDING_MAX_ATTEMPTS", "0"));
        assert!(matches!(
            AppConfig::from_lookup(lookup(&pairs)),
            Err(ConfigError::Invalid { name: "RECORDING_MAX_ATTEMPTS", .. })
        ));
    }

    #[test]
    fn test_empty_values_count_as_unset() {
        let mut pairs = MINIMAL.to_vec();
        pairs.push(("PORT", "  "));
        pairs.push(("TRANSCRIPTION_API_URL", ""));
        let config = AppConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.port, 3000);
        assert!(config.transcription_api_url.is_none());
    }
}
