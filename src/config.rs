use crate::error::{CloudError, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const DEFAULT_UNIVERSE_ID: u64 = 4846447502;
pub const DEFAULT_PLACE_ID: u64 = 13822889106;
pub const DEFAULT_CREATOR_ID: u64 = 892147731;
pub const DEFAULT_USER_ID: u64 = 892147731;
pub const DEFAULT_ASSETS_DIR: &str = "generated-assets";

static ENV_LOADED: OnceLock<()> = OnceLock::new();

/// Loads a `.env` file into the process environment at most once.
///
/// With no path this walks up from the working directory like the usual
/// monorepo-root lookup. Later calls are no-ops regardless of argument.
pub fn load_env(path: Option<&Path>) {
    ENV_LOADED.get_or_init(|| {
        let outcome = match path {
            Some(p) => dotenvy::from_path(p).map(|_| p.to_path_buf()),
            None => dotenvy::dotenv(),
        };
        match outcome {
            Ok(p) => tracing::debug!("Loaded environment from {}", p.display()),
            Err(err) => tracing::debug!("No .env file applied: {err}"),
        }
    });
}

/// Returns the trimmed value of `key`, failing when it is absent or blank.
pub fn required_var(key: &str) -> Result<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(CloudError::configuration(
            key,
            &format!("Set {key} in the environment or in the repository .env file."),
        )),
    }
}

fn var_or_default(key: &str, fallback: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(fallback)
}

pub fn default_universe_id() -> u64 {
    var_or_default("ROBLOX_UNIVERSE_ID", DEFAULT_UNIVERSE_ID)
}

pub fn default_place_id() -> u64 {
    var_or_default("ROBLOX_PLACE_ID", DEFAULT_PLACE_ID)
}

pub fn default_creator_id() -> u64 {
    var_or_default("ROBLOX_CREATOR_ID", DEFAULT_CREATOR_ID)
}

pub fn default_user_id() -> u64 {
    var_or_default("ROBLOX_USER_ID", DEFAULT_USER_ID)
}

pub fn local_assets_dir() -> PathBuf {
    env::var("LOCAL_ASSETS_DIR")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ASSETS_DIR))
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
}

impl OpenAiConfig {
    pub fn from_env() -> Result<Self> {
        load_env(None);
        Ok(Self {
            api_key: required_var("OPENAI_API_KEY")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RobloxCloudConfig {
    pub api_key: String,
}

impl RobloxCloudConfig {
    pub fn from_env() -> Result<Self> {
        load_env(None);
        Ok(Self {
            api_key: required_var("ROBLOX_CLOUD_API_KEY")?,
        })
    }
}

#[derive(Debug, Default)]
pub struct EnvReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Startup scan of the environment. Missing credentials are reported, not
/// fatal: the server still starts so that unaffected tools keep working.
pub fn validate_environment() -> EnvReport {
    let mut report = EnvReport {
        valid: true,
        ..Default::default()
    };
    for key in ["OPENAI_API_KEY", "ROBLOX_CLOUD_API_KEY"] {
        if required_var(key).is_err() {
            report.valid = false;
            report
                .errors
                .push(format!("{key} is not set; tools that need it will fail"));
        }
    }
    for (key, fallback) in [
        ("ROBLOX_UNIVERSE_ID", DEFAULT_UNIVERSE_ID),
        ("ROBLOX_PLACE_ID", DEFAULT_PLACE_ID),
    ] {
        if env::var(key).map(|v| v.trim().is_empty()).unwrap_or(true) {
            report
                .warnings
                .push(format!("{key} is not set; defaulting to {fallback}"));
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_var_returns_trimmed_value() {
        temp_env::with_var("RBX_TEST_KEY", Some("  secret  "), || {
            assert_eq!(required_var("RBX_TEST_KEY").unwrap(), "secret");
        });
    }

    #[test]
    fn required_var_names_missing_key() {
        temp_env::with_var_unset("RBX_TEST_MISSING", || {
            let err = required_var("RBX_TEST_MISSING").unwrap_err();
            assert!(err.to_string().contains("RBX_TEST_MISSING"));
        });
    }

    #[test]
    fn required_var_rejects_whitespace_only_value() {
        temp_env::with_var("RBX_TEST_BLANK", Some("   \t"), || {
            let err = required_var("RBX_TEST_BLANK").unwrap_err();
            assert!(err.to_string().contains("RBX_TEST_BLANK"));
        });
    }

    #[test]
    fn numeric_getters_fall_back_to_literals() {
        temp_env::with_vars(
            [
                ("ROBLOX_UNIVERSE_ID", None::<&str>),
                ("ROBLOX_USER_ID", None),
            ],
            || {
                assert_eq!(default_universe_id(), DEFAULT_UNIVERSE_ID);
                assert_eq!(default_user_id(), DEFAULT_USER_ID);
            },
        );
    }

    #[test]
    fn numeric_getters_ignore_garbage_values() {
        temp_env::with_var("ROBLOX_PLACE_ID", Some("not-a-number"), || {
            assert_eq!(default_place_id(), DEFAULT_PLACE_ID);
        });
    }

    #[test]
    fn numeric_getters_use_env_when_parseable() {
        temp_env::with_var("ROBLOX_CREATOR_ID", Some("42"), || {
            assert_eq!(default_creator_id(), 42);
        });
    }

    #[test]
    fn assets_dir_defaults_when_unset() {
        temp_env::with_var_unset("LOCAL_ASSETS_DIR", || {
            assert_eq!(local_assets_dir(), PathBuf::from(DEFAULT_ASSETS_DIR));
        });
    }

    #[test]
    fn validate_environment_classifies_errors_and_warnings() {
        temp_env::with_vars(
            [
                ("OPENAI_API_KEY", None::<&str>),
                ("ROBLOX_CLOUD_API_KEY", Some("key")),
                ("ROBLOX_UNIVERSE_ID", None),
                ("ROBLOX_PLACE_ID", Some("123")),
            ],
            || {
                let report = validate_environment();
                assert!(!report.valid);
                assert_eq!(report.errors.len(), 1);
                assert!(report.errors[0].contains("OPENAI_API_KEY"));
                assert_eq!(report.warnings.len(), 1);
                assert!(report.warnings[0].contains("ROBLOX_UNIVERSE_ID"));
            },
        );
    }

    #[test]
    fn validate_environment_passes_with_both_keys() {
        temp_env::with_vars(
            [
                ("OPENAI_API_KEY", Some("a")),
                ("ROBLOX_CLOUD_API_KEY", Some("b")),
            ],
            || {
                assert!(validate_environment().valid);
            },
        );
    }
}
