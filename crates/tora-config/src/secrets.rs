//! Runtime secret resolution.
//!
//! Config YAML stores only env var NAMES (e.g. `"TORA_REDDIT_TOKEN"`); values
//! come from the environment, once, at startup. `Debug` redacts every value and
//! errors name the variable, never its contents.

use anyhow::{bail, Result};
use serde_json::Value;

pub const DEFAULT_REDDIT_TOKEN_ENV: &str = "TORA_REDDIT_TOKEN";
pub const DEFAULT_BLOSSOM_API_KEY_ENV: &str = "TORA_BLOSSOM_API_KEY";
pub const DEFAULT_BLOSSOM_TOKEN_ENV: &str = "TORA_BLOSSOM_TOKEN";

/// Credentials for both stores. Issued elsewhere; we only read them.
#[derive(Clone)]
pub struct ResolvedSecrets {
    pub reddit_token: Option<String>,
    pub blossom_api_key: Option<String>,
    /// Optional bearer token some Blossom deployments require on top of the key.
    pub blossom_token: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("reddit_token", &self.reddit_token.as_ref().map(|_| "<REDACTED>"))
            .field(
                "blossom_api_key",
                &self.blossom_api_key.as_ref().map(|_| "<REDACTED>"),
            )
            .field(
                "blossom_token",
                &self.blossom_token.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

/// Env var names as stored in config, with defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretEnvNames {
    pub reddit_token: String,
    pub blossom_api_key: String,
    pub blossom_token: String,
}

impl SecretEnvNames {
    pub fn from_config_json(config_json: &Value) -> Self {
        Self {
            reddit_token: read_str_at(config_json, "/reddit/keys_env/token")
                .unwrap_or_else(|| DEFAULT_REDDIT_TOKEN_ENV.to_string()),
            blossom_api_key: read_str_at(config_json, "/blossom/keys_env/api_key")
                .unwrap_or_else(|| DEFAULT_BLOSSOM_API_KEY_ENV.to_string()),
            blossom_token: read_str_at(config_json, "/blossom/keys_env/token")
                .unwrap_or_else(|| DEFAULT_BLOSSOM_TOKEN_ENV.to_string()),
        }
    }
}

fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Unset and blank are the same thing.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve all credentials from the environment.
///
/// With `require = true` the reddit token and the Blossom API key must be
/// present (anything that talks to both stores). Offline commands pass
/// `false` and get whatever is set. The Blossom bearer token is always
/// optional.
pub fn resolve_secrets(config_json: &Value, require: bool) -> Result<ResolvedSecrets> {
    let names = SecretEnvNames::from_config_json(config_json);

    let reddit_token = resolve_env(&names.reddit_token);
    let blossom_api_key = resolve_env(&names.blossom_api_key);
    let blossom_token = resolve_env(&names.blossom_token);

    if require {
        if reddit_token.is_none() {
            bail!(
                "SECRETS_MISSING: required env var '{}' (reddit token) is not set or empty",
                names.reddit_token,
            );
        }
        if blossom_api_key.is_none() {
            bail!(
                "SECRETS_MISSING: required env var '{}' (blossom api_key) is not set or empty",
                names.blossom_api_key,
            );
        }
    }

    Ok(ResolvedSecrets {
        reddit_token,
        blossom_api_key,
        blossom_token,
    })
}
