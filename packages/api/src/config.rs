//! Backend endpoints and keys from the environment.
//!
//! Values are baked in at build time with `option_env!` (the only source on
//! wasm32). Native builds also read `.env` through `dotenvy` and the process
//! environment, which take precedence.

use thiserror::Error;

pub const BACKEND_URL_VAR: &str = "YIELDNEST_BACKEND_URL";
pub const ANON_KEY_VAR: &str = "YIELDNEST_BACKEND_ANON_KEY";
pub const API_URL_VAR: &str = "YIELDNEST_API_URL";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Where the hosted backend lives and the public key used to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Project URL without a trailing slash, e.g. `https://abc.supabase.co`.
    pub url: String,
    /// Public (anon) API key, sent as `apikey` on every request.
    pub anon_key: String,
    /// Base URL of the HTTP API used for non-table endpoints.
    pub api_url: String,
}

impl BackendConfig {
    /// Load from the build-time and run-time environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        #[cfg(not(target_arch = "wasm32"))]
        {
            dotenvy::dotenv().ok();
            Self::from_lookup(|key| std::env::var(key).ok().or_else(|| compiled(key)))
        }
        #[cfg(target_arch = "wasm32")]
        {
            Self::from_lookup(compiled)
        }
    }

    /// Build from an arbitrary key lookup. Blank values count as missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &'static str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let url = get(BACKEND_URL_VAR).ok_or(ConfigError::Missing(BACKEND_URL_VAR))?;
        let url = normalize_url(BACKEND_URL_VAR, &url)?;
        let anon_key = get(ANON_KEY_VAR).ok_or(ConfigError::Missing(ANON_KEY_VAR))?;
        let api_url = match get(API_URL_VAR) {
            Some(api_url) => normalize_url(API_URL_VAR, &api_url)?,
            None => format!("{url}/functions/v1"),
        };

        Ok(Self {
            url,
            anon_key,
            api_url,
        })
    }

    pub fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.url, path.trim_start_matches('/'))
    }

    pub fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.url)
    }

    /// Websocket endpoint of the realtime service.
    pub fn realtime_url(&self) -> String {
        let ws = if let Some(rest) = self.url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.url.clone()
        };
        format!("{ws}/realtime/v1/websocket?apikey={}&vsn=1.0.0", self.anon_key)
    }
}

fn normalize_url(key: &'static str, value: &str) -> Result<String, ConfigError> {
    if !(value.starts_with("https://") || value.starts_with("http://")) {
        return Err(ConfigError::Invalid {
            key,
            reason: format!("expected an http(s) URL, got {value:?}"),
        });
    }
    Ok(value.trim_end_matches('/').to_string())
}

fn compiled(key: &str) -> Option<String> {
    let value = match key {
        BACKEND_URL_VAR => option_env!("YIELDNEST_BACKEND_URL"),
        ANON_KEY_VAR => option_env!("YIELDNEST_BACKEND_ANON_KEY"),
        API_URL_VAR => option_env!("YIELDNEST_API_URL"),
        _ => None,
    };
    value.map(str::to_string)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_required_keys() {
        assert_eq!(
            BackendConfig::from_lookup(lookup(&[(ANON_KEY_VAR, "anon")])),
            Err(ConfigError::Missing(BACKEND_URL_VAR))
        );
        assert_eq!(
            BackendConfig::from_lookup(lookup(&[
                (BACKEND_URL_VAR, "https://demo.supabase.co"),
                (ANON_KEY_VAR, "   "),
            ])),
            Err(ConfigError::Missing(ANON_KEY_VAR))
        );
    }

    #[test]
    fn test_defaults_and_urls() {
        let config = BackendConfig::from_lookup(lookup(&[
            (BACKEND_URL_VAR, "https://demo.supabase.co/"),
            (ANON_KEY_VAR, "anon"),
        ]))
        .unwrap();
        assert_eq!(config.url, "https://demo.supabase.co");
        assert_eq!(config.api_url, "https://demo.supabase.co/functions/v1");
        assert_eq!(
            config.auth_url("token?grant_type=password"),
            "https://demo.supabase.co/auth/v1/token?grant_type=password"
        );
        assert_eq!(config.rest_url("profiles"), "https://demo.supabase.co/rest/v1/profiles");
        assert_eq!(
            config.realtime_url(),
            "wss://demo.supabase.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );
    }

    #[test]
    fn test_rejects_non_http_url() {
        let err = BackendConfig::from_lookup(lookup(&[
            (BACKEND_URL_VAR, "demo.supabase.co"),
            (ANON_KEY_VAR, "anon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: BACKEND_URL_VAR, .. }));
    }
}
