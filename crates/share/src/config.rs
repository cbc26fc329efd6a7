//! Share-related application configuration.
//!
//! Read from a JSON file, then overridden from `ATLAS_*` environment
//! variables.

use std::env;
use std::fs;
use std::path::Path;

use catalog::ProxyConfig;
use serde::{Deserialize, Serialize};

use crate::error::ShareError;
use crate::link::{LinkOptions, default_whitelist};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareConfig {
    /// Base URL that share links point at.
    pub app_url: String,
    /// Short-link endpoint. Without one, links are always full length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortlink_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_email: Option<String>,
    #[serde(default)]
    pub proxy: ProxyConfig,
    /// User parameters allowed to ride along on a link.
    #[serde(default = "default_whitelist")]
    pub param_whitelist: Vec<String>,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            app_url: "http://localhost:3001/".to_string(),
            shortlink_url: None,
            feedback_url: None,
            support_email: None,
            proxy: ProxyConfig::default(),
            param_whitelist: default_whitelist(),
        }
    }
}

impl ShareConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ShareError> {
        serde_json::from_str(json).map_err(|e| ShareError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ShareError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| ShareError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    /// Applies overrides from the process environment.
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_env(|key| env::var(key).ok());
        self
    }

    /// Applies overrides from `lookup`. Empty values clear optional settings.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        self.app_url = env_var_string(&lookup, "ATLAS_APP_URL", &self.app_url);
        self.shortlink_url =
            env_var_optional(&lookup, "ATLAS_SHORTLINK_URL", self.shortlink_url.take());
        self.feedback_url =
            env_var_optional(&lookup, "ATLAS_FEEDBACK_URL", self.feedback_url.take());
        self.support_email =
            env_var_optional(&lookup, "ATLAS_SUPPORT_EMAIL", self.support_email.take());
        self.proxy.proxy_url =
            env_var_optional(&lookup, "ATLAS_PROXY_URL", self.proxy.proxy_url.take());
    }

    pub fn link_options(&self) -> LinkOptions {
        LinkOptions {
            app_url: self.app_url.clone(),
            user_params: Vec::new(),
            whitelist: self.param_whitelist.clone(),
        }
    }
}

fn env_var_string(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key)
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_var_optional(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Option<String>,
) -> Option<String> {
    match lookup(key) {
        Some(v) if v.is_empty() => None,
        Some(v) => Some(v),
        None => default,
    }
}
