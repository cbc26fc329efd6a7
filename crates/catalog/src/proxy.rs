use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

pub const DEFAULT_CACHE_DURATION: &str = "1d";

fn default_cache_duration() -> String {
    DEFAULT_CACHE_DURATION.to_string()
}

/// Proxy settings from the application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    /// Hosts whose requests always go through the proxy. Subdomains match.
    #[serde(default)]
    pub proxyable_domains: Vec<String>,
    #[serde(default)]
    pub always_proxy: bool,
    #[serde(default = "default_cache_duration")]
    pub default_cache_duration: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            proxy_url: None,
            proxyable_domains: Vec::new(),
            always_proxy: false,
            default_cache_duration: default_cache_duration(),
        }
    }
}

/// Per-node proxy preferences, read from the node's free-form properties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProxyHints {
    pub force_proxy: bool,
    pub cache_duration: Option<String>,
}

impl ProxyHints {
    pub fn from_properties(props: &Map<String, Value>) -> Self {
        Self {
            force_proxy: props
                .get("forceProxy")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            cache_duration: props
                .get("cacheDuration")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }
}

/// Rewrites outbound URLs to go through the caching proxy.
#[derive(Debug, Clone, Default)]
pub struct UrlProxy {
    config: ProxyConfig,
}

impl UrlProxy {
    pub fn new(config: ProxyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Returns `url` routed through `<proxy>/_<duration>/<url>` when the
    /// node forces it, the config always proxies, or the host is proxyable.
    /// Without a configured proxy the URL is returned unchanged.
    pub fn proxy_url(&self, hints: &ProxyHints, url: &str, cache_duration: Option<&str>) -> String {
        let Some(base) = self.config.proxy_url.as_deref() else {
            return url.to_string();
        };
        if url.starts_with(base) {
            return url.to_string();
        }
        if !(hints.force_proxy || self.config.always_proxy || self.is_proxyable(url)) {
            return url.to_string();
        }
        let duration = cache_duration
            .or(hints.cache_duration.as_deref())
            .unwrap_or(&self.config.default_cache_duration);
        format!("{}/_{}/{}", base.trim_end_matches('/'), duration, url)
    }

    fn is_proxyable(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        self.config.proxyable_domains.iter().any(|domain| {
            host == domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}
