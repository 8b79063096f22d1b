use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required config field: {0}")]
    MissingField(&'static str),
}

/// Final, merged configuration used by the running process.
///
/// Merge order: CLI > ENV. The upstream API key is optional here on
/// purpose — its absence is detected per request, not at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    /// Upstream API key. `None` turns every analysis request into a
    /// configuration error; the detail is never sent to the caller.
    pub api_key: Option<String>,
    /// Upstream base URL override; the provider applies its own default.
    pub base_url: Option<String>,
    /// Optional outbound proxy (for upstream egress).
    pub proxy: Option<String>,
}

impl ProxyConfig {
    /// Lazy credential check, run once per analysis request.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingField("api_key"))
    }
}

/// Optional layer used for merging the proxy config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyConfigPatch {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub proxy: Option<String>,
}

impl ProxyConfigPatch {
    pub fn overlay(&mut self, other: ProxyConfigPatch) {
        if other.host.is_some() {
            self.host = other.host;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.api_key.is_some() {
            self.api_key = other.api_key;
        }
        if other.base_url.is_some() {
            self.base_url = other.base_url;
        }
        if other.proxy.is_some() {
            self.proxy = other.proxy;
        }
    }

    pub fn into_config(self) -> ProxyConfig {
        ProxyConfig {
            host: self.host.unwrap_or_else(|| "127.0.0.1".to_string()),
            port: self.port.unwrap_or(8787),
            api_key: self.api_key,
            base_url: self.base_url,
            proxy: self.proxy,
        }
    }
}

impl From<ProxyConfig> for ProxyConfigPatch {
    fn from(value: ProxyConfig) -> Self {
        Self {
            host: Some(value.host),
            port: Some(value.port),
            api_key: value.api_key,
            base_url: value.base_url,
            proxy: value.proxy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_prefers_later_layer() {
        let mut base = ProxyConfigPatch {
            host: Some("0.0.0.0".to_string()),
            port: Some(9000),
            api_key: Some("env-key".to_string()),
            base_url: None,
            proxy: None,
        };
        base.overlay(ProxyConfigPatch {
            port: Some(8080),
            api_key: Some("cli-key".to_string()),
            ..Default::default()
        });
        let config = base.into_config();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.api_key.as_deref(), Some("cli-key"));
    }

    #[test]
    fn overlay_keeps_base_when_other_is_empty() {
        let mut base = ProxyConfigPatch {
            api_key: Some("env-key".to_string()),
            ..Default::default()
        };
        base.overlay(ProxyConfigPatch::default());
        assert_eq!(base.into_config().api_key.as_deref(), Some("env-key"));
    }

    #[test]
    fn require_api_key_rejects_missing_and_blank() {
        let mut config = ProxyConfigPatch::default().into_config();
        assert!(config.require_api_key().is_err());
        config.api_key = Some("  ".to_string());
        assert!(config.require_api_key().is_err());
        config.api_key = Some("k".to_string());
        assert_eq!(config.require_api_key().unwrap(), "k");
    }
}
