use clap::Parser;
use tguard_common::ProxyConfigPatch;

#[derive(Parser)]
#[command(name = "tguard")]
pub(crate) struct Cli {
    #[arg(long, default_value = "127.0.0.1")]
    pub(crate) host: String,
    #[arg(long, default_value_t = 8787)]
    pub(crate) port: u16,
    /// Upstream Gemini API key. Overrides GEMINI_API_KEY.
    #[arg(long)]
    pub(crate) api_key: Option<String>,
    /// Upstream base URL override (for testing against a local stub).
    #[arg(long)]
    pub(crate) base_url: Option<String>,
    /// Outbound proxy for upstream egress.
    #[arg(long)]
    pub(crate) proxy: Option<String>,
}

impl Cli {
    pub(crate) fn into_patch(self) -> ProxyConfigPatch {
        ProxyConfigPatch {
            host: Some(self.host),
            port: Some(self.port),
            api_key: self.api_key,
            base_url: self.base_url,
            proxy: self.proxy,
        }
    }
}

/// Environment layer of the config merge. The key is deliberately not
/// required here; a missing key surfaces per request as HTTP 500.
pub(crate) fn env_patch() -> ProxyConfigPatch {
    ProxyConfigPatch {
        api_key: std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty()),
        ..Default::default()
    }
}
