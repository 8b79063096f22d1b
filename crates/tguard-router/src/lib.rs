//! HTTP boundary for tguard.
//!
//! Two POST endpoints, OPTIONS preflight, permissive CORS on every
//! response, and a typed error taxonomy mapped to JSON `{error}` bodies.
//! Nothing here talks to the network directly; the upstream call goes
//! through the [`tguard_provider::UpstreamClient`] seam in the state.

pub mod proxy;

pub use proxy::{ProxyState, proxy_router};
