//! Upstream Backends
//!
//! Transports that reach an upstream inference service, unified behind
//! [`UpstreamTransport`].
//!
//! # Available Transports
//!
//! - **Delta stream** ([`DeltaStreamTransport`]): SSE response events
//! - **Single JSON** ([`SingleJsonTransport`]): one payload on completion
//! - **Accept and forget** ([`AcceptedTransport`]): acknowledgement only
//!
//! # Usage
//!
//! ```ignore
//! use relay_core::backend::{build_transport, BackendConfig, BackendKind};
//!
//! let config = BackendConfig::new(BackendKind::DeltaStream, "https://example.test/responses");
//! let transport = build_transport(&config)?;
//! ```

mod accepted;
mod delta_stream;
mod http;
mod single_json;
mod traits;

use std::sync::Arc;

pub use accepted::AcceptedTransport;
pub use delta_stream::{action_narration, build_transcript, DeltaStreamTransport};
pub use single_json::{extract_text, SingleJsonTransport};
pub use traits::{
    BackendConfig, BackendKind, EventStream, UpstreamRequest, UpstreamTransport,
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_PLACEHOLDER_MESSAGE,
};

use crate::config::ConfigError;

/// Build the transport selected by `config.kind`
pub fn build_transport(config: &BackendConfig) -> Result<Arc<dyn UpstreamTransport>, ConfigError> {
    let transport: Arc<dyn UpstreamTransport> = match config.kind {
        BackendKind::DeltaStream => Arc::new(DeltaStreamTransport::from_config(config)?),
        BackendKind::SingleJson => Arc::new(SingleJsonTransport::from_config(config)?),
        BackendKind::AcceptAndForget => Arc::new(AcceptedTransport::from_config(config)?),
    };

    tracing::info!(
        backend = transport.name(),
        endpoint = config.endpoint.as_deref().unwrap_or_default(),
        "Upstream transport ready"
    );
    Ok(transport)
}

fn require_endpoint(config: &BackendConfig) -> Result<String, ConfigError> {
    config
        .endpoint
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            ConfigError::ValidationError(format!(
                "backend '{}' requires an endpoint",
                config.kind
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_transport_selects_kind() {
        for kind in [
            BackendKind::DeltaStream,
            BackendKind::SingleJson,
            BackendKind::AcceptAndForget,
        ] {
            let transport =
                build_transport(&BackendConfig::new(kind, "http://127.0.0.1:9/upstream")).unwrap();
            assert_eq!(transport.kind(), kind);
            assert_eq!(transport.name(), kind.as_str());
        }
    }

    #[test]
    fn test_build_transport_requires_endpoint() {
        let config = BackendConfig {
            endpoint: Some("   ".to_string()),
            ..Default::default()
        };
        let err = build_transport(&config).err().unwrap();
        assert!(err.to_string().contains("requires an endpoint"));
    }
}
