//! Header forwarding between HTTP and RPC metadata.

use std::collections::HashSet;

use axum::http::{HeaderMap, HeaderName};

use crate::config::GatewayConfig;

/// Inbound headers with this prefix are always forwarded, prefix stripped.
pub const METADATA_PREFIX: &str = "grpc-metadata-";

/// Whitelists deciding which headers cross the bridge in each direction.
#[derive(Debug, Clone, Default)]
pub struct HeaderMatcher {
    incoming: HashSet<HeaderName>,
    outgoing: HashSet<HeaderName>,
}

impl HeaderMatcher {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            incoming: parse_names(&config.incoming_headers),
            outgoing: parse_names(&config.outgoing_headers),
        }
    }

    /// HTTP request headers to RPC call metadata.
    pub fn incoming(&self, headers: &HeaderMap) -> HeaderMap {
        let mut metadata = HeaderMap::new();
        for (name, value) in headers {
            if self.incoming.contains(name) {
                metadata.append(name.clone(), value.clone());
            } else if let Some(stripped) = name.as_str().strip_prefix(METADATA_PREFIX) {
                if let Ok(stripped) = HeaderName::from_bytes(stripped.as_bytes()) {
                    metadata.append(stripped, value.clone());
                }
            }
        }
        metadata
    }

    /// RPC response metadata to HTTP response headers.
    pub fn outgoing(&self, metadata: &HeaderMap) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in metadata {
            if self.outgoing.contains(name) {
                headers.append(name.clone(), value.clone());
            }
        }
        headers
    }
}

fn parse_names(names: &[String]) -> HashSet<HeaderName> {
    names
        .iter()
        .filter_map(|n| match HeaderName::from_bytes(n.trim().as_bytes()) {
            Ok(name) => Some(name),
            Err(_) => {
                tracing::warn!(header = %n, "Ignoring invalid header name in gateway config");
                None
            }
        })
        .collect()
}
