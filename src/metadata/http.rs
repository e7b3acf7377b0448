use super::{MetadataSnapshot, MetadataSource};
use crate::core::{NodeAddress, Result, RouterError};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

#[derive(Serialize)]
struct CheckInRequest {
    router_id: u32,
}

/// Metadata source that reads the topology as JSON over HTTP.
///
/// `GET http://<server>/metadata` must return a `MetadataSnapshot` document;
/// check-ins are `POST http://<server>/check-in`.
#[derive(Clone)]
pub struct HttpMetadataSource {
    client: reqwest::Client,
}

impl HttpMetadataSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| RouterError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    fn url(server: &NodeAddress, path: &str) -> String {
        format!("http://{}{}", server, path)
    }

    fn unreachable(server: &NodeAddress, err: reqwest::Error) -> RouterError {
        RouterError::MetadataUnreachable {
            server: server.to_string(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl MetadataSource for HttpMetadataSource {
    async fn fetch_metadata(&self, server: &NodeAddress) -> Result<MetadataSnapshot> {
        let response = self
            .client
            .get(Self::url(server, "/metadata"))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Self::unreachable(server, e))?;

        response
            .json::<MetadataSnapshot>()
            .await
            .map_err(|e| RouterError::InvalidMetadata {
                server: server.to_string(),
                reason: e.to_string(),
            })
    }

    async fn update_router_check_in(&self, server: &NodeAddress, router_id: u32) -> Result<()> {
        self.client
            .post(Self::url(server, "/check-in"))
            .json(&CheckInRequest { router_id })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Self::unreachable(server, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_layout() {
        let server = NodeAddress::new("db-1", 8443);
        assert_eq!(HttpMetadataSource::url(&server, "/metadata"), "http://db-1:8443/metadata");
    }

    #[tokio::test]
    async fn test_unreachable_server_maps_to_unreachable_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let source = HttpMetadataSource::new(Duration::from_millis(200)).unwrap();
        let err = source
            .fetch_metadata(&NodeAddress::localhost(port))
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::MetadataUnreachable { .. }), "{}", err);
    }
}
