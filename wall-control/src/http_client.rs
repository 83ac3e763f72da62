use crate::error::ProtocolError;
use crate::soap::{SoapResponse, SoapTransport, CONTENT_TYPE};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// reqwest-backed SOAP transport shared by every camera.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, ProtocolError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ProtocolError::Transport {
                operation: "client build".to_string(),
                endpoint: "-".to_string(),
                source,
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SoapTransport for HttpTransport {
    async fn post(
        &self,
        endpoint: &str,
        action: &str,
        envelope: String,
    ) -> Result<SoapResponse, ProtocolError> {
        let operation = action.rsplit('/').next().unwrap_or(action).to_string();
        let response = self
            .client
            .post(endpoint)
            .header("Content-Type", format!("{CONTENT_TYPE}; action=\"{action}\""))
            .body(envelope)
            .send()
            .await
            .map_err(|source| {
                if source.is_connect() || source.is_timeout() {
                    ProtocolError::Unreachable {
                        endpoint: endpoint.to_string(),
                        reason: source.to_string(),
                    }
                } else {
                    ProtocolError::Transport {
                        operation: operation.clone(),
                        endpoint: endpoint.to_string(),
                        source,
                    }
                }
            })?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|source| ProtocolError::Transport {
                operation,
                endpoint: endpoint.to_string(),
                source,
            })?;
        Ok(SoapResponse { status, body })
    }
}
