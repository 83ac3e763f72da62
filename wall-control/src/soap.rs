use crate::camera::Credentials;
use crate::error::ProtocolError;
use crate::onvif_requests::OnvifRequest;
use crate::wsse;
use async_trait::async_trait;
use mockall::automock;
use roxmltree::Document;
use time::Duration;

pub const CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

#[derive(Debug, Clone)]
pub struct SoapResponse {
    pub status: u16,
    pub body: String,
}

impl SoapResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }
}

/// Delivers one SOAP envelope. Timeouts belong to the implementation.
#[automock]
#[async_trait]
pub trait SoapTransport: Send + Sync + 'static {
    async fn post(
        &self,
        endpoint: &str,
        action: &str,
        envelope: String,
    ) -> Result<SoapResponse, ProtocolError>;
}

/// Sends `request`, attaching a fresh WS-Security header when a username is set.
pub async fn send(
    transport: &dyn SoapTransport,
    endpoint: &str,
    request: &OnvifRequest,
    credentials: Option<&Credentials>,
    clock_offset: Duration,
) -> Result<SoapResponse, ProtocolError> {
    let action = format!("{}/{}", request.namespace, request.operation);
    let envelope = build_envelope(&request.body, credentials, clock_offset)?;
    log::debug!("[{}] -> {}", request.operation, endpoint);
    let response = transport.post(endpoint, &action, envelope).await?;
    if response.status >= 400 {
        log_response(request.operation, endpoint, &response);
        return Err(match fault_reason(&response.body) {
            Some(reason) => ProtocolError::Fault {
                operation: request.operation.to_string(),
                reason,
            },
            None => ProtocolError::Http {
                operation: request.operation.to_string(),
                status: response.status,
            },
        });
    }
    Ok(response)
}

pub fn build_envelope(
    body: &str,
    credentials: Option<&Credentials>,
    clock_offset: Duration,
) -> Result<String, ProtocolError> {
    let header = match credentials {
        Some(credentials) if !credentials.username.is_empty() => {
            wsse::build_wsse_header(&credentials.username, &credentials.password, clock_offset)?
        }
        _ => String::new(),
    };
    Ok(format!(
        r#"<s:Envelope
  xmlns:s="http://www.w3.org/2003/05/soap-envelope">
{header}  <s:Body xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xsd="http://www.w3.org/2001/XMLSchema">
    {body}
  </s:Body>
</s:Envelope>
"#
    ))
}

/// Reason text of a SOAP 1.2 fault, if the body carries one.
pub fn fault_reason(body: &str) -> Option<String> {
    let doc = Document::parse(body).ok()?;
    let fault = doc
        .descendants()
        .find(|node| node.is_element() && node.tag_name().name() == "Fault")?;
    let reason = fault
        .descendants()
        .find(|node| node.is_element() && node.tag_name().name() == "Text")
        .or_else(|| {
            fault
                .descendants()
                .find(|node| node.is_element() && node.tag_name().name() == "faultstring")
        })
        .and_then(|node| node.text())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty());
    Some(reason.unwrap_or_else(|| "unspecified fault".to_string()))
}

pub fn log_response(operation: &str, endpoint: &str, response: &SoapResponse) {
    log::warn!(
        "[{}] {} returned HTTP {}: {}",
        operation,
        endpoint,
        response.status,
        response.body.trim()
    );
}

#[cfg(test)]
mod tests {
    mod success {
        use crate::camera::Credentials;
        use crate::onvif_requests;
        use crate::soap::{build_envelope, send, MockSoapTransport, SoapResponse};
        use time::Duration;

        #[test]
        fn anonymous_envelope_has_no_header() {
            let envelope = build_envelope("<GetProfiles/>", None, Duration::ZERO).unwrap();
            assert!(!envelope.contains("Security"));
            assert!(envelope.contains("<GetProfiles/>"));
        }

        #[test]
        fn empty_username_is_anonymous() {
            let credentials = Credentials::new("", "secret");
            let envelope = build_envelope("<Stop/>", Some(&credentials), Duration::ZERO).unwrap();
            assert!(!envelope.contains("UsernameToken"));
        }

        #[tokio::test]
        async fn attaches_fresh_token_per_call() {
            let mut transport = MockSoapTransport::new();
            let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
            let captured = seen.clone();
            transport
                .expect_post()
                .times(2)
                .returning(move |endpoint, action, envelope| {
                    assert_eq!(endpoint, "http://cam/onvif/device_service");
                    assert!(action.ends_with("/GetServices"));
                    captured.lock().unwrap().push(envelope);
                    Ok(SoapResponse::ok("<ok/>"))
                });
            let credentials = Credentials::new("admin", "secret");
            let request = onvif_requests::get_services();
            for _ in 0..2 {
                send(
                    &transport,
                    "http://cam/onvif/device_service",
                    &request,
                    Some(&credentials),
                    Duration::ZERO,
                )
                .await
                .unwrap();
            }
            let seen = seen.lock().unwrap();
            assert!(seen[0].contains("<Username>admin</Username>"));
            assert_ne!(seen[0], seen[1]);
        }
    }

    mod failure {
        use crate::error::ProtocolError;
        use crate::onvif_requests;
        use crate::soap::{fault_reason, send, MockSoapTransport, SoapResponse};
        use time::Duration;

        const FAULT: &str = r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"><s:Body><s:Fault><s:Code><s:Value>s:Sender</s:Value></s:Code><s:Reason><s:Text xml:lang="en">Sender not Authorized</s:Text></s:Reason></s:Fault></s:Body></s:Envelope>"#;

        #[test]
        fn extracts_fault_reason() {
            assert_eq!(fault_reason(FAULT).as_deref(), Some("Sender not Authorized"));
            assert_eq!(fault_reason("<ok/>"), None);
        }

        #[tokio::test]
        async fn fault_status_becomes_fault_error() {
            let mut transport = MockSoapTransport::new();
            transport.expect_post().returning(|_, _, _| {
                Ok(SoapResponse {
                    status: 400,
                    body: FAULT.to_string(),
                })
            });
            let result = send(
                &transport,
                "http://cam/onvif/ptz",
                &onvif_requests::get_presets("p0"),
                None,
                Duration::ZERO,
            )
            .await;
            match result {
                Err(ProtocolError::Fault { operation, reason }) => {
                    assert_eq!(operation, "GetPresets");
                    assert_eq!(reason, "Sender not Authorized");
                }
                other => panic!("unexpected result: {other:?}"),
            }
        }

        #[tokio::test]
        async fn plain_error_status_becomes_http_error() {
            let mut transport = MockSoapTransport::new();
            transport.expect_post().returning(|_, _, _| {
                Ok(SoapResponse {
                    status: 503,
                    body: String::new(),
                })
            });
            let result = send(
                &transport,
                "http://cam/onvif/media",
                &onvif_requests::get_profiles(),
                None,
                Duration::ZERO,
            )
            .await;
            assert!(matches!(
                result,
                Err(ProtocolError::Http { status: 503, .. })
            ));
        }
    }
}
