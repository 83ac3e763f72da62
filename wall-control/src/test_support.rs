use crate::error::ProtocolError;
use crate::onvif_profiles::{self, MediaProfile};
use crate::onvif_services::services_body;
use crate::onvif_stream_uri::stream_uri_body;
use crate::ptz_config::OPTIONS_BODY;
use crate::ptz_presets::presets_body;
use crate::soap::{SoapResponse, SoapTransport};
use crate::time_sync::date_time_body;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use time::{Duration, OffsetDateTime};

const CAPABILITIES_BODY: &str = r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:tt="http://www.onvif.org/ver10/schema"><s:Body><GetCapabilitiesResponse><tt:Capabilities><tt:Media><tt:XAddr>http://10.0.0.5/onvif/media_service</tt:XAddr></tt:Media><tt:PTZ><tt:XAddr>http://10.0.0.5/onvif/ptz_service</tt:XAddr></tt:PTZ></tt:Capabilities></GetCapabilitiesResponse></s:Body></s:Envelope>"#;

const STATUS_BODY: &str = r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:tt="http://www.onvif.org/ver10/schema"><s:Body><GetStatusResponse><PTZStatus><tt:Position><tt:PanTilt x="0.25" y="-0.5"/><tt:Zoom x="0.5"/></tt:Position><tt:MoveStatus><tt:PanTilt>IDLE</tt:PanTilt><tt:Zoom>IDLE</tt:Zoom></tt:MoveStatus></PTZStatus></GetStatusResponse></s:Body></s:Envelope>"#;

const FAULT_BODY: &str = r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"><s:Body><s:Fault><s:Reason><s:Text>Action failed</s:Text></s:Reason></s:Fault></s:Body></s:Envelope>"#;

/// In-process ONVIF device answering from canned responses and recording every call.
pub(crate) struct FakeCamera {
    ptz: bool,
    reachable: bool,
    services_fail: bool,
    clock_skew: Duration,
    delays: HashMap<String, std::time::Duration>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeCamera {
    pub(crate) fn new() -> Self {
        Self {
            ptz: true,
            reachable: true,
            services_fail: false,
            clock_skew: Duration::ZERO,
            delays: HashMap::new(),
            failing: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn without_ptz(mut self) -> Self {
        self.ptz = false;
        self
    }

    pub(crate) fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    pub(crate) fn with_services_failing(mut self) -> Self {
        self.services_fail = true;
        self
    }

    pub(crate) fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    /// Holds every ContinuousMove for `delay` before answering.
    pub(crate) fn with_move_delay(self, delay: std::time::Duration) -> Self {
        self.with_delay("ContinuousMove", delay)
    }

    pub(crate) fn with_delay(mut self, operation: &str, delay: std::time::Duration) -> Self {
        self.delays.insert(operation.to_string(), delay);
        self
    }

    pub(crate) fn fail(&self, operation: &str) {
        self.failing.lock().unwrap().insert(operation.to_string());
    }

    pub(crate) fn recover(&self, operation: &str) {
        self.failing.lock().unwrap().remove(operation);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(operation, _)| operation.clone())
            .collect()
    }

    pub(crate) fn count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == operation)
            .count()
    }

    pub(crate) fn last_body(&self, operation: &str) -> Option<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(name, _)| name == operation)
            .map(|(_, envelope)| envelope.clone())
    }

    pub(crate) fn main_profile() -> MediaProfile {
        onvif_profiles::extract_profiles(onvif_profiles::PROFILES_BODY)
            .unwrap()
            .remove(0)
    }

    fn respond(&self, operation: &str, envelope: &str) -> Option<String> {
        let body = match operation {
            "GetSystemDateAndTime" => date_time_body(OffsetDateTime::now_utc() + self.clock_skew),
            "GetServices" if self.services_fail => return None,
            "GetServices" => services_body(self.ptz),
            "GetCapabilities" => CAPABILITIES_BODY.to_string(),
            "GetProfiles" => onvif_profiles::PROFILES_BODY.to_string(),
            "GetStreamUri" if envelope.contains("RTP-Multicast") => {
                if !envelope.contains("<Protocol>RTSP</Protocol>") {
                    return None;
                }
                stream_uri_body("rtsp://239.0.0.5:554/multicast")
            }
            "GetStreamUri" => {
                let stream = if envelope.contains("<ProfileToken>sub</ProfileToken>") {
                    2
                } else {
                    1
                };
                stream_uri_body(&format!("rtsp://10.0.0.5:554/stream{stream}"))
            }
            "GetConfigurationOptions" => OPTIONS_BODY.to_string(),
            "GetPresets" => presets_body(3),
            "GetStatus" => STATUS_BODY.to_string(),
            "ContinuousMove" | "Stop" | "GotoPreset" => "<s:Envelope/>".to_string(),
            _ => return None,
        };
        Some(body)
    }
}

#[async_trait]
impl SoapTransport for FakeCamera {
    async fn post(
        &self,
        endpoint: &str,
        action: &str,
        envelope: String,
    ) -> Result<SoapResponse, ProtocolError> {
        if !self.reachable {
            return Err(ProtocolError::Unreachable {
                endpoint: endpoint.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        let operation = action.rsplit('/').next().unwrap_or(action).to_string();
        if let Some(delay) = self.delays.get(&operation) {
            tokio::time::sleep(*delay).await;
        }
        self.calls
            .lock()
            .unwrap()
            .push((operation.clone(), envelope.clone()));
        if self.failing.lock().unwrap().contains(&operation) {
            return Ok(SoapResponse {
                status: 500,
                body: FAULT_BODY.to_string(),
            });
        }
        Ok(match self.respond(&operation, &envelope) {
            Some(body) => SoapResponse::ok(body),
            None => SoapResponse {
                status: 400,
                body: FAULT_BODY.to_string(),
            },
        })
    }
}
