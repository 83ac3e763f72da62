use crate::error::ProtocolError;
use crate::onvif_profiles::MediaProfile;
use crate::onvif_services::ServiceEndpointMap;
use crate::onvif_stream_uri::StreamType;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use strum::EnumString;
use url::Url;

pub const RTSP_PORT: u16 = 554;
const BOSCH_CODEC: u32 = 4;

#[derive(Debug, Clone, PartialEq, Eq, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum Manufacturer {
    Bosch,
    Axis,
    Pelco,
    Samsung,
    #[strum(default)]
    Other(String),
}

impl Manufacturer {
    pub fn parse(name: &str) -> Self {
        let name = name.trim();
        Manufacturer::from_str(name).unwrap_or_else(|_| Manufacturer::Other(name.to_string()))
    }
}

impl fmt::Display for Manufacturer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Manufacturer::Bosch => f.write_str("Bosch"),
            Manufacturer::Axis => f.write_str("Axis"),
            Manufacturer::Pelco => f.write_str("Pelco"),
            Manufacturer::Samsung => f.write_str("Samsung"),
            Manufacturer::Other(name) => f.write_str(name),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Both parts present; only then are credentials embedded in a stream URI.
    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    pub fn has_reserved_chars(&self) -> bool {
        let reserved = |value: &str| value.contains(':') || value.contains('@');
        reserved(&self.username) || reserved(&self.password)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Device-side state cached on a camera after a successful resolution.
#[derive(Debug, Clone)]
pub struct DeviceSession {
    pub services: ServiceEndpointMap,
    pub clock_offset: time::Duration,
    pub profile: MediaProfile,
    pub unicast_uri: String,
    pub multicast_uri: Option<String>,
    pub ptz_available: bool,
}

impl DeviceSession {
    /// Multicast when requested and resolved, unicast otherwise.
    pub fn uri_for(&self, stream_type: StreamType) -> &str {
        match (stream_type, &self.multicast_uri) {
            (StreamType::RtpMulticast, Some(uri)) => uri,
            _ => &self.unicast_uri,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CameraRecord {
    number: u32,
    ip: String,
    manufacturer: Manufacturer,
    stream: u32,
    device: u32,
    credentials: Option<Credentials>,
    session: Option<DeviceSession>,
    available: bool,
    discovery_failed: Option<Instant>,
}

impl CameraRecord {
    pub fn new(
        number: u32,
        ip: impl Into<String>,
        manufacturer: Manufacturer,
        stream: u32,
        device: u32,
    ) -> Self {
        Self {
            number,
            ip: ip.into(),
            manufacturer,
            stream,
            device,
            credentials: None,
            session: None,
            available: true,
            discovery_failed: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn manufacturer(&self) -> &Manufacturer {
        &self.manufacturer
    }

    pub fn stream(&self) -> u32 {
        self.stream
    }

    pub fn device(&self) -> u32 {
        self.device
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn session(&self) -> Option<&DeviceSession> {
        self.session.as_ref()
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub(crate) fn set_session(&mut self, session: DeviceSession) {
        self.session = Some(session);
        self.available = true;
        self.discovery_failed = None;
    }

    pub(crate) fn note_discovery_failure(&mut self) {
        self.discovery_failed = Some(Instant::now());
    }

    /// True while a failed discovery is younger than `window`.
    pub fn discovery_backoff(&self, window: Duration) -> bool {
        self.discovery_failed
            .is_some_and(|failed| failed.elapsed() < window)
    }

    pub(crate) fn mark_unavailable(&mut self) {
        self.available = false;
    }

    /// Manufacturer-specific RTSP address for this camera.
    pub fn stream_uri(&self) -> Result<String, ProtocolError> {
        let base = match &self.manufacturer {
            Manufacturer::Bosch => format!(
                "rtsp://{}:{}/?h26x={}&line={}&inst={}",
                self.ip, RTSP_PORT, BOSCH_CODEC, self.device, self.stream
            ),
            Manufacturer::Axis => format!("rtsp://{}:{}/onvif-media/media.amp", self.ip, RTSP_PORT),
            // Pelco never receives credentials in the URI.
            Manufacturer::Pelco => {
                return Ok(format!("rtsp://{}:{}/stream{}", self.ip, RTSP_PORT, self.stream))
            }
            Manufacturer::Samsung => format!(
                "rtsp://{}:{}/onvif/profile{}/media.smp",
                self.ip, RTSP_PORT, self.stream
            ),
            Manufacturer::Other(name) => {
                return Err(ProtocolError::UnsupportedManufacturer(name.clone()))
            }
        };
        match self.credentials.as_ref().filter(|c| c.is_complete()) {
            Some(credentials) => {
                insert_userinfo(&base, &credentials.username, &credentials.password)
            }
            None => Ok(base),
        }
    }
}

impl fmt::Display for CameraRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Camera # {} ({}, Stream {}, Device Index {}, Manufacturer {})",
            self.number, self.ip, self.stream, self.device, self.manufacturer
        )
    }
}

/// Writes `user:pass@` into the authority of `uri`, percent-encoding reserved characters.
pub fn insert_userinfo(uri: &str, username: &str, password: &str) -> Result<String, ProtocolError> {
    let invalid = |reason: &str| ProtocolError::InvalidUri {
        uri: uri.to_string(),
        reason: reason.to_string(),
    };
    let mut url = Url::parse(uri).map_err(|err| invalid(&err.to_string()))?;
    url.set_username(username)
        .map_err(|_| invalid("uri cannot carry a username"))?;
    if !password.is_empty() {
        url.set_password(Some(password))
            .map_err(|_| invalid("uri cannot carry a password"))?;
    }
    Ok(url.into())
}
