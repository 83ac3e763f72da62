use crate::camera::{insert_userinfo, Credentials, DeviceSession};
use crate::error::ProtocolError;
use crate::onvif_profiles::{self, MediaProfile};
use crate::onvif_requests::{self, OnvifRequest, DEVICE_NS};
use crate::onvif_services::{self, ServiceEndpointMap};
use crate::onvif_stream_uri::{self, StreamType, TransportProtocol};
use crate::soap::{self, SoapResponse, SoapTransport};
use crate::time_sync;
use std::sync::Arc;
use strum::IntoEnumIterator;
use time::Duration;

pub const DEVICE_SERVICE_PATH: &str = "/onvif/device_service";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStream {
    pub profile: MediaProfile,
    pub unicast_uri: String,
    pub multicast_uri: Option<String>,
    pub ptz_available: bool,
}

impl ResolvedStream {
    /// Multicast when requested and available, unicast otherwise.
    pub fn uri_for(&self, stream_type: StreamType) -> &str {
        match (stream_type, &self.multicast_uri) {
            (StreamType::RtpMulticast, Some(uri)) => uri,
            _ => &self.unicast_uri,
        }
    }
}

#[derive(Clone)]
pub struct OnvifClient {
    transport: Arc<dyn SoapTransport>,
    device_endpoint: String,
    credentials: Option<Credentials>,
    clock_offset: Duration,
    services: ServiceEndpointMap,
}

impl OnvifClient {
    pub fn new(
        transport: Arc<dyn SoapTransport>,
        address: &str,
        port: u16,
        credentials: Option<Credentials>,
    ) -> Self {
        Self {
            transport,
            device_endpoint: format!("http://{}:{}{}", address, port, DEVICE_SERVICE_PATH),
            credentials,
            clock_offset: Duration::ZERO,
            services: ServiceEndpointMap::default(),
        }
    }

    /// Rebuilds a connected client from cached state without contacting the device.
    pub fn from_session(
        transport: Arc<dyn SoapTransport>,
        address: &str,
        port: u16,
        credentials: Option<Credentials>,
        session: &DeviceSession,
    ) -> Self {
        let mut client = Self::new(transport, address, port, credentials);
        client.clock_offset = session.clock_offset;
        client.services = session.services.clone();
        client
    }

    pub fn device_endpoint(&self) -> &str {
        &self.device_endpoint
    }

    pub fn services(&self) -> &ServiceEndpointMap {
        &self.services
    }

    pub fn clock_offset(&self) -> Duration {
        self.clock_offset
    }

    pub fn ptz_endpoint(&self) -> Option<&str> {
        self.services.ptz()
    }

    pub async fn synchronize_clock(&mut self) -> Result<Duration, ProtocolError> {
        match time_sync::measure_offset(self.transport.as_ref(), &self.device_endpoint).await {
            Ok(offset) => {
                self.clock_offset = offset;
                Ok(offset)
            }
            Err(err @ (ProtocolError::Unreachable { .. } | ProtocolError::Transport { .. })) => {
                Err(err)
            }
            Err(err) => {
                log::warn!(
                    "{}: clock not synchronized ({err}); authenticating with local time",
                    self.device_endpoint
                );
                self.clock_offset = Duration::ZERO;
                Ok(Duration::ZERO)
            }
        }
    }

    pub async fn discover_services(&mut self) -> Result<&ServiceEndpointMap, ProtocolError> {
        let mut services = ServiceEndpointMap::default();
        let mut last_error = None;
        match self.send_device(&onvif_requests::get_services()).await {
            Ok(response) => services = onvif_services::parse_services(&response.body),
            Err(err) => {
                log::debug!("{}: GetServices failed: {err}", self.device_endpoint);
                last_error = Some(err);
            }
        }
        if services.media().is_none() || services.ptz().is_none() {
            match self.send_device(&onvif_requests::get_capabilities()).await {
                Ok(response) => {
                    services.merge_missing(onvif_services::parse_capabilities(&response.body))
                }
                Err(err) => {
                    log::debug!("{}: GetCapabilities failed: {err}", self.device_endpoint);
                    if services.is_empty() {
                        return Err(last_error.unwrap_or(err));
                    }
                }
            }
        }
        if !services.contains(DEVICE_NS) {
            services.insert(DEVICE_NS, self.device_endpoint.clone());
        }
        if services.ptz().is_none() {
            log::info!("{}: no PTZ service advertised", self.device_endpoint);
        }
        self.services = services;
        Ok(&self.services)
    }

    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        self.synchronize_clock().await?;
        self.discover_services().await?;
        Ok(())
    }

    pub async fn profiles(&self) -> Result<Vec<MediaProfile>, ProtocolError> {
        let response = self.send_media(&onvif_requests::get_profiles()).await?;
        onvif_profiles::extract_profiles(&response.body)
    }

    pub async fn stream_uri(
        &self,
        profile_token: &str,
        stream_type: StreamType,
        protocol: TransportProtocol,
    ) -> Result<String, ProtocolError> {
        let request = onvif_requests::get_stream_uri(profile_token, stream_type, protocol);
        let response = self.send_media(&request).await?;
        let uri = onvif_stream_uri::extract_uri(&response.body)?;
        self.with_credentials(&uri)
    }

    /// Profile at the 1-based `stream_index`, its stream URIs and PTZ availability.
    pub async fn resolve_stream(
        &self,
        stream_index: u32,
        protocol: TransportProtocol,
        stream_type: StreamType,
    ) -> Result<ResolvedStream, ProtocolError> {
        let profiles = self.profiles().await?;
        let profile = onvif_profiles::select(&profiles, stream_index)?.clone();
        let unicast_uri = self
            .stream_uri(&profile.token, StreamType::RtpUnicast, protocol)
            .await?;
        let multicast_uri = self.find_multicast(&profile.token).await;
        if stream_type == StreamType::RtpMulticast && multicast_uri.is_none() {
            log::warn!(
                "{}: no multicast URI for profile {}; falling back to unicast",
                self.device_endpoint,
                profile.token
            );
        }
        let ptz_available = match (self.services.ptz().is_some(), profile.has_ptz()) {
            (true, true) => true,
            (true, false) => {
                log::info!(
                    "{}: profile {} has no PTZ configuration; PTZ disabled",
                    self.device_endpoint,
                    profile.token
                );
                false
            }
            _ => false,
        };
        Ok(ResolvedStream {
            profile,
            unicast_uri,
            multicast_uri,
            ptz_available,
        })
    }

    async fn find_multicast(&self, profile_token: &str) -> Option<String> {
        for protocol in TransportProtocol::iter() {
            match self
                .stream_uri(profile_token, StreamType::RtpMulticast, protocol)
                .await
            {
                Ok(uri) => return Some(uri),
                Err(err) => log::debug!(
                    "{}: multicast over {} unavailable: {err}",
                    self.device_endpoint,
                    protocol.as_ref()
                ),
            }
        }
        None
    }

    pub fn session(&self, resolved: &ResolvedStream) -> DeviceSession {
        DeviceSession {
            services: self.services.clone(),
            clock_offset: self.clock_offset,
            profile: resolved.profile.clone(),
            unicast_uri: resolved.unicast_uri.clone(),
            multicast_uri: resolved.multicast_uri.clone(),
            ptz_available: resolved.ptz_available,
        }
    }

    fn with_credentials(&self, uri: &str) -> Result<String, ProtocolError> {
        match &self.credentials {
            Some(credentials) if credentials.is_complete() => {
                insert_userinfo(uri, &credentials.username, &credentials.password)
            }
            _ => Ok(uri.to_string()),
        }
    }

    pub async fn send_device(&self, request: &OnvifRequest) -> Result<SoapResponse, ProtocolError> {
        self.send_to(&self.device_endpoint, request).await
    }

    pub async fn send_media(&self, request: &OnvifRequest) -> Result<SoapResponse, ProtocolError> {
        let endpoint = self
            .services
            .media()
            .ok_or(ProtocolError::ServiceMissing("media"))?;
        self.send_to(endpoint, request).await
    }

    pub async fn send_ptz(&self, request: &OnvifRequest) -> Result<SoapResponse, ProtocolError> {
        let endpoint = self
            .services
            .ptz()
            .ok_or(ProtocolError::ServiceMissing("PTZ"))?;
        self.send_to(endpoint, request).await
    }

    async fn send_to(&self, endpoint: &str, request: &OnvifRequest) -> Result<SoapResponse, ProtocolError> {
        soap::send(
            self.transport.as_ref(),
            endpoint,
            request,
            self.credentials.as_ref(),
            self.clock_offset,
        )
        .await
    }
}
