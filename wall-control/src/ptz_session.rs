use crate::error::{ProtocolError, PtzError};
use crate::onvif_client::OnvifClient;
use crate::onvif_profiles::MediaProfile;
use crate::onvif_requests::{self, PtzVelocityRequest, PtzVelocitySpaces};
use crate::ptz_config::{self, VelocityLimits};
use crate::ptz_presets::{self, Preset};
use roxmltree::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Idle,
    Moving,
}

/// Normalized PTZ request; velocities are in [-1, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PtzCommand {
    Pan(f32),
    Tilt(f32),
    PanTilt(f32, f32),
    Zoom(f32),
    Stop,
    ShowPreset(u32),
}

impl PtzCommand {
    /// Continuous gestures may be dropped under load; stops and presets may not.
    pub fn is_gesture(&self) -> bool {
        matches!(
            self,
            PtzCommand::Pan(_) | PtzCommand::Tilt(_) | PtzCommand::PanTilt(..) | PtzCommand::Zoom(_)
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PtzStatus {
    pub pan: Option<f32>,
    pub tilt: Option<f32>,
    pub zoom: Option<f32>,
    pub pan_tilt_move: Option<String>,
    pub zoom_move: Option<String>,
}

pub struct PtzSession {
    client: OnvifClient,
    profile: MediaProfile,
    config_token: String,
    limits: Option<VelocityLimits>,
    motion: Motion,
}

impl PtzSession {
    pub fn new(client: OnvifClient, profile: MediaProfile) -> Result<Self, PtzError> {
        if client.ptz_endpoint().is_none() {
            return Err(PtzError::Unavailable(format!(
                "{} exposes no PTZ service",
                client.device_endpoint()
            )));
        }
        let config_token = profile.ptz_config.clone().ok_or_else(|| {
            PtzError::Unavailable(format!("profile {} has no PTZ configuration", profile.token))
        })?;
        Ok(Self {
            client,
            profile,
            config_token,
            limits: None,
            motion: Motion::Idle,
        })
    }

    pub fn motion(&self) -> Motion {
        self.motion
    }

    pub fn profile(&self) -> &MediaProfile {
        &self.profile
    }

    pub async fn execute(&mut self, command: PtzCommand) -> Result<(), PtzError> {
        match command {
            PtzCommand::Pan(velocity) => self.pan(velocity).await,
            PtzCommand::Tilt(velocity) => self.tilt(velocity).await,
            PtzCommand::PanTilt(pan, tilt) => self.pan_tilt(pan, tilt).await,
            PtzCommand::Zoom(velocity) => self.zoom(velocity).await,
            PtzCommand::Stop => self.stop().await,
            PtzCommand::ShowPreset(number) => self.show_preset(number).await,
        }
    }

    pub async fn pan(&mut self, velocity: f32) -> Result<(), PtzError> {
        self.pan_tilt(velocity, 0.0).await
    }

    pub async fn tilt(&mut self, velocity: f32) -> Result<(), PtzError> {
        self.pan_tilt(0.0, velocity).await
    }

    pub async fn pan_tilt(&mut self, pan: f32, tilt: f32) -> Result<(), PtzError> {
        let pan = normalize(pan)?;
        let tilt = normalize(tilt)?;
        if pan == 0.0 && tilt == 0.0 {
            return self.stop().await;
        }
        let limits = self.velocity_limits().await?;
        let velocity = PtzVelocityRequest {
            pan_tilt: Some(limits.scale_pan_tilt(pan, tilt)),
            zoom: None,
        };
        let spaces = PtzVelocitySpaces {
            pan_tilt: limits.pan_tilt_space(),
            zoom: None,
        };
        let request = onvif_requests::continuous_move(&self.profile.token, velocity, spaces);
        self.client.send_ptz(&request).await?;
        self.motion = Motion::Moving;
        Ok(())
    }

    pub async fn zoom(&mut self, velocity: f32) -> Result<(), PtzError> {
        let zoom = normalize(velocity)?;
        if zoom == 0.0 {
            return self.stop().await;
        }
        let limits = self.velocity_limits().await?;
        let velocity = PtzVelocityRequest {
            pan_tilt: None,
            zoom: Some(limits.scale_zoom(zoom)),
        };
        let spaces = PtzVelocitySpaces {
            pan_tilt: None,
            zoom: limits.zoom_space(),
        };
        let request = onvif_requests::continuous_move(&self.profile.token, velocity, spaces);
        self.client.send_ptz(&request).await?;
        self.motion = Motion::Moving;
        Ok(())
    }

    /// Sent even when already idle.
    pub async fn stop(&mut self) -> Result<(), PtzError> {
        let request = onvif_requests::stop(&self.profile.token, true, true);
        self.client.send_ptz(&request).await?;
        self.motion = Motion::Idle;
        Ok(())
    }

    /// Fetched from the device on every call.
    pub async fn presets(&self) -> Result<Vec<Preset>, PtzError> {
        let request = onvif_requests::get_presets(&self.profile.token);
        let response = self.client.send_ptz(&request).await?;
        Ok(ptz_presets::parse_presets(&response.body)?)
    }

    pub async fn show_preset(&mut self, number: u32) -> Result<(), PtzError> {
        let presets = self.presets().await?;
        let preset = ptz_presets::select(&presets, number)?;
        log::info!(
            "profile {}: going to preset {} (token {})",
            self.profile.token,
            number,
            preset.token
        );
        let request = onvif_requests::goto_preset(&self.profile.token, &preset.token);
        self.client.send_ptz(&request).await?;
        self.motion = Motion::Idle;
        Ok(())
    }

    pub async fn status(&self) -> Result<PtzStatus, PtzError> {
        let request = onvif_requests::get_status(&self.profile.token);
        let response = self.client.send_ptz(&request).await?;
        Ok(parse_status(&response.body)?)
    }

    async fn velocity_limits(&mut self) -> Result<VelocityLimits, PtzError> {
        if let Some(limits) = &self.limits {
            return Ok(limits.clone());
        }
        let request = onvif_requests::get_configuration_options(&self.config_token);
        let response = self.client.send_ptz(&request).await?;
        let limits = ptz_config::parse_velocity_limits(&response.body)?;
        self.limits = Some(limits.clone());
        Ok(limits)
    }
}

fn normalize(velocity: f32) -> Result<f32, PtzError> {
    if !velocity.is_finite() {
        return Err(PtzError::InvalidVelocity(velocity));
    }
    Ok(velocity.clamp(-1.0, 1.0))
}

pub fn parse_status(body: &str) -> Result<PtzStatus, ProtocolError> {
    let doc = Document::parse(body).map_err(|err| {
        ProtocolError::malformed("GetStatus", format!("invalid XML: {err}"))
    })?;
    let mut status = PtzStatus::default();
    let attr = |node: roxmltree::Node, name: &str| {
        node.attribute(name).and_then(|value| value.trim().parse::<f32>().ok())
    };
    if let Some(position) = doc.descendants().find(|node| node.has_tag_name("Position")) {
        if let Some(pan_tilt) = position.children().find(|node| node.has_tag_name("PanTilt")) {
            status.pan = attr(pan_tilt, "x");
            status.tilt = attr(pan_tilt, "y");
        }
        if let Some(zoom) = position.children().find(|node| node.has_tag_name("Zoom")) {
            status.zoom = attr(zoom, "x");
        }
    }
    if let Some(moves) = doc.descendants().find(|node| node.has_tag_name("MoveStatus")) {
        let text = |tag: &str| {
            moves
                .children()
                .find(|node| node.has_tag_name(tag))
                .and_then(|node| node.text())
                .map(|text| text.trim().to_string())
        };
        status.pan_tilt_move = text("PanTilt");
        status.zoom_move = text("Zoom");
    }
    Ok(status)
}

/// Scans every profile for the first with a PTZ configuration.
#[deprecated(note = "sessions must be built from the profile selected during discovery")]
pub async fn first_ptz_profile(client: &OnvifClient) -> Result<MediaProfile, PtzError> {
    let profiles = client.profiles().await?;
    profiles
        .into_iter()
        .find(MediaProfile::has_ptz)
        .ok_or_else(|| PtzError::Unavailable("no profile carries a PTZ configuration".to_string()))
}
