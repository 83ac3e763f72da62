use crate::onvif_stream_uri::{StreamType, TransportProtocol};
use crate::wsse::xml_escape;

pub const DEVICE_NS: &str = "http://www.onvif.org/ver10/device/wsdl";
pub const MEDIA_NS: &str = "http://www.onvif.org/ver10/media/wsdl";
pub const EVENTS_NS: &str = "http://www.onvif.org/ver10/events/wsdl";
pub const PTZ_NS: &str = "http://www.onvif.org/ver20/ptz/wsdl";
pub const TT_NS: &str = "http://www.onvif.org/ver10/schema";

pub const PAN_TILT_VELOCITY_SPACE: &str =
    "http://www.onvif.org/ver10/tptz/PanTiltSpaces/VelocityGenericSpace";
pub const ZOOM_VELOCITY_SPACE: &str =
    "http://www.onvif.org/ver10/tptz/ZoomSpaces/VelocityGenericSpace";

pub struct OnvifRequest {
    pub namespace: &'static str,
    pub operation: &'static str,
    pub body: String,
}

/// Device-scaled velocity; an axis left as `None` is omitted from the request.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PtzVelocityRequest {
    pub pan_tilt: Option<(f32, f32)>,
    pub zoom: Option<f32>,
}

#[derive(Clone, Copy, Default)]
pub struct PtzVelocitySpaces<'a> {
    pub pan_tilt: Option<&'a str>,
    pub zoom: Option<&'a str>,
}

pub fn get_system_date_and_time() -> OnvifRequest {
    build(
        DEVICE_NS,
        "GetSystemDateAndTime",
        format!(r#"<GetSystemDateAndTime xmlns="{}"/>"#, DEVICE_NS),
    )
}

pub fn get_services() -> OnvifRequest {
    build(
        DEVICE_NS,
        "GetServices",
        format!(
            r#"<GetServices xmlns="{}"><IncludeCapability>false</IncludeCapability></GetServices>"#,
            DEVICE_NS
        ),
    )
}

pub fn get_capabilities() -> OnvifRequest {
    build(
        DEVICE_NS,
        "GetCapabilities",
        format!(
            r#"<GetCapabilities xmlns="{}"><Category>All</Category></GetCapabilities>"#,
            DEVICE_NS
        ),
    )
}

pub fn get_profiles() -> OnvifRequest {
    build(
        MEDIA_NS,
        "GetProfiles",
        format!(r#"<GetProfiles xmlns="{}"/>"#, MEDIA_NS),
    )
}

pub fn get_stream_uri(
    profile: &str,
    stream_type: StreamType,
    protocol: TransportProtocol,
) -> OnvifRequest {
    build(
        MEDIA_NS,
        "GetStreamUri",
        format!(
            r#"<GetStreamUri xmlns="{ns}"><StreamSetup><Stream xmlns="{tt}">{stream}</Stream><Transport xmlns="{tt}"><Protocol>{protocol}</Protocol></Transport></StreamSetup><ProfileToken>{profile}</ProfileToken></GetStreamUri>"#,
            ns = MEDIA_NS,
            tt = TT_NS,
            stream = stream_type.as_ref(),
            protocol = protocol.as_ref(),
            profile = xml_escape(profile)
        ),
    )
}

pub fn get_configuration_options(token: &str) -> OnvifRequest {
    build(
        PTZ_NS,
        "GetConfigurationOptions",
        format!(
            r#"<GetConfigurationOptions xmlns="{0}"><ConfigurationToken>{1}</ConfigurationToken></GetConfigurationOptions>"#,
            PTZ_NS,
            xml_escape(token)
        ),
    )
}

pub fn continuous_move(
    profile: &str,
    velocity: PtzVelocityRequest,
    spaces: PtzVelocitySpaces<'_>,
) -> OnvifRequest {
    let mut elements = String::new();
    if let Some((pan, tilt)) = velocity.pan_tilt {
        let space = spaces.pan_tilt.unwrap_or(PAN_TILT_VELOCITY_SPACE);
        elements.push_str(&pan_tilt_element(pan, tilt, space));
    }
    if let Some(zoom) = velocity.zoom {
        let space = spaces.zoom.unwrap_or(ZOOM_VELOCITY_SPACE);
        elements.push_str(&zoom_element(zoom, space));
    }
    build(
        PTZ_NS,
        "ContinuousMove",
        format!(
            r#"<ContinuousMove xmlns="{ns}"><ProfileToken>{profile}</ProfileToken><Velocity>{elements}</Velocity></ContinuousMove>"#,
            ns = PTZ_NS,
            profile = xml_escape(profile),
            elements = elements
        ),
    )
}

pub fn stop(profile: &str, pan_tilt: bool, zoom: bool) -> OnvifRequest {
    build(
        PTZ_NS,
        "Stop",
        format!(
            r#"<Stop xmlns="{ns}"><ProfileToken>{profile}</ProfileToken><PanTilt>{pan_tilt}</PanTilt><Zoom>{zoom}</Zoom></Stop>"#,
            ns = PTZ_NS,
            profile = xml_escape(profile),
            pan_tilt = pan_tilt,
            zoom = zoom
        ),
    )
}

pub fn get_presets(profile: &str) -> OnvifRequest {
    build(
        PTZ_NS,
        "GetPresets",
        format!(
            r#"<GetPresets xmlns="{0}"><ProfileToken>{1}</ProfileToken></GetPresets>"#,
            PTZ_NS,
            xml_escape(profile)
        ),
    )
}

pub fn goto_preset(profile: &str, preset: &str) -> OnvifRequest {
    build(
        PTZ_NS,
        "GotoPreset",
        format!(
            r#"<GotoPreset xmlns="{0}"><ProfileToken>{1}</ProfileToken><PresetToken>{2}</PresetToken></GotoPreset>"#,
            PTZ_NS,
            xml_escape(profile),
            xml_escape(preset)
        ),
    )
}

pub fn get_status(profile: &str) -> OnvifRequest {
    build(
        PTZ_NS,
        "GetStatus",
        format!(
            r#"<GetStatus xmlns="{0}"><ProfileToken>{1}</ProfileToken></GetStatus>"#,
            PTZ_NS,
            xml_escape(profile)
        ),
    )
}

fn build(namespace: &'static str, operation: &'static str, body: String) -> OnvifRequest {
    OnvifRequest {
        namespace,
        operation,
        body,
    }
}

fn pan_tilt_element(pan: f32, tilt: f32, space: &str) -> String {
    format!(
        r#"<PanTilt x="{pan}" y="{tilt}" xmlns="{tt}" space="{space}"></PanTilt>"#,
        pan = format_float(pan),
        tilt = format_float(tilt),
        tt = TT_NS,
        space = space
    )
}

fn zoom_element(zoom: f32, space: &str) -> String {
    format!(
        r#"<Zoom x="{zoom}" xmlns="{tt}" space="{space}"></Zoom>"#,
        zoom = format_float(zoom),
        tt = TT_NS,
        space = space
    )
}

fn format_float(value: f32) -> String {
    let normalized = if value.abs() < f32::EPSILON {
        0.0
    } else {
        value
    };
    format!("{:.3}", normalized)
}
