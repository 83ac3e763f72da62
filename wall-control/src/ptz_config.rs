use crate::error::ProtocolError;
use roxmltree::{Document, Node};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AxisRange {
    pub min: f32,
    pub max: f32,
}

impl AxisRange {
    pub fn new(min: f32, max: f32) -> Self {
        let (min, max) = ordered_pair(min, max);
        Self { min, max }
    }

    pub fn clamp(self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    /// Maps a normalized [-1, 1] value onto the range; each sign uses its own bound.
    pub fn scale(self, value: f32) -> f32 {
        let scaled = if value < 0.0 {
            value * -self.min
        } else {
            value * self.max
        };
        self.clamp(scaled)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PanTiltRange {
    pub uri: Option<String>,
    pub x: AxisRange,
    pub y: AxisRange,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ZoomRange {
    pub uri: Option<String>,
    pub x: AxisRange,
}

/// Continuous velocity spaces reported by GetConfigurationOptions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VelocityLimits {
    pub pan_tilt: Option<PanTiltRange>,
    pub zoom: Option<ZoomRange>,
}

impl VelocityLimits {
    /// Maps normalized [-1, 1] pan/tilt onto the device's velocity space.
    pub fn scale_pan_tilt(&self, pan: f32, tilt: f32) -> (f32, f32) {
        match &self.pan_tilt {
            Some(range) => (range.x.scale(pan), range.y.scale(tilt)),
            None => (pan, tilt),
        }
    }

    pub fn scale_zoom(&self, zoom: f32) -> f32 {
        match &self.zoom {
            Some(range) => range.x.scale(zoom),
            None => zoom,
        }
    }

    pub fn pan_tilt_space(&self) -> Option<&str> {
        self.pan_tilt.as_ref().and_then(|range| range.uri.as_deref())
    }

    pub fn zoom_space(&self) -> Option<&str> {
        self.zoom.as_ref().and_then(|range| range.uri.as_deref())
    }
}

pub fn parse_velocity_limits(body: &str) -> Result<VelocityLimits, ProtocolError> {
    const OPERATION: &str = "GetConfigurationOptions";
    let doc = Document::parse(body)
        .map_err(|err| ProtocolError::malformed(OPERATION, format!("invalid XML: {err}")))?;
    let spaces = doc
        .descendants()
        .find(|node| has_tag(*node, "Spaces"))
        .ok_or_else(|| ProtocolError::malformed(OPERATION, "Spaces missing"))?;
    let mut limits = VelocityLimits::default();
    // Devices may list several spaces per kind; the first is the generic one.
    for space in spaces.children().filter(|node| node.is_element()) {
        match space.tag_name().name() {
            "ContinuousPanTiltVelocitySpace" if limits.pan_tilt.is_none() => {
                limits.pan_tilt = parse_pan_tilt_space(space);
            }
            "ContinuousZoomVelocitySpace" if limits.zoom.is_none() => {
                limits.zoom = parse_zoom_space(space);
            }
            _ => {}
        }
    }
    if limits.pan_tilt.is_none() && limits.zoom.is_none() {
        log::warn!("device reports no continuous velocity space; using normalized velocities");
    }
    Ok(limits)
}

fn parse_pan_tilt_space(space: Node) -> Option<PanTiltRange> {
    let uri = find_text(space, "URI");
    let x_range = space.descendants().find(|node| has_tag(*node, "XRange"))?;
    let y_range = space.descendants().find(|node| has_tag(*node, "YRange"))?;
    let x = parse_axis_range(x_range)?;
    let y = parse_axis_range(y_range)?;
    Some(PanTiltRange { uri, x, y })
}

fn parse_zoom_space(space: Node) -> Option<ZoomRange> {
    let uri = find_text(space, "URI");
    let x_range = space.descendants().find(|node| has_tag(*node, "XRange"))?;
    let x = parse_axis_range(x_range)?;
    Some(ZoomRange { uri, x })
}

fn parse_axis_range(range: Node) -> Option<AxisRange> {
    let min = parse_f32(find_text(range, "Min")?.as_str())?;
    let max = parse_f32(find_text(range, "Max")?.as_str())?;
    Some(AxisRange::new(min, max))
}

fn ordered_pair(a: f32, b: f32) -> (f32, f32) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn parse_f32(value: &str) -> Option<f32> {
    value.trim().parse::<f32>().ok()
}

fn find_text(node: Node, tag: &str) -> Option<String> {
    node.descendants()
        .find(|child| has_tag(*child, tag))
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn has_tag(node: Node, tag: &str) -> bool {
    node.is_element() && node.tag_name().name() == tag
}

#[cfg(test)]
pub(crate) const OPTIONS_BODY: &str = r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:tptz="http://www.onvif.org/ver20/ptz/wsdl" xmlns:tt="http://www.onvif.org/ver10/schema"><s:Body><tptz:GetConfigurationOptionsResponse><tptz:PTZConfigurationOptions><tt:Spaces>
<tt:AbsolutePanTiltPositionSpace><tt:URI>http://www.onvif.org/ver10/tptz/PanTiltSpaces/PositionGenericSpace</tt:URI><tt:XRange><tt:Min>-1</tt:Min><tt:Max>1</tt:Max></tt:XRange><tt:YRange><tt:Min>-1</tt:Min><tt:Max>1</tt:Max></tt:YRange></tt:AbsolutePanTiltPositionSpace>
<tt:ContinuousPanTiltVelocitySpace><tt:URI>http://www.onvif.org/ver10/tptz/PanTiltSpaces/VelocityGenericSpace</tt:URI><tt:XRange><tt:Min>-0.5</tt:Min><tt:Max>0.5</tt:Max></tt:XRange><tt:YRange><tt:Min>-0.25</tt:Min><tt:Max>0.25</tt:Max></tt:YRange></tt:ContinuousPanTiltVelocitySpace>
<tt:ContinuousZoomVelocitySpace><tt:URI>http://www.onvif.org/ver10/tptz/ZoomSpaces/VelocityGenericSpace</tt:URI><tt:XRange><tt:Min>-1</tt:Min><tt:Max>1</tt:Max></tt:XRange></tt:ContinuousZoomVelocitySpace>
</tt:Spaces></tptz:PTZConfigurationOptions></tptz:GetConfigurationOptionsResponse></s:Body></s:Envelope>"#;
