use crate::error::ProtocolError;
use roxmltree::Document;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaProfile {
    pub token: String,
    pub name: Option<String>,
    pub video_source: Option<String>,
    pub video_encoder: Option<String>,
    pub ptz_config: Option<String>,
    pub resolution: Option<(u32, u32)>,
}

impl MediaProfile {
    pub fn has_ptz(&self) -> bool {
        self.ptz_config.is_some()
    }
}

/// Selects the profile for a 1-based stream index.
pub fn select(profiles: &[MediaProfile], stream_index: u32) -> Result<&MediaProfile, ProtocolError> {
    let out_of_range = ProtocolError::ProfileOutOfRange {
        index: stream_index,
        available: profiles.len(),
    };
    let Some(position) = (stream_index as usize).checked_sub(1) else {
        return Err(out_of_range);
    };
    profiles.get(position).ok_or(out_of_range)
}

pub fn extract_profiles(body: &str) -> Result<Vec<MediaProfile>, ProtocolError> {
    let doc = Document::parse(body)
        .map_err(|err| ProtocolError::malformed("GetProfiles", format!("invalid XML: {err}")))?;
    let mut profiles = Vec::new();
    for profile in doc
        .descendants()
        .filter(|node| node.is_element() && node.tag_name().name() == "Profiles")
    {
        let token = match profile.attribute("token") {
            Some(token) => token.to_string(),
            None => {
                log::warn!("GetProfiles profile token missing");
                continue;
            }
        };
        let find_text = |tag: &str| {
            profile
                .children()
                .find(|node| node.has_tag_name(tag))
                .and_then(|node| node.text())
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty())
        };
        let find_token = |tag: &str| {
            profile
                .descendants()
                .find(|node| node.has_tag_name(tag))
                .and_then(|node| node.attribute("token"))
                .map(str::to_string)
        };
        let resolution = profile
            .descendants()
            .find(|node| node.has_tag_name("VideoEncoderConfiguration"))
            .and_then(|encoder| {
                let width = encoder
                    .descendants()
                    .find(|n| n.has_tag_name("Width"))?
                    .text()?;
                let height = encoder
                    .descendants()
                    .find(|n| n.has_tag_name("Height"))?
                    .text()?;
                let width = width.trim().parse::<u32>().ok()?;
                let height = height.trim().parse::<u32>().ok()?;
                Some((width, height))
            });
        profiles.push(MediaProfile {
            token,
            name: find_text("Name"),
            video_source: find_token("VideoSourceConfiguration"),
            video_encoder: find_token("VideoEncoderConfiguration"),
            ptz_config: find_token("PTZConfiguration"),
            resolution,
        });
    }
    if profiles.is_empty() {
        return Err(ProtocolError::malformed("GetProfiles", "no profiles in response"));
    }
    log_profiles(&profiles);
    Ok(profiles)
}

fn log_profiles(profiles: &[MediaProfile]) {
    log::debug!("[GetProfiles] profiles={}", profiles.len());
    for (index, profile) in profiles.iter().enumerate() {
        let resolution = profile
            .resolution
            .map(|(width, height)| format!("{width}x{height}"))
            .unwrap_or_else(|| "-".to_string());
        log::debug!(
            "  [{}] token={} name={} ptz_config={} resolution={}",
            index,
            profile.token,
            profile.name.as_deref().unwrap_or("-"),
            profile.ptz_config.as_deref().unwrap_or("-"),
            resolution
        );
    }
}

#[cfg(test)]
pub(crate) const PROFILES_BODY: &str = r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:trt="http://www.onvif.org/ver10/media/wsdl" xmlns:tt="http://www.onvif.org/ver10/schema"><s:Body><trt:GetProfilesResponse>
<trt:Profiles token="main" fixed="true"><tt:Name>MainStream</tt:Name><tt:VideoSourceConfiguration token="vsc0"/><tt:VideoEncoderConfiguration token="vec0"><tt:Resolution><tt:Width>1920</tt:Width><tt:Height>1080</tt:Height></tt:Resolution></tt:VideoEncoderConfiguration><tt:PTZConfiguration token="ptz0"><tt:Name>PTZ</tt:Name></tt:PTZConfiguration></trt:Profiles>
<trt:Profiles token="sub" fixed="true"><tt:Name>SubStream</tt:Name><tt:VideoEncoderConfiguration token="vec1"><tt:Resolution><tt:Width>640</tt:Width><tt:Height>360</tt:Height></tt:Resolution></tt:VideoEncoderConfiguration></trt:Profiles>
</trt:GetProfilesResponse></s:Body></s:Envelope>"#;
