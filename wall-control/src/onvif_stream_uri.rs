use crate::error::ProtocolError;
use roxmltree::Document;
use serde::Deserialize;
use strum::{AsRefStr, EnumIter, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString, EnumIter, Deserialize)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    #[strum(serialize = "UDP")]
    Udp,
    #[strum(serialize = "TCP")]
    Tcp,
    #[strum(serialize = "RTSP")]
    Rtsp,
    #[strum(serialize = "HTTP")]
    Http,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString, Deserialize)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    #[strum(serialize = "RTP-Unicast")]
    RtpUnicast,
    #[strum(serialize = "RTP-Multicast")]
    RtpMulticast,
}

pub fn extract_uri(body: &str) -> Result<String, ProtocolError> {
    let doc = Document::parse(body)
        .map_err(|err| ProtocolError::malformed("GetStreamUri", format!("invalid XML: {err}")))?;
    doc.descendants()
        .find(|node| node.has_tag_name("Uri"))
        .and_then(|node| node.text())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| ProtocolError::malformed("GetStreamUri", "stream URI not found"))
}

#[cfg(test)]
pub(crate) fn stream_uri_body(uri: &str) -> String {
    format!(
        r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:trt="http://www.onvif.org/ver10/media/wsdl" xmlns:tt="http://www.onvif.org/ver10/schema"><s:Body><trt:GetStreamUriResponse><trt:MediaUri><tt:Uri>{uri}</tt:Uri><tt:InvalidAfterConnect>false</tt:InvalidAfterConnect></trt:MediaUri></trt:GetStreamUriResponse></s:Body></s:Envelope>"#
    )
}
