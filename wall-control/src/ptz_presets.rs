use crate::error::{ProtocolError, PtzError};
use roxmltree::Document;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preset {
    pub token: String,
    pub name: Option<String>,
}

pub fn parse_presets(body: &str) -> Result<Vec<Preset>, ProtocolError> {
    let doc = Document::parse(body)
        .map_err(|err| ProtocolError::malformed("GetPresets", format!("invalid XML: {err}")))?;
    let presets = doc
        .descendants()
        .filter(|node| node.is_element() && node.tag_name().name() == "Preset")
        .filter_map(|node| {
            let token = node.attribute("token")?.to_string();
            let name = node
                .children()
                .find(|child| child.has_tag_name("Name"))
                .and_then(|child| child.text())
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty());
            Some(Preset { token, name })
        })
        .collect();
    Ok(presets)
}

/// 1-based lookup in device order.
pub fn select(presets: &[Preset], number: u32) -> Result<&Preset, PtzError> {
    let out_of_range = || PtzError::IndexOutOfRange {
        requested: number,
        available: presets.len(),
    };
    let position = (number as usize).checked_sub(1).ok_or_else(out_of_range)?;
    presets.get(position).ok_or_else(out_of_range)
}

#[cfg(test)]
pub(crate) fn presets_body(count: usize) -> String {
    let presets: String = (1..=count)
        .map(|n| format!(r#"<tptz:Preset token="{n}"><tt:Name>Preset {n}</tt:Name></tptz:Preset>"#))
        .collect();
    format!(
        r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:tptz="http://www.onvif.org/ver20/ptz/wsdl" xmlns:tt="http://www.onvif.org/ver10/schema"><s:Body><tptz:GetPresetsResponse>{presets}</tptz:GetPresetsResponse></s:Body></s:Envelope>"#
    )
}
