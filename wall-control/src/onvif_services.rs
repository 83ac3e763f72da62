use crate::onvif_requests::{DEVICE_NS, EVENTS_NS, MEDIA_NS, PTZ_NS};
use roxmltree::{Document, Node};
use std::collections::HashMap;

/// Service namespace to XAddr, as advertised by one device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceEndpointMap {
    endpoints: HashMap<String, String>,
}

impl ServiceEndpointMap {
    pub fn insert(&mut self, namespace: &str, xaddr: impl Into<String>) {
        self.endpoints.insert(namespace.to_string(), xaddr.into());
    }

    pub fn get(&self, namespace: &str) -> Option<&str> {
        self.endpoints.get(namespace).map(String::as_str)
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.endpoints.contains_key(namespace)
    }

    pub fn device(&self) -> Option<&str> {
        self.get(DEVICE_NS)
    }

    pub fn media(&self) -> Option<&str> {
        self.get(MEDIA_NS)
    }

    pub fn events(&self) -> Option<&str> {
        self.get(EVENTS_NS)
    }

    pub fn ptz(&self) -> Option<&str> {
        self.get(PTZ_NS)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Fills namespaces this map lacks from `other`.
    pub fn merge_missing(&mut self, other: ServiceEndpointMap) {
        for (namespace, xaddr) in other.endpoints {
            self.endpoints.entry(namespace).or_insert(xaddr);
        }
    }
}

pub fn parse_services(body: &str) -> ServiceEndpointMap {
    let mut map = ServiceEndpointMap::default();
    let Ok(doc) = Document::parse(body) else {
        return map;
    };
    for service in doc.descendants().filter(|node| has_tag(*node, "Service")) {
        if let (Some(namespace), Some(xaddr)) =
            (child_text(service, "Namespace"), child_text(service, "XAddr"))
        {
            map.insert(&namespace, xaddr);
        }
    }
    map
}

/// GetCapabilities only reports the well-known categories.
pub fn parse_capabilities(body: &str) -> ServiceEndpointMap {
    let mut map = ServiceEndpointMap::default();
    let Ok(doc) = Document::parse(body) else {
        return map;
    };
    for (category, namespace) in [
        ("Device", DEVICE_NS),
        ("Media", MEDIA_NS),
        ("Events", EVENTS_NS),
        ("PTZ", PTZ_NS),
    ] {
        let xaddr = doc
            .descendants()
            .find(|node| has_tag(*node, category))
            .and_then(|node| child_text(node, "XAddr"));
        if let Some(xaddr) = xaddr {
            map.insert(namespace, xaddr);
        }
    }
    map
}

fn child_text(node: Node, name: &str) -> Option<String> {
    node.children()
        .find(|child| has_tag(*child, name))
        .and_then(|child| child.text())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn has_tag(node: Node, tag: &str) -> bool {
    node.is_element() && node.tag_name().name() == tag
}

#[cfg(test)]
pub(crate) fn services_body(ptz: bool) -> String {
    let ptz_service = if ptz {
        r#"<tds:Service><tds:Namespace>http://www.onvif.org/ver20/ptz/wsdl</tds:Namespace><tds:XAddr>http://10.0.0.5/onvif/ptz_service</tds:XAddr></tds:Service>"#
    } else {
        ""
    };
    format!(
        r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:tds="http://www.onvif.org/ver10/device/wsdl"><s:Body><tds:GetServicesResponse><tds:Service><tds:Namespace>http://www.onvif.org/ver10/device/wsdl</tds:Namespace><tds:XAddr>http://10.0.0.5/onvif/device_service</tds:XAddr></tds:Service><tds:Service><tds:Namespace>http://www.onvif.org/ver10/media/wsdl</tds:Namespace><tds:XAddr>http://10.0.0.5/onvif/media_service</tds:XAddr></tds:Service>{ptz_service}</tds:GetServicesResponse></s:Body></s:Envelope>"#
    )
}
