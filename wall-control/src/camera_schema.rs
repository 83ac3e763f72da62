use crate::error::ConfigurationError;
use roxmltree::{Document, Node};
use std::path::Path;

const CAMERA_ELEMENT: &str = "camera";

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text,
    Integer { min: Option<i64> },
    Enumeration(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
    pub name: String,
    pub required: bool,
    pub kind: FieldKind,
}

/// Subset of XSD describing the children of one `<camera>` element.
#[derive(Debug, Clone)]
pub struct CameraSchema {
    fields: Vec<FieldRule>,
}

impl CameraSchema {
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_at(&text, path)
    }

    pub fn parse(xsd: &str) -> Result<Self, ConfigurationError> {
        Self::parse_at(xsd, Path::new("<memory>"))
    }

    fn parse_at(xsd: &str, path: &Path) -> Result<Self, ConfigurationError> {
        let doc = Document::parse(xsd).map_err(|source| ConfigurationError::Xml {
            path: path.to_path_buf(),
            source,
        })?;
        let camera = doc
            .descendants()
            .find(|node| has_tag(*node, "element") && node.attribute("name") == Some(CAMERA_ELEMENT))
            .ok_or_else(|| {
                ConfigurationError::Schema("no `camera` element declared".to_string())
            })?;
        let group = camera
            .descendants()
            .find(|node| has_tag(*node, "sequence") || has_tag(*node, "all"))
            .ok_or_else(|| {
                ConfigurationError::Schema("`camera` declares no child sequence".to_string())
            })?;

        let mut fields = Vec::new();
        for element in group.children().filter(|node| has_tag(*node, "element")) {
            let name = element.attribute("name").ok_or_else(|| {
                ConfigurationError::Schema("child element without a name".to_string())
            })?;
            let required = element
                .attribute("minOccurs")
                .map(|value| value.trim() != "0")
                .unwrap_or(true);
            let kind = field_kind(&doc, element)?;
            fields.push(FieldRule {
                name: name.to_string(),
                required,
                kind,
            });
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[FieldRule] {
        &self.fields
    }

    /// Every violation found in one `<camera>` element. Empty means valid.
    pub fn validate(&self, camera: Node) -> Vec<String> {
        let mut violations = Vec::new();
        for child in camera.children().filter(Node::is_element) {
            let name = child.tag_name().name();
            if !self.fields.iter().any(|rule| rule.name == name) {
                violations.push(format!("unexpected element <{name}>"));
            }
        }
        for rule in &self.fields {
            let Some(child) = camera
                .children()
                .find(|node| has_tag(*node, &rule.name))
            else {
                if rule.required {
                    violations.push(format!("missing required element <{}>", rule.name));
                }
                continue;
            };
            let value = child.text().map(str::trim).unwrap_or_default();
            if let Some(reason) = check_value(&rule.kind, value) {
                violations.push(format!("<{}> {}", rule.name, reason));
            }
        }
        violations
    }
}

fn field_kind(doc: &Document, element: Node) -> Result<FieldKind, ConfigurationError> {
    if let Some(type_name) = element.attribute("type") {
        let local = local_name(type_name);
        if let Some(kind) = builtin_kind(local) {
            return Ok(kind);
        }
        let named = doc
            .descendants()
            .find(|node| has_tag(*node, "simpleType") && node.attribute("name") == Some(local))
            .ok_or_else(|| ConfigurationError::Schema(format!("unknown type `{type_name}`")))?;
        return restriction_kind(named);
    }
    match element.children().find(|node| has_tag(*node, "simpleType")) {
        Some(simple) => restriction_kind(simple),
        None => Ok(FieldKind::Text),
    }
}

fn restriction_kind(simple: Node) -> Result<FieldKind, ConfigurationError> {
    let restriction = simple
        .children()
        .find(|node| has_tag(*node, "restriction"))
        .ok_or_else(|| ConfigurationError::Schema("simpleType without restriction".to_string()))?;
    let values: Vec<String> = restriction
        .children()
        .filter(|node| has_tag(*node, "enumeration"))
        .filter_map(|node| node.attribute("value").map(str::to_string))
        .collect();
    if !values.is_empty() {
        return Ok(FieldKind::Enumeration(values));
    }
    let base = restriction.attribute("base").map(local_name).unwrap_or("string");
    Ok(builtin_kind(base).unwrap_or(FieldKind::Text))
}

fn builtin_kind(name: &str) -> Option<FieldKind> {
    match name {
        "string" | "normalizedString" | "token" | "anyURI" => Some(FieldKind::Text),
        "int" | "integer" | "short" | "long" => Some(FieldKind::Integer { min: None }),
        "nonNegativeInteger" | "unsignedInt" => Some(FieldKind::Integer { min: Some(0) }),
        "positiveInteger" => Some(FieldKind::Integer { min: Some(1) }),
        _ => None,
    }
}

fn check_value(kind: &FieldKind, value: &str) -> Option<String> {
    match kind {
        FieldKind::Text => None,
        FieldKind::Integer { min } => match value.parse::<i64>() {
            Ok(number) => match min {
                Some(min) if number < *min => Some(format!("value {number} is below {min}")),
                _ => None,
            },
            Err(_) => Some(format!("value '{value}' is not an integer")),
        },
        FieldKind::Enumeration(values) => {
            if values.iter().any(|allowed| allowed == value) {
                None
            } else {
                Some(format!("value '{value}' is not one of {}", values.join(", ")))
            }
        }
    }
}

fn local_name(qualified: &str) -> &str {
    qualified.rsplit(':').next().unwrap_or(qualified)
}

fn has_tag(node: Node, tag: &str) -> bool {
    node.is_element() && node.tag_name().name() == tag
}

#[cfg(test)]
pub(crate) const TEST_SCHEMA: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:simpleType name="streamType">
    <xs:restriction base="xs:string"/>
  </xs:simpleType>
  <xs:element name="cameras">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="camera" maxOccurs="unbounded">
          <xs:complexType>
            <xs:sequence>
              <xs:element name="number" type="xs:positiveInteger"/>
              <xs:element name="ip" type="xs:string"/>
              <xs:element name="stream" type="streamType"/>
              <xs:element name="device" type="xs:nonNegativeInteger"/>
              <xs:element name="manufacturer" minOccurs="0">
                <xs:simpleType>
                  <xs:restriction base="xs:string">
                    <xs:enumeration value="Bosch"/>
                    <xs:enumeration value="Axis"/>
                    <xs:enumeration value="Pelco"/>
                    <xs:enumeration value="Samsung"/>
                  </xs:restriction>
                </xs:simpleType>
              </xs:element>
              <xs:element name="username" type="xs:string" minOccurs="0"/>
              <xs:element name="password" type="xs:string" minOccurs="0"/>
            </xs:sequence>
          </xs:complexType>
        </xs:element>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
</xs:schema>
"#;
