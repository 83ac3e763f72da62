use std::collections::HashMap;
use std::fmt;
use strum::{Display, EnumString};
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl TagValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Non-empty textual content, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) if !text.trim().is_empty() => Some(text.trim()),
            _ => None,
        }
    }

    pub fn is_true(&self) -> bool {
        self.as_bool() == Some(true)
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum Quality {
    #[default]
    Good,
    Uncertain,
    Bad,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagRecord {
    pub name: String,
    pub value: TagValue,
    pub quality: Quality,
    /// Time of the last value change.
    pub timestamp: OffsetDateTime,
    pub ack: bool,
}

/// Local copy of the subscribed tags. Entries are added or updated, never removed.
#[derive(Debug, Default)]
pub struct TagMirror {
    records: HashMap<String, TagRecord>,
}

impl TagMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the value and returns the one it replaced.
    pub fn update(
        &mut self,
        name: &str,
        value: TagValue,
        quality: Quality,
        at: OffsetDateTime,
    ) -> Option<TagValue> {
        match self.records.get_mut(name) {
            Some(record) => {
                let previous = std::mem::replace(&mut record.value, value);
                record.quality = quality;
                if previous != record.value {
                    record.timestamp = at;
                    record.ack = false;
                }
                Some(previous)
            }
            None => {
                self.records.insert(
                    name.to_string(),
                    TagRecord {
                        name: name.to_string(),
                        value,
                        quality,
                        timestamp: at,
                        ack: false,
                    },
                );
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&TagRecord> {
        self.records.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&TagValue> {
        self.records.get(name).map(|record| &record.value)
    }

    pub fn acknowledge(&mut self, name: &str) -> bool {
        match self.records.get_mut(name) {
            Some(record) => {
                record.ack = true;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
