// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Messages exchanged through a connection.
//!
//! A [`Message`] is a subject, a [`MessageKind`] and an ordered set of named
//! fields. Middleware adapters decide how the fields travel on the wire; the
//! bolt adapter packs them into the packet body.

use std::collections::BTreeMap;
use std::fmt;

/// Role of a message in the pub/sub and request/reply patterns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Publish,
    Request,
    Reply,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageKind::Publish => "PUBLISH",
            MessageKind::Request => "REQUEST",
            MessageKind::Reply => "REPLY",
        };
        write!(f, "{}", s)
    }
}

/// Typed field value.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    String(String),
    I32(i32),
    F64(f64),
    Bool(bool),
    Binary(Vec<u8>),
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::I32(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::F64(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(v: Vec<u8>) -> Self {
        FieldValue::Binary(v)
    }
}

/// A subject-addressed message with named fields.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    subject: String,
    kind: MessageKind,
    fields: BTreeMap<String, FieldValue>,
}

impl Message {
    pub fn new(subject: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            subject: subject.into(),
            kind,
            fields: BTreeMap::new(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn set_subject(&mut self, subject: impl Into<String>) {
        self.subject = subject.into();
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: MessageKind) {
        self.kind = kind;
    }

    /// Add or replace a field. Returns true if a field was replaced.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> bool {
        self.fields.insert(name.into(), value.into()).is_some()
    }

    /// Builder-style [`Message::set_field`].
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set_field(name, value);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn clear_field(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// String view of a field; numeric and boolean fields are formatted.
    pub fn string_value(&self, name: &str) -> Option<String> {
        match self.fields.get(name)? {
            FieldValue::String(s) => Some(s.clone()),
            FieldValue::I32(v) => Some(v.to_string()),
            FieldValue::F64(v) => Some(v.to_string()),
            FieldValue::Bool(v) => Some(v.to_string()),
            FieldValue::Binary(_) => None,
        }
    }

    /// Integer view of a field; string fields are parsed.
    pub fn i32_value(&self, name: &str) -> Option<i32> {
        match self.fields.get(name)? {
            FieldValue::I32(v) => Some(*v),
            FieldValue::String(s) => s.trim().parse().ok(),
            FieldValue::Bool(v) => Some(i32::from(*v)),
            FieldValue::F64(v) => Some(*v as i32),
            FieldValue::Binary(_) => None,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} [", self.kind, self.subject)?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match value {
                FieldValue::Binary(b) => write!(f, "{}=<{} bytes>", name, b.len())?,
                FieldValue::String(s) => write!(f, "{}=\"{}\"", name, s)?,
                FieldValue::I32(v) => write!(f, "{}={}", name, v)?,
                FieldValue::F64(v) => write!(f, "{}={}", name, v)?,
                FieldValue::Bool(v) => write!(f, "{}={}", name, v)?,
            }
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_replace_and_clear() {
        let mut msg = Message::new("GMSEC.TEST.PUB", MessageKind::Publish);
        assert!(!msg.set_field("COUNT", 1));
        assert!(msg.set_field("COUNT", 2));
        assert_eq!(msg.i32_value("COUNT"), Some(2));
        assert_eq!(msg.clear_field("COUNT"), Some(FieldValue::I32(2)));
        assert_eq!(msg.field_count(), 0);
    }

    #[test]
    fn test_value_conversions() {
        let msg = Message::new("A.B", MessageKind::Request)
            .with_field("S", "17")
            .with_field("F", true)
            .with_field("BIN", vec![1u8, 2, 3]);
        assert_eq!(msg.i32_value("S"), Some(17));
        assert_eq!(msg.string_value("F").as_deref(), Some("true"));
        assert_eq!(msg.string_value("BIN"), None);
        assert!(msg.to_string().contains("BIN=<3 bytes>"));
    }
}
