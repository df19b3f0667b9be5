//! Outbound message representation.
//!
//! A [`Message`] is a body plus a property set. Properties are keyed by their
//! AMQP names (`content_type`, `delivery_mode`, `priority`, ...). Headers are
//! not flattened into the property set: they live in a single
//! `application_headers` entry holding a typed table.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Property name of the header table.
pub const APPLICATION_HEADERS: &str = "application_headers";

/// Caller-supplied properties, as passed to `publish`.
pub type PropertyMap = BTreeMap<String, Value>;

/// Message headers, encoded as one `application_headers` table.
pub type Headers = BTreeMap<String, Value>;

/// Durability hint for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Held in memory only; lost if the broker restarts.
    Transient,
    /// Written to disk by the broker when routed to a durable queue.
    #[default]
    Persistent,
}

impl DeliveryMode {
    /// The numeric value used on the wire.
    pub fn as_u8(self) -> u8 {
        match self {
            DeliveryMode::Transient => 1,
            DeliveryMode::Persistent => 2,
        }
    }

    /// Interprets a loosely typed property value: `1`/`2` or the mode name.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => match n.as_u64()? {
                1 => Some(DeliveryMode::Transient),
                2 => Some(DeliveryMode::Persistent),
                _ => None,
            },
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryMode::Transient => write!(f, "transient"),
            DeliveryMode::Persistent => write!(f, "persistent"),
        }
    }
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "transient" | "1" => Ok(DeliveryMode::Transient),
            "persistent" | "2" => Ok(DeliveryMode::Persistent),
            other => Err(format!("unknown delivery mode '{}'", other)),
        }
    }
}

/// A single value in a message property set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Plain value, as configured or as supplied by the caller.
    Value(Value),
    /// Durability level taken from the producer configuration.
    DeliveryMode(DeliveryMode),
    /// Typed header table; only ever stored under `application_headers`.
    Table(Headers),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Value(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Headers> {
        match self {
            PropertyValue::Table(table) => Some(table),
            _ => None,
        }
    }
}

impl From<Value> for PropertyValue {
    fn from(value: Value) -> Self {
        PropertyValue::Value(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Value(Value::String(value.to_string()))
    }
}

impl From<DeliveryMode> for PropertyValue {
    fn from(mode: DeliveryMode) -> Self {
        PropertyValue::DeliveryMode(mode)
    }
}

/// Property set of an assembled message.
pub type Properties = BTreeMap<String, PropertyValue>;

/// The outbound unit handed to a transport. Built fresh for every publish.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    body: Bytes,
    properties: Properties,
}

impl Message {
    pub fn new(body: impl Into<Bytes>, properties: Properties) -> Self {
        Self {
            body: body.into(),
            properties,
        }
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// Sets a property, replacing any previous value under the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties.insert(name.into(), value.into());
    }

    /// Attaches `headers` as the `application_headers` table.
    pub fn set_headers(&mut self, headers: Headers) {
        self.properties
            .insert(APPLICATION_HEADERS.to_string(), PropertyValue::Table(headers));
    }

    /// Returns the header table if one is attached.
    pub fn headers(&self) -> Option<&Headers> {
        self.get(APPLICATION_HEADERS).and_then(PropertyValue::as_table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_delivery_mode_parsing() {
        assert_eq!("persistent".parse::<DeliveryMode>(), Ok(DeliveryMode::Persistent));
        assert_eq!("Transient".parse::<DeliveryMode>(), Ok(DeliveryMode::Transient));
        assert_eq!("2".parse::<DeliveryMode>(), Ok(DeliveryMode::Persistent));
        assert!("durable".parse::<DeliveryMode>().is_err());

        assert_eq!(DeliveryMode::from_value(&json!(1)), Some(DeliveryMode::Transient));
        assert_eq!(
            DeliveryMode::from_value(&json!("persistent")),
            Some(DeliveryMode::Persistent)
        );
        assert_eq!(DeliveryMode::from_value(&json!(3)), None);
        assert_eq!(DeliveryMode::from_value(&json!(true)), None);
    }

    #[test]
    fn test_delivery_mode_wire_values() {
        assert_eq!(DeliveryMode::Transient.as_u8(), 1);
        assert_eq!(DeliveryMode::Persistent.as_u8(), 2);
        assert_eq!(DeliveryMode::default(), DeliveryMode::Persistent);
    }

    #[test]
    fn test_headers_live_in_single_table() {
        let mut message = Message::new("hello", Properties::new());
        assert!(message.headers().is_none());

        let mut headers = Headers::new();
        headers.insert("x-tenant".to_string(), json!("acme"));
        headers.insert("x-retries".to_string(), json!(0));
        message.set_headers(headers.clone());

        assert_eq!(message.headers(), Some(&headers));
        assert!(message.get("x-tenant").is_none());
        assert_eq!(message.properties().len(), 1);
    }

    #[test]
    fn test_property_value_serializes_flat() {
        let mut props = Properties::new();
        props.insert("content_type".to_string(), "text/plain".into());
        props.insert("delivery_mode".to_string(), DeliveryMode::Persistent.into());
        props.insert("priority".to_string(), json!(5).into());

        let encoded = serde_json::to_value(&props).unwrap();
        assert_eq!(
            encoded,
            json!({
                "content_type": "text/plain",
                "delivery_mode": "persistent",
                "priority": 5
            })
        );
    }
}
