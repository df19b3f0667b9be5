use crate::amqp::message::{DeliveryMode, Headers, Properties, PropertyValue, APPLICATION_HEADERS};
use crate::{Error, Result};
use lapin::types::{AMQPValue, FieldArray, FieldTable, LongString, ShortString};
use lapin::BasicProperties;
use serde_json::Value;

/// Encodes a property set into AMQP basic properties.
///
/// Unknown property names are rejected rather than silently dropped.
pub fn to_basic_properties(properties: &Properties) -> Result<BasicProperties> {
    let mut props = BasicProperties::default();

    for (name, value) in properties {
        props = match name.as_str() {
            "content_type" => props.with_content_type(short_string(name, value)?),
            "content_encoding" => props.with_content_encoding(short_string(name, value)?),
            "delivery_mode" => props.with_delivery_mode(delivery_mode(name, value)?.as_u8()),
            "priority" => props.with_priority(octet(name, value)?),
            "correlation_id" => props.with_correlation_id(short_string(name, value)?),
            "reply_to" => props.with_reply_to(short_string(name, value)?),
            "expiration" => props.with_expiration(short_string(name, value)?),
            "message_id" => props.with_message_id(short_string(name, value)?),
            "timestamp" => props.with_timestamp(timestamp(name, value)?),
            "type" => props.with_type(short_string(name, value)?),
            "user_id" => props.with_user_id(short_string(name, value)?),
            "app_id" => props.with_app_id(short_string(name, value)?),
            "cluster_id" => props.with_cluster_id(short_string(name, value)?),
            APPLICATION_HEADERS => props.with_headers(header_table(name, value)?),
            _ => {
                return Err(Error::Encoding {
                    property: name.clone(),
                    message: "unknown AMQP basic property".to_string(),
                })
            }
        };
    }

    Ok(props)
}

/// Converts a header mapping into an AMQP field table.
///
/// `name` is the property or argument set the table belongs to and is used
/// to report keys that cannot be encoded.
pub fn to_field_table(name: &str, headers: &Headers) -> Result<FieldTable> {
    let mut table = FieldTable::default();
    for (key, value) in headers {
        table.insert(field_name(name, key)?, to_amqp_value(name, value)?);
    }
    Ok(table)
}

fn field_name(name: &str, key: &str) -> Result<ShortString> {
    if key.len() > 255 {
        return Err(Error::Encoding {
            property: name.to_string(),
            message: format!(
                "field name '{}...' exceeds 255 bytes",
                key.chars().take(32).collect::<String>()
            ),
        });
    }
    Ok(ShortString::from(key.to_string()))
}

fn to_amqp_value(name: &str, value: &Value) -> Result<AMQPValue> {
    let value = match value {
        Value::Null => AMQPValue::Void,
        Value::Bool(b) => AMQPValue::Boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                AMQPValue::LongLongInt(i)
            } else if n.is_u64() {
                return Err(Error::Encoding {
                    property: name.to_string(),
                    message: format!("integer {} does not fit a signed 64-bit field", n),
                });
            } else {
                AMQPValue::Double(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => AMQPValue::LongString(LongString::from(s.clone())),
        Value::Array(items) => AMQPValue::FieldArray(FieldArray::from(
            items
                .iter()
                .map(|item| to_amqp_value(name, item))
                .collect::<Result<Vec<_>>>()?,
        )),
        Value::Object(map) => {
            let mut table = FieldTable::default();
            for (key, value) in map {
                table.insert(field_name(name, key)?, to_amqp_value(name, value)?);
            }
            AMQPValue::FieldTable(table)
        }
    };
    Ok(value)
}

fn invalid(name: &str, message: &str) -> Error {
    Error::Encoding {
        property: name.to_string(),
        message: message.to_string(),
    }
}

fn short_string(name: &str, value: &PropertyValue) -> Result<ShortString> {
    let text = match value {
        PropertyValue::Value(Value::String(s)) => s.clone(),
        PropertyValue::Value(Value::Number(n)) => n.to_string(),
        PropertyValue::DeliveryMode(mode) => mode.to_string(),
        _ => return Err(invalid(name, "expected a string")),
    };
    if text.len() > 255 {
        return Err(invalid(name, "short strings are limited to 255 bytes"));
    }
    Ok(ShortString::from(text))
}

fn delivery_mode(name: &str, value: &PropertyValue) -> Result<DeliveryMode> {
    match value {
        PropertyValue::DeliveryMode(mode) => Ok(*mode),
        PropertyValue::Value(v) => DeliveryMode::from_value(v)
            .ok_or_else(|| invalid(name, "expected 1, 2, \"transient\" or \"persistent\"")),
        PropertyValue::Table(_) => Err(invalid(name, "expected a delivery mode")),
    }
}

fn octet(name: &str, value: &PropertyValue) -> Result<u8> {
    match value {
        PropertyValue::Value(Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u8::try_from(n).ok())
            .ok_or_else(|| invalid(name, "expected an integer between 0 and 255")),
        _ => Err(invalid(name, "expected an integer between 0 and 255")),
    }
}

fn timestamp(name: &str, value: &PropertyValue) -> Result<u64> {
    match value {
        PropertyValue::Value(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| invalid(name, "expected a non-negative unix timestamp")),
        _ => Err(invalid(name, "expected a non-negative unix timestamp")),
    }
}

fn header_table(name: &str, value: &PropertyValue) -> Result<FieldTable> {
    match value {
        PropertyValue::Table(headers) => to_field_table(name, headers),
        PropertyValue::Value(Value::Object(map)) => {
            let headers: Headers = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            to_field_table(name, &headers)
        }
        _ => Err(invalid(name, "expected a header table")),
    }
}
