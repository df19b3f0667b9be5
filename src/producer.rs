//! The publish pipeline.
//!
//! [`Producer::publish`] runs a fixed sequence of steps, each gating the next:
//!
//! 1. validation, when a validator is installed
//! 2. fabric setup, once per producer while auto-setup is enabled
//! 3. message assembly: base properties, caller properties, header table
//! 4. routing-key resolution
//! 5. dispatch through the [`Transport`]
//! 6. a `debug` record of what the caller asked for
//!
//! A failed step stops the pipeline. Validation failures happen before any
//! broker interaction; transport failures are returned as-is, without retry.
//!
//! # Example
//!
//! ```rust,no_run
//! use amqp_producer::amqp::{LapinFabric, LapinTransport, PropertyMap};
//! use amqp_producer::config::ExchangeOptions;
//! use amqp_producer::Producer;
//! use lapin::{Connection, ConnectionProperties};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connection =
//!         Connection::connect("amqp://localhost:5672/%2f", ConnectionProperties::default()).await?;
//!     let channel = connection.create_channel().await?;
//!
//!     let exchange = ExchangeOptions::new("orders");
//!     let fabric = LapinFabric::new(channel.clone(), exchange.clone(), None);
//!     let mut producer = Producer::new(&exchange.name, LapinTransport::new(channel), fabric);
//!     producer
//!         .set_content_type("application/json")
//!         .set_default_routing_key("orders.created");
//!
//!     producer
//!         .publish(r#"{"id": 1}"#, None, &PropertyMap::new(), None)
//!         .await?;
//!     Ok(())
//! }
//! ```

use crate::amqp::{
    DeliveryMode, FabricSetup, Headers, Message, Properties, PropertyMap, PropertyValue, Transport,
};
use crate::config::ProducerConfig;
use crate::validator::SchemaValidator;
use crate::{Error, Result};
use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, instrument};

/// Publishes messages to one exchange.
///
/// A producer owns its configuration, its optional validator and the flag
/// recording whether the fabric has been declared. It is not meant to be
/// shared between concurrent callers: publishing takes `&mut self`.
pub struct Producer<T, F> {
    exchange: String,
    config: ProducerConfig,
    validator: Option<Box<dyn SchemaValidator>>,
    transport: T,
    fabric: F,
    fabric_declared: bool,
}

impl<T, F> Producer<T, F>
where
    T: Transport,
    F: FabricSetup,
{
    pub fn new(exchange: impl Into<String>, transport: T, fabric: F) -> Self {
        Self {
            exchange: exchange.into(),
            config: ProducerConfig::default(),
            validator: None,
            transport,
            fabric,
            fabric_declared: false,
        }
    }

    /// Replaces the whole configuration.
    pub fn with_config(mut self, config: ProducerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn fabric(&self) -> &F {
        &self.fabric
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) -> &mut Self {
        self.config.content_type = content_type.into();
        self
    }

    pub fn set_delivery_mode(&mut self, delivery_mode: DeliveryMode) -> &mut Self {
        self.config.delivery_mode = delivery_mode;
        self
    }

    pub fn set_default_routing_key(&mut self, routing_key: impl Into<String>) -> &mut Self {
        self.config.default_routing_key = routing_key.into();
        self
    }

    pub fn enable_auto_setup_fabric(&mut self) -> &mut Self {
        self.config.auto_setup_fabric = true;
        self
    }

    pub fn disable_auto_setup_fabric(&mut self) -> &mut Self {
        self.config.auto_setup_fabric = false;
        self
    }

    /// Installs a validator built by `factory` from `schema` and `definitions`.
    ///
    /// Any previously installed validator is dropped; schemas are never
    /// combined. If the factory fails, the previous validator stays in place.
    pub fn set_validator<V, B>(
        &mut self,
        factory: B,
        schema: Value,
        definitions: Value,
    ) -> Result<&mut Self>
    where
        V: SchemaValidator + 'static,
        B: FnOnce(Value, Value) -> Result<V>,
    {
        let validator = factory(schema, definitions)?;
        debug!(
            content_type = validator.content_type(),
            "Installed message validator"
        );
        self.validator = Some(Box::new(validator));
        Ok(self)
    }

    pub fn validator(&self) -> Option<&dyn SchemaValidator> {
        self.validator.as_deref()
    }

    pub fn is_fabric_declared(&self) -> bool {
        self.fabric_declared
    }

    /// Declares the fabric unless this producer already did.
    pub async fn ensure_fabric(&mut self) -> Result<()> {
        if self.fabric_declared {
            return Ok(());
        }
        self.setup_fabric().await
    }

    /// Declares the fabric even if it was declared before.
    pub async fn setup_fabric(&mut self) -> Result<()> {
        self.fabric.declare().await?;
        self.fabric_declared = true;
        debug!(exchange = %self.exchange, "Fabric declared");
        Ok(())
    }

    /// Forgets that the fabric was declared, so the next publish with
    /// auto-setup enabled declares it again.
    pub fn reset_fabric(&mut self) {
        self.fabric_declared = false;
    }

    /// Runs the installed validator against `body`.
    ///
    /// The configured content type must match the validator's before the body
    /// itself is looked at. Without a validator every body is accepted.
    pub fn validate_message(&self, body: &[u8]) -> Result<()> {
        let Some(validator) = &self.validator else {
            return Ok(());
        };

        if self.config.content_type != validator.content_type() {
            return Err(Error::Validation(format!(
                "Content type mismatch. Incoming message is of type {}. Expected type was {}",
                self.config.content_type,
                validator.content_type()
            )));
        }

        validator.validate(body).map_err(|error| {
            Error::Validation(format!(
                "{} message verification failed. Error was: {}",
                self.config.content_type, error
            ))
        })
    }

    /// Properties every message starts from: content type and delivery mode.
    pub fn basic_properties(&self) -> Properties {
        let mut properties = Properties::new();
        properties.insert(
            "content_type".to_string(),
            PropertyValue::from(Value::String(self.config.content_type.clone())),
        );
        properties.insert(
            "delivery_mode".to_string(),
            PropertyValue::DeliveryMode(self.config.delivery_mode),
        );
        properties
    }

    /// Assembles the outbound message.
    ///
    /// Caller properties override the base properties key by key. A non-empty
    /// `headers` map becomes the `application_headers` table and replaces any
    /// `application_headers` entry given in `additional_properties`.
    pub fn build_message(
        &self,
        body: impl Into<Bytes>,
        additional_properties: &PropertyMap,
        headers: Option<&Headers>,
    ) -> Message {
        let mut properties = self.basic_properties();
        for (name, value) in additional_properties {
            properties.insert(name.clone(), PropertyValue::from(value.clone()));
        }

        let mut message = Message::new(body, properties);
        if let Some(headers) = headers.filter(|h| !h.is_empty()) {
            message.set_headers(headers.clone());
        }
        message
    }

    /// An explicit routing key, even an empty one, wins over the default.
    pub fn resolve_routing_key<'a>(&'a self, routing_key: Option<&'a str>) -> &'a str {
        routing_key.unwrap_or(&self.config.default_routing_key)
    }

    /// Validates, assembles and sends one message.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if a validator is installed and rejects the
    ///   message; the fabric is not touched and nothing is sent.
    /// - Any error from fabric setup or from the transport, unchanged.
    #[instrument(skip_all, fields(exchange = %self.exchange))]
    pub async fn publish(
        &mut self,
        body: impl Into<Bytes>,
        routing_key: Option<&str>,
        additional_properties: &PropertyMap,
        headers: Option<&Headers>,
    ) -> Result<()> {
        let body: Bytes = body.into();

        self.validate_message(&body)?;

        if self.config.auto_setup_fabric {
            self.ensure_fabric().await?;
        }

        let message = self.build_message(body.clone(), additional_properties, headers);
        let resolved = self.resolve_routing_key(routing_key);

        self.transport
            .send(&message, &self.exchange, resolved)
            .await?;

        debug!(
            body = %String::from_utf8_lossy(&body),
            routing_key = ?routing_key,
            properties = ?additional_properties,
            headers = ?headers,
            "AMQP message published"
        );

        Ok(())
    }
}
