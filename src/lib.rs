pub mod amqp;
pub mod config;
pub mod error;
pub mod producer;
pub mod validator;

pub use config::{Config, ProducerConfig};
pub use error::{Error, Result};
pub use producer::Producer;
pub use validator::{JsonSchemaValidator, SchemaValidator, ValidationOutcome};
