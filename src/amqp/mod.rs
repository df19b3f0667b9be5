pub mod fabric;
pub mod message;
pub mod transport;
pub mod wire;

pub use fabric::{FabricSetup, LapinFabric, NoFabric};
pub use message::{
    DeliveryMode, Headers, Message, Properties, PropertyMap, PropertyValue, APPLICATION_HEADERS,
};
pub use transport::{LapinTransport, Transport};
