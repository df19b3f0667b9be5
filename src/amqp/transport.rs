use crate::amqp::message::Message;
use crate::amqp::wire::to_basic_properties;
use crate::{Error, Result};
use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions};
use lapin::publisher_confirm::Confirmation;
use lapin::Channel;
use tracing::{debug, instrument};

/// Delivers assembled messages to the broker.
///
/// Implementations own connection handling; failures are returned to the
/// producer unchanged.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: &Message, exchange: &str, routing_key: &str) -> Result<()>;
}

/// [`Transport`] over a lapin channel.
pub struct LapinTransport {
    channel: Channel,
    confirm: bool,
}

impl LapinTransport {
    /// Fire-and-forget publishing on `channel`.
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            confirm: false,
        }
    }

    /// Switches the channel to confirm mode; every send then waits for the
    /// broker's ack and a nack fails the send.
    pub async fn with_confirms(channel: Channel) -> Result<Self> {
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;

        Ok(Self {
            channel,
            confirm: true,
        })
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }
}

#[async_trait]
impl Transport for LapinTransport {
    #[instrument(skip_all, fields(exchange = %exchange, routing_key = %routing_key))]
    async fn send(&self, message: &Message, exchange: &str, routing_key: &str) -> Result<()> {
        let properties = to_basic_properties(message.properties())?;

        let confirm = self
            .channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                message.body(),
                properties,
            )
            .await?;

        if !self.confirm {
            return Ok(());
        }

        match confirm.await? {
            Confirmation::Nack(_) => Err(Error::Transport(format!(
                "broker rejected message for exchange '{}' with routing key '{}'",
                exchange, routing_key
            ))),
            _ => {
                debug!("Publish confirmed by broker");
                Ok(())
            }
        }
    }
}
