use crate::amqp::wire::to_field_table;
use crate::config::{ExchangeOptions, ExchangeType, QueueOptions};
use crate::Result;
use async_trait::async_trait;
use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::{Channel, ExchangeKind};
use tracing::{debug, info, instrument};

/// Declares the broker topology a producer publishes into.
///
/// Declaring an existing topology with the same options is a no-op on the
/// broker, so implementations may be called repeatedly.
#[async_trait]
pub trait FabricSetup: Send + Sync {
    async fn declare(&self) -> Result<()>;
}

/// No topology to declare, e.g. when publishing to a pre-provisioned exchange.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFabric;

#[async_trait]
impl FabricSetup for NoFabric {
    async fn declare(&self) -> Result<()> {
        Ok(())
    }
}

/// Declares an exchange and, optionally, a queue bound to it.
pub struct LapinFabric {
    channel: Channel,
    exchange: ExchangeOptions,
    queue: Option<QueueOptions>,
}

impl LapinFabric {
    pub fn new(channel: Channel, exchange: ExchangeOptions, queue: Option<QueueOptions>) -> Self {
        Self {
            channel,
            exchange,
            queue,
        }
    }

    async fn declare_exchange(&self) -> Result<()> {
        if !self.exchange.declare || self.exchange.is_reserved() {
            debug!("Skipping declaration of exchange '{}'", self.exchange.name);
            return Ok(());
        }

        let options = ExchangeDeclareOptions {
            passive: self.exchange.passive,
            durable: self.exchange.durable,
            auto_delete: self.exchange.auto_delete,
            internal: self.exchange.internal,
            nowait: false,
        };

        self.channel
            .exchange_declare(
                &self.exchange.name,
                exchange_kind(&self.exchange.kind),
                options,
                to_field_table("arguments", &self.exchange.arguments)?,
            )
            .await?;

        info!("Declared exchange '{}'", self.exchange.name);
        Ok(())
    }

    async fn declare_queue(&self, queue: &QueueOptions) -> Result<()> {
        if !queue.declare {
            debug!("Skipping declaration of queue '{}'", queue.name);
            return Ok(());
        }

        let options = QueueDeclareOptions {
            passive: queue.passive,
            durable: queue.durable,
            exclusive: queue.exclusive,
            auto_delete: queue.auto_delete,
            nowait: false,
        };

        let declared = self
            .channel
            .queue_declare(&queue.name, options, to_field_table("arguments", &queue.arguments)?)
            .await?;
        info!("Declared queue '{}'", declared.name());

        // every queue is implicitly bound to the default exchange
        if self.exchange.name.is_empty() {
            return Ok(());
        }

        if queue.routing_keys.is_empty() {
            self.bind(declared.name().as_str(), "").await?;
        } else {
            for routing_key in &queue.routing_keys {
                self.bind(declared.name().as_str(), routing_key).await?;
            }
        }

        Ok(())
    }

    async fn bind(&self, queue: &str, routing_key: &str) -> Result<()> {
        self.channel
            .queue_bind(
                queue,
                &self.exchange.name,
                routing_key,
                QueueBindOptions::default(),
                Default::default(),
            )
            .await?;

        debug!(
            "Bound queue '{}' to exchange '{}' with routing key '{}'",
            queue, self.exchange.name, routing_key
        );
        Ok(())
    }
}

#[async_trait]
impl FabricSetup for LapinFabric {
    #[instrument(skip(self), fields(exchange = %self.exchange.name))]
    async fn declare(&self) -> Result<()> {
        self.declare_exchange().await?;

        if let Some(queue) = &self.queue {
            self.declare_queue(queue).await?;
        }

        Ok(())
    }
}

fn exchange_kind(kind: &ExchangeType) -> ExchangeKind {
    match kind {
        ExchangeType::Direct => ExchangeKind::Direct,
        ExchangeType::Fanout => ExchangeKind::Fanout,
        ExchangeType::Topic => ExchangeKind::Topic,
        ExchangeType::Headers => ExchangeKind::Headers,
    }
}
