// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Topology Management
//!
//! Declarative setup shared by every pattern: exchanges, named queues (with
//! their optional dead-letter queues) and the bindings between them.
//!
//! Declarations are idempotent on the broker side, so producers and
//! consumers both install the topology they rely on, in whatever order
//! they start.

use crate::{
    broker::BrokerChannel,
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::{DeclaredQueue, QueueBinding, QueueDefinition},
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Queue argument naming the exchange dead-lettered messages are sent to
pub const AMQP_HEADERS_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";
/// Queue argument naming the routing key of dead-lettered messages
pub const AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY: &str = "x-dead-letter-routing-key";

/// Interface for registering and installing topology components.
#[async_trait]
pub trait Topology {
    /// Adds an exchange definition to the topology.
    fn exchange(self, def: ExchangeDefinition) -> Self;

    /// Adds a queue definition to the topology.
    fn queue(self, def: QueueDefinition) -> Self;

    /// Adds a queue-to-exchange binding to the topology.
    fn queue_binding(self, binding: QueueBinding) -> Self;

    /// Declares everything on the broker: exchanges first, then queues,
    /// then bindings. Returns the declared queues in registration order.
    async fn install(&self) -> Result<Vec<DeclaredQueue>, AmqpError>;
}

/// Topology installed through a [`BrokerChannel`].
pub struct AmqpTopology {
    channel: Arc<dyn BrokerChannel>,
    pub(crate) queues: Vec<QueueDefinition>,
    pub(crate) queues_binding: Vec<QueueBinding>,
    pub(crate) exchanges: Vec<ExchangeDefinition>,
}

impl AmqpTopology {
    pub fn new(channel: Arc<dyn BrokerChannel>) -> AmqpTopology {
        AmqpTopology {
            channel,
            queues: vec![],
            queues_binding: vec![],
            exchanges: vec![],
        }
    }
}

#[async_trait]
impl Topology for AmqpTopology {
    fn exchange(mut self, def: ExchangeDefinition) -> Self {
        self.exchanges.push(def);
        self
    }

    fn queue(mut self, def: QueueDefinition) -> Self {
        self.queues.push(def);
        self
    }

    fn queue_binding(mut self, binding: QueueBinding) -> Self {
        self.queues_binding.push(binding);
        self
    }

    async fn install(&self) -> Result<Vec<DeclaredQueue>, AmqpError> {
        self.install_exchanges().await?;
        let declared = self.install_queues().await?;
        self.binding_queues().await?;
        Ok(declared)
    }
}

impl AmqpTopology {
    async fn install_exchanges(&self) -> Result<(), AmqpError> {
        for exch in &self.exchanges {
            debug!("creating exchange: {}", exch.name);
            self.channel.declare_exchange(exch).await?;
            debug!("exchange: {} was created", exch.name);
        }

        Ok(())
    }

    /// Declares every queue, preceded by its dead-letter queue when one is
    /// configured, so the dead-letter route exists before the first reject.
    async fn install_queues(&self) -> Result<Vec<DeclaredQueue>, AmqpError> {
        let mut declared = Vec::with_capacity(self.queues.len());

        for def in &self.queues {
            if let Some(dlq_name) = &def.dlq_name {
                self.declare_dlq(def, dlq_name).await?;
            }

            debug!("creating queue: {}", def.name);
            let queue = self.channel.declare_queue(def).await?;
            debug!("queue: {} was created", queue.name);

            declared.push(queue);
        }

        Ok(declared)
    }

    async fn declare_dlq(&self, def: &QueueDefinition, dlq_name: &str) -> Result<(), AmqpError> {
        let mut dlq = QueueDefinition::new(dlq_name);
        if def.durable {
            dlq = dlq.durable();
        }

        debug!("creating dead-letter queue: {}", dlq_name);
        self.channel.declare_queue(&dlq).await.map(|_| ())
    }

    async fn binding_queues(&self) -> Result<(), AmqpError> {
        for binding in &self.queues_binding {
            debug!(
                "binding queue: {} to the exchange: {} with the key: {}",
                binding.queue_name, binding.exchange_name, binding.routing_key
            );
            self.channel.bind_queue(binding).await?;
        }

        Ok(())
    }
}
