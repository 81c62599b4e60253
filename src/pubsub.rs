// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Publish/Subscribe
//!
//! Log streams published to an exchange and received by any number of
//! subscribers. Every subscriber gets its own server-named exclusive queue,
//! bound to the exchange with the keys it is interested in, so each one sees
//! its own copy of every matching message. The same types cover the fanout,
//! direct and topic flavours; only the exchange kind and the keys change.

use crate::{
    broker::{BrokerChannel, ConsumeOptions, DeliveryStream},
    errors::AmqpError,
    exchange::ExchangeDefinition,
    message::{Delivery, MessageProperties, OutboundMessage, TEXT_CONTENT_TYPE},
    publisher::AmqpPublisher,
    queue::{QueueBinding, QueueDefinition},
    topology::{AmqpTopology, Topology},
};
use futures_util::StreamExt;
use opentelemetry::Context;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Fanout exchange of the publish/subscribe example
pub const LOGS_EXCHANGE: &str = "logs";
/// Direct exchange routing by severity
pub const LOGS_ROUTING_EXCHANGE: &str = "logs-routing";
/// Topic exchange routing by `<facility>.<severity>`
pub const LOGS_TOPIC_EXCHANGE: &str = "logs-topic-exchange";

pub fn fanout_exchange() -> ExchangeDefinition {
    ExchangeDefinition::new(LOGS_EXCHANGE).fanout().durable()
}

pub fn routing_exchange() -> ExchangeDefinition {
    ExchangeDefinition::new(LOGS_ROUTING_EXCHANGE)
        .direct()
        .durable()
}

pub fn topic_exchange() -> ExchangeDefinition {
    ExchangeDefinition::new(LOGS_TOPIC_EXCHANGE).topic().durable()
}

/// Publishes plain text log lines to one exchange.
pub struct LogPublisher {
    channel: Arc<dyn BrokerChannel>,
    publisher: AmqpPublisher,
    exchange: ExchangeDefinition,
}

impl LogPublisher {
    pub fn new(channel: Arc<dyn BrokerChannel>, exchange: ExchangeDefinition) -> LogPublisher {
        LogPublisher {
            publisher: AmqpPublisher::new(channel.clone()),
            channel,
            exchange,
        }
    }

    pub async fn declare(&self) -> Result<(), AmqpError> {
        AmqpTopology::new(self.channel.clone())
            .exchange(self.exchange.clone())
            .install()
            .await
            .map(|_| ())
    }

    /// Publishes `line` with `routing_key`. Fanout exchanges ignore the key.
    pub async fn publish(&self, routing_key: &str, line: &str) -> Result<(), AmqpError> {
        let msg = OutboundMessage::to_exchange(
            self.exchange.name(),
            routing_key,
            line.as_bytes().to_vec(),
        )
        .with_properties(MessageProperties::default().with_content_type(TEXT_CONTENT_TYPE));

        self.publisher.publish(&Context::current(), msg).await
    }
}

/// Subscriber of one exchange.
pub struct LogSubscriber {
    channel: Arc<dyn BrokerChannel>,
    exchange: ExchangeDefinition,
    keys: Vec<String>,
}

impl LogSubscriber {
    /// `keys` are the binding keys; the queue is bound once per key. An empty
    /// list binds with the empty key, which is what fanout exchanges use.
    pub fn new(
        channel: Arc<dyn BrokerChannel>,
        exchange: ExchangeDefinition,
        keys: Vec<String>,
    ) -> LogSubscriber {
        LogSubscriber {
            channel,
            exchange,
            keys,
        }
    }

    /// Declares the exchange and a private queue, binds it and starts
    /// consuming with automatic acknowledgement.
    pub async fn subscribe(&self) -> Result<Subscription, AmqpError> {
        AmqpTopology::new(self.channel.clone())
            .exchange(self.exchange.clone())
            .install()
            .await?;

        let queue = self
            .channel
            .declare_queue(&QueueDefinition::server_named().exclusive())
            .await?;

        let keys = if self.keys.is_empty() {
            vec![String::new()]
        } else {
            self.keys.clone()
        };

        let bindings = keys.iter().fold(
            AmqpTopology::new(self.channel.clone()),
            |topology, key| {
                topology.queue_binding(
                    QueueBinding::new(&queue.name)
                        .exchange(self.exchange.name())
                        .routing_key(key),
                )
            },
        );
        bindings.install().await?;

        for key in &keys {
            info!(
                "queue '{}' bound to exchange '{}' with key: '{}'",
                queue.name,
                self.exchange.name(),
                key
            );
        }

        Subscription::consume(self.channel.as_ref(), &queue.name).await
    }
}

/// An auto-acknowledging consumer of one queue.
pub struct Subscription {
    queue: String,
    deliveries: DeliveryStream,
}

impl Subscription {
    /// Consumes `queue` with automatic acknowledgement. The queue must exist.
    pub async fn consume(
        channel: &dyn BrokerChannel,
        queue: &str,
    ) -> Result<Subscription, AmqpError> {
        let deliveries = channel.consume(queue, ConsumeOptions::auto_ack()).await?;

        Ok(Subscription {
            queue: queue.to_owned(),
            deliveries,
        })
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Waits for the next delivery. Returns `None` once `cancel` fires or the
    /// consumer is closed, and the stream error when the connection or
    /// channel is lost.
    pub async fn next(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<Delivery>, AmqpError> {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            next = self.deliveries.next() => next,
        };

        match next {
            Some(Ok(delivery)) => Ok(Some(delivery)),
            Some(Err(err)) => {
                error!(queue = %self.queue, error = err.to_string(), "errors consume msg");
                Err(err)
            }
            None => {
                warn!(queue = %self.queue, "consumer stream closed");
                Ok(None)
            }
        }
    }

    /// Logs every delivery until cancelled or closed, returning how many were
    /// received.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<u64, AmqpError> {
        let mut received = 0;

        while let Some(delivery) = self.next(&cancel).await? {
            info!(
                routing_key = %delivery.routing_key,
                exchange = %delivery.exchange,
                "received a message: [x] {}",
                delivery.body_lossy()
            );
            received += 1;
        }

        Ok(received)
    }
}
