// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Hello World
//!
//! Point-to-point delivery through the default exchange: the producer
//! publishes to the `hello` queue by name, the consumer reads it with
//! automatic acknowledgement.

use crate::{
    broker::BrokerChannel,
    errors::AmqpError,
    message::{MessageProperties, OutboundMessage, TEXT_CONTENT_TYPE},
    publisher::AmqpPublisher,
    pubsub::Subscription,
    queue::{DeclaredQueue, QueueDefinition},
};
use opentelemetry::Context;
use std::sync::Arc;
use tracing::info;

pub const HELLO_QUEUE: &str = "hello";

pub fn hello_queue() -> QueueDefinition {
    QueueDefinition::new(HELLO_QUEUE)
}

pub fn hello_message(i: u64) -> String {
    format!("Hello world {i}")
}

pub struct HelloProducer {
    channel: Arc<dyn BrokerChannel>,
    publisher: AmqpPublisher,
}

impl HelloProducer {
    pub fn new(channel: Arc<dyn BrokerChannel>) -> HelloProducer {
        HelloProducer {
            publisher: AmqpPublisher::new(channel.clone()),
            channel,
        }
    }

    pub async fn declare(&self) -> Result<DeclaredQueue, AmqpError> {
        let queue = self.channel.declare_queue(&hello_queue()).await?;

        info!("queue name: '{}'", queue.name);
        info!("queue messages: {}", queue.message_count);
        info!("queue consumers: {}", queue.consumer_count);

        Ok(queue)
    }

    pub async fn send(&self, i: u64) -> Result<(), AmqpError> {
        let body = hello_message(i);
        let msg = OutboundMessage::to_queue(HELLO_QUEUE, body.clone().into_bytes())
            .with_properties(MessageProperties::default().with_content_type(TEXT_CONTENT_TYPE));

        self.publisher.publish(&Context::current(), msg).await?;
        info!("sent '{}'", body);
        Ok(())
    }

    /// Sends `Hello world 1` up to `Hello world <count>`.
    pub async fn send_all(&self, count: u64) -> Result<(), AmqpError> {
        for i in 1..=count {
            self.send(i).await?;
        }
        Ok(())
    }
}

/// Declares the `hello` queue and consumes it.
pub async fn hello_consumer(channel: &dyn BrokerChannel) -> Result<Subscription, AmqpError> {
    channel.declare_queue(&hello_queue()).await?;
    Subscription::consume(channel, HELLO_QUEUE).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MockBrokerChannel;
    use futures_util::{stream, StreamExt};
    use mockall::Sequence;

    #[tokio::test]
    async fn producer_sends_to_the_hello_queue() {
        let mut channel = MockBrokerChannel::new();
        channel
            .expect_declare_queue()
            .withf(|def| def.name() == HELLO_QUEUE && !def.is_durable())
            .times(1)
            .returning(|def| {
                Ok(DeclaredQueue {
                    name: def.name().to_owned(),
                    message_count: 4,
                    consumer_count: 1,
                })
            });
        channel
            .expect_publish()
            .withf(|msg| {
                msg.exchange.is_empty()
                    && msg.routing_key == HELLO_QUEUE
                    && msg.data == b"Hello world 3"
            })
            .times(1)
            .returning(|_| Ok(()));

        let producer = HelloProducer::new(Arc::new(channel));
        assert_eq!(producer.declare().await.unwrap().message_count, 4);
        producer.send(3).await.unwrap();
    }

    #[tokio::test]
    async fn messages_are_numbered_from_one() {
        let mut seq = Sequence::new();
        let mut channel = MockBrokerChannel::new();
        for body in ["Hello world 1", "Hello world 2", "Hello world 3"] {
            channel
                .expect_publish()
                .withf(move |msg| msg.data == body.as_bytes())
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(()));
        }

        HelloProducer::new(Arc::new(channel))
            .send_all(3)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn consumer_auto_acks() {
        let mut channel = MockBrokerChannel::new();
        channel.expect_declare_queue().returning(|def| {
            Ok(DeclaredQueue {
                name: def.name().to_owned(),
                ..DeclaredQueue::default()
            })
        });
        channel
            .expect_consume()
            .withf(|queue, opts| queue == HELLO_QUEUE && opts.auto_ack)
            .times(1)
            .returning(|_, _| Ok(stream::empty().boxed()));

        let subscription = hello_consumer(&channel).await.unwrap();
        assert_eq!(subscription.queue(), HELLO_QUEUE);
    }
}
