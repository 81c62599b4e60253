// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Publisher
//!
//! `AmqpPublisher` stamps outgoing messages with a message id and the
//! caller's trace context before handing them to the channel. Every pattern
//! publishes through it.

use crate::{
    broker::BrokerChannel,
    errors::AmqpError,
    message::{DeliveryMode, MessageProperties, OutboundMessage, JSON_CONTENT_TYPE},
    otel,
};
use opentelemetry::Context;
use serde::Serialize;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

pub struct AmqpPublisher {
    channel: Arc<dyn BrokerChannel>,
}

impl AmqpPublisher {
    pub fn new(channel: Arc<dyn BrokerChannel>) -> AmqpPublisher {
        AmqpPublisher { channel }
    }

    /// Publishes `msg`, propagating `ctx` in its headers. A message id is
    /// generated unless the caller already set one.
    pub async fn publish(&self, ctx: &Context, mut msg: OutboundMessage) -> Result<(), AmqpError> {
        otel::inject_context(ctx, &mut msg.properties);

        if msg.properties.message_id.is_none() {
            msg.properties.message_id = Some(Uuid::new_v4().to_string());
        }

        self.channel.publish(msg).await
    }

    /// Serializes `value` as JSON and publishes it to `queue` through the
    /// default exchange.
    pub async fn publish_json<T>(
        &self,
        ctx: &Context,
        queue: &str,
        value: &T,
        mode: DeliveryMode,
    ) -> Result<Vec<u8>, AmqpError>
    where
        T: Serialize + Sync,
    {
        let data = serde_json::to_vec(value).map_err(|err| {
            error!(error = err.to_string(), "error serializing message");
            AmqpError::PublishingError
        })?;

        let mut props = MessageProperties::default().with_content_type(JSON_CONTENT_TYPE);
        props.delivery_mode = mode;

        self.publish(
            ctx,
            OutboundMessage::to_queue(queue, data.clone()).with_properties(props),
        )
        .await?;

        Ok(data)
    }
}
