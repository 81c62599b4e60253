// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Publisher Confirms
//!
//! With confirms enabled the broker answers every publish on the channel
//! with an ack (the message is safely accepted) or a nack. Publishers wait
//! for one confirmation per message, either after each publish or once per
//! batch, within a deadline covering the whole wait.
//!
//! A missing confirmation is reported as `ConfirmTimeout` and a nack as
//! `ConfirmNacked`; both are retryable, it is up to the caller to publish
//! the batch again or give up.

use crate::{
    broker::{BrokerChannel, ConfirmReceiver},
    errors::AmqpError,
    message::{MessageProperties, OutboundMessage, TEXT_CONTENT_TYPE},
    publisher::AmqpPublisher,
    queue::QueueDefinition,
};
use opentelemetry::Context;
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::{debug, error, info};

/// Queue the confirmed messages are published to
pub const CONFIRM_QUEUE: &str = "pub-confirm";

/// Waits for `n` confirmations on `confirms`, all within `timeout`.
pub async fn wait_for_confirms(
    confirms: &mut ConfirmReceiver,
    n: usize,
    timeout: Duration,
) -> Result<(), AmqpError> {
    let deadline = Instant::now() + timeout;

    for received in 0..n {
        match tokio::time::timeout_at(deadline, confirms.recv()).await {
            Ok(Some(confirmation)) => {
                debug!(
                    delivery_tag = confirmation.delivery_tag,
                    ack = confirmation.ack,
                    "confirmation"
                );
                if !confirmation.ack {
                    error!(delivery_tag = confirmation.delivery_tag, "not acked");
                    return Err(AmqpError::ConfirmNacked(confirmation.delivery_tag));
                }
            }
            Ok(None) => {
                error!("confirmation channel closed");
                return Err(AmqpError::ChannelError);
            }
            Err(_) => {
                error!(expected = n, received, "timeout waiting for confirmations");
                return Err(AmqpError::ConfirmTimeout {
                    expected: n,
                    received,
                });
            }
        }
    }

    Ok(())
}

/// Publishes plain text messages to [`CONFIRM_QUEUE`] on a channel in
/// confirm mode.
pub struct ConfirmPublisher {
    publisher: AmqpPublisher,
    confirms: ConfirmReceiver,
    queue: String,
    timeout: Duration,
}

impl ConfirmPublisher {
    /// Declares the queue and enables confirms on `channel`. The channel
    /// must not be in confirm mode already.
    pub async fn new(
        channel: Arc<dyn BrokerChannel>,
        timeout: Duration,
    ) -> Result<ConfirmPublisher, AmqpError> {
        let queue = channel
            .declare_queue(&QueueDefinition::new(CONFIRM_QUEUE))
            .await?;
        let confirms = channel.enable_confirms().await?;

        Ok(ConfirmPublisher {
            publisher: AmqpPublisher::new(channel),
            confirms,
            queue: queue.name,
            timeout,
        })
    }

    async fn publish_one(&self, i: usize) -> Result<(), AmqpError> {
        let msg = OutboundMessage::to_queue(&self.queue, format!("confirmed #{i}").into_bytes())
            .with_properties(MessageProperties::default().with_content_type(TEXT_CONTENT_TYPE));

        self.publisher.publish(&Context::current(), msg).await
    }

    /// Publishes `count` messages, waiting for each confirmation before the
    /// next publish.
    pub async fn publish_individually(&mut self, count: usize) -> Result<(), AmqpError> {
        for i in 0..count {
            self.publish_one(i).await?;
            wait_for_confirms(&mut self.confirms, 1, self.timeout).await?;
        }

        info!(count, "published messages confirmed individually");
        Ok(())
    }

    /// Publishes `count` messages, waiting for confirmations after every
    /// `batch_size` publishes and once more for the remainder. Returns the
    /// number of batches waited for.
    pub async fn publish_in_batches(
        &mut self,
        count: usize,
        batch_size: usize,
    ) -> Result<usize, AmqpError> {
        let batch_size = batch_size.max(1);
        let mut in_flight = 0;
        let mut batches = 0;

        for i in 0..count {
            self.publish_one(i).await?;
            in_flight += 1;

            if in_flight == batch_size {
                wait_for_confirms(&mut self.confirms, in_flight, self.timeout).await?;
                in_flight = 0;
                batches += 1;
            }
        }

        if in_flight > 0 {
            wait_for_confirms(&mut self.confirms, in_flight, self.timeout).await?;
            batches += 1;
        }

        info!(count, batch_size, batches, "published messages confirmed in batches");
        Ok(batches)
    }
}
