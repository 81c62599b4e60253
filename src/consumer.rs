// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Task Consumption
//!
//! Processing of a single work queue delivery: decode the task, simulate the
//! work, and only then acknowledge. Acknowledging earlier would lose the task
//! if the worker died halfway through; leaving it unacknowledged lets the
//! broker hand it to another worker when this one disconnects.

use crate::{
    broker::BrokerChannel, errors::AmqpError, message::Delivery, otel, task::Task,
};
use opentelemetry::trace::{Span, Status};
use std::{borrow::Cow, str::FromStr, time::Duration};
use tracing::{debug, error, info, warn};

/// What a worker does with a payload that is not a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MalformedPolicy {
    /// Log and move on without acknowledging. The message stays pending on
    /// the broker and is redelivered once the worker's channel closes. With a
    /// prefetch of one it also blocks this worker from receiving more tasks.
    #[default]
    Skip,
    /// Reject without requeue; the broker moves the message to the queue's
    /// dead-letter queue.
    DeadLetter,
}

impl FromStr for MalformedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "skip" => Ok(MalformedPolicy::Skip),
            "dead-letter" | "dead_letter" | "dlq" => Ok(MalformedPolicy::DeadLetter),
            other => Err(format!("unknown malformed policy `{other}`")),
        }
    }
}

/// How a delivery left the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Skipped,
    DeadLettered,
}

/// Processes one work queue delivery.
///
/// Malformed payloads are handled according to `policy` and never abort the
/// consume loop; ack and nack failures do.
pub(crate) async fn consume_task(
    channel: &dyn BrokerChannel,
    delivery: &Delivery,
    policy: MalformedPolicy,
    work_unit: Duration,
) -> Result<TaskOutcome, AmqpError> {
    let (_ctx, mut span) = otel::consumer_span(&delivery.properties, "task");

    info!(
        routing_key = %delivery.routing_key,
        exchange = %delivery.exchange,
        redelivered = delivery.redelivered,
        "received a message: {}",
        delivery.body_lossy()
    );

    let task = match serde_json::from_slice::<Task>(&delivery.data) {
        Ok(task) => task,
        Err(err) => {
            let reason = AmqpError::ParsePayloadError(err.to_string());
            span.record_error(&reason);
            span.set_status(Status::Error {
                description: Cow::from("malformed task"),
            });

            return match policy {
                MalformedPolicy::Skip => {
                    warn!(
                        error = reason.to_string(),
                        delivery_tag = delivery.delivery_tag,
                        "skipping malformed task without ack, it stays pending on the broker"
                    );
                    Ok(TaskOutcome::Skipped)
                }
                MalformedPolicy::DeadLetter => {
                    warn!(
                        error = reason.to_string(),
                        delivery_tag = delivery.delivery_tag,
                        "rejecting malformed task to the dead-letter queue"
                    );
                    channel.nack(delivery.delivery_tag, false).await?;
                    Ok(TaskOutcome::DeadLettered)
                }
            };
        }
    };

    info!("task in progress: {}", task);
    tokio::time::sleep(task.workload(work_unit)).await;

    if let Err(err) = channel.ack(delivery.delivery_tag).await {
        error!("error whiling ack msg");
        span.record_error(&err);
        span.set_status(Status::Error {
            description: Cow::from("error to ack msg"),
        });
        return Err(err);
    }

    debug!(delivery_tag = delivery.delivery_tag, "task acknowledged");
    info!("task completed: {}", task);
    span.set_status(Status::Ok);

    Ok(TaskOutcome::Completed)
}
