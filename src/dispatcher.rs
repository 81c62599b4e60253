// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Task Dispatcher
//!
//! Producer and worker sides of the work queue.
//!
//! The producer publishes persistent JSON tasks to the durable `task_queue`.
//! Workers compete for them: each declares the same queue, asks the broker
//! for at most one unacknowledged delivery at a time and acknowledges every
//! task individually once it is done. Load balancing and redelivery after a
//! worker crash are left to the broker.

use crate::{
    broker::{BrokerChannel, ConsumeOptions},
    consumer::{consume_task, MalformedPolicy, TaskOutcome},
    errors::AmqpError,
    message::DeliveryMode,
    publisher::AmqpPublisher,
    queue::{DeclaredQueue, QueueDefinition},
    task::Task,
    topology::{AmqpTopology, Topology},
};
use futures_util::StreamExt;
use opentelemetry::Context;
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Name of the work queue
pub const TASK_QUEUE: &str = "task_queue";

/// Unacknowledged deliveries a worker may hold. Anything above one lets a
/// fast-starting worker hoard tasks while the others sit idle.
pub const WORKER_PREFETCH: u16 = 1;

/// Definition of the work queue. Producers and workers must agree on it,
/// because the broker refuses to redeclare a queue with different arguments.
pub fn task_queue(policy: MalformedPolicy) -> QueueDefinition {
    let def = QueueDefinition::new(TASK_QUEUE).durable();
    match policy {
        MalformedPolicy::Skip => def,
        MalformedPolicy::DeadLetter => def.with_dlq(),
    }
}

async fn install_queue(
    channel: &Arc<dyn BrokerChannel>,
    def: &QueueDefinition,
) -> Result<DeclaredQueue, AmqpError> {
    AmqpTopology::new(channel.clone())
        .queue(def.clone())
        .install()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AmqpError::DeclareQueueError(def.name().to_owned()))
}

/// Publishing side of the work queue.
pub struct TaskProducer {
    channel: Arc<dyn BrokerChannel>,
    publisher: AmqpPublisher,
    queue: QueueDefinition,
}

impl TaskProducer {
    pub fn new(channel: Arc<dyn BrokerChannel>, queue: QueueDefinition) -> TaskProducer {
        TaskProducer {
            publisher: AmqpPublisher::new(channel.clone()),
            channel,
            queue,
        }
    }

    /// Declares the work queue and reports how busy it is.
    pub async fn declare(&self) -> Result<DeclaredQueue, AmqpError> {
        let queue = install_queue(&self.channel, &self.queue).await?;

        info!("tasks in the queue: {}", queue.message_count);
        info!("workers connected: {}", queue.consumer_count);

        Ok(queue)
    }

    /// Publishes one task as persistent JSON. Success only means the broker
    /// accepted the publish, not that the task is on disk.
    pub async fn dispatch(&self, task: &Task) -> Result<(), AmqpError> {
        let data = self
            .publisher
            .publish_json(
                &Context::current(),
                self.queue.name(),
                task,
                DeliveryMode::Persistent,
            )
            .await?;

        info!("sent '{}'", String::from_utf8_lossy(&data));
        Ok(())
    }
}

/// Counters of a finished worker run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub completed: u64,
    pub skipped: u64,
    pub dead_lettered: u64,
}

/// Consuming side of the work queue.
pub struct TaskWorker {
    channel: Arc<dyn BrokerChannel>,
    queue: QueueDefinition,
    work_unit: Duration,
    policy: MalformedPolicy,
}

impl TaskWorker {
    /// `work_unit` is the simulated processing time of one task level.
    pub fn new(
        channel: Arc<dyn BrokerChannel>,
        queue: QueueDefinition,
        work_unit: Duration,
        policy: MalformedPolicy,
    ) -> TaskWorker {
        TaskWorker {
            channel,
            queue,
            work_unit,
            policy,
        }
    }

    /// Consumes tasks until `cancel` fires or the broker closes the consumer.
    /// An error on the delivery stream (a lost connection or channel) ends
    /// the run with that error.
    ///
    /// A task already in progress is finished and acknowledged before the
    /// cancellation is observed.
    pub async fn run(&self, cancel: CancellationToken) -> Result<WorkerReport, AmqpError> {
        install_queue(&self.channel, &self.queue).await?;
        self.channel.qos(WORKER_PREFETCH).await?;

        let mut deliveries = self
            .channel
            .consume(self.queue.name(), ConsumeOptions::manual_ack())
            .await?;

        info!(queue = self.queue.name(), "worker waiting for tasks");

        let mut report = WorkerReport::default();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("worker stopping");
                    break;
                }
                next = deliveries.next() => next,
            };

            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(err)) => {
                    error!(error = err.to_string(), "errors consume msg");
                    return Err(err);
                }
                None => {
                    warn!("consumer stream closed");
                    break;
                }
            };

            match consume_task(self.channel.as_ref(), &delivery, self.policy, self.work_unit)
                .await?
            {
                TaskOutcome::Completed => report.completed += 1,
                TaskOutcome::Skipped => report.skipped += 1,
                TaskOutcome::DeadLettered => report.dead_lettered += 1,
            }
        }

        Ok(report)
    }
}
