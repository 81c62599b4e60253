// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Channel Abstraction
//!
//! The `BrokerChannel` trait is the single seam between the messaging
//! patterns and the broker. Production code uses the lapin-backed
//! implementation from [`crate::channel`]; tests substitute mocks or an
//! in-memory broker.

use crate::{
    errors::AmqpError,
    exchange::ExchangeDefinition,
    message::{Confirmation, Delivery, OutboundMessage},
    queue::{DeclaredQueue, QueueBinding, QueueDefinition},
};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tokio::sync::mpsc::UnboundedReceiver;

/// Stream of deliveries pushed by the broker to one consumer.
pub type DeliveryStream = BoxStream<'static, Result<Delivery, AmqpError>>;

/// Receiver of publisher confirmations, one per published message.
pub type ConfirmReceiver = UnboundedReceiver<Confirmation>;

/// Options of a consumer registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumeOptions {
    /// The broker considers a message acknowledged as soon as it is sent.
    pub auto_ack: bool,
    /// No other consumer may attach to the queue.
    pub exclusive: bool,
}

impl ConsumeOptions {
    /// Manual acknowledgement, shared queue.
    pub fn manual_ack() -> Self {
        ConsumeOptions {
            auto_ack: false,
            exclusive: false,
        }
    }

    /// Automatic acknowledgement, shared queue.
    pub fn auto_ack() -> Self {
        ConsumeOptions {
            auto_ack: true,
            exclusive: false,
        }
    }

    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }
}

/// Operations the patterns need from one AMQP channel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Declares a queue, returning its actual name and current counters.
    async fn declare_queue(&self, def: &QueueDefinition) -> Result<DeclaredQueue, AmqpError>;

    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError>;

    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError>;

    /// Limits the number of unacknowledged deliveries held by each consumer
    /// of this channel.
    async fn qos(&self, prefetch_count: u16) -> Result<(), AmqpError>;

    async fn consume(
        &self,
        queue: &str,
        options: ConsumeOptions,
    ) -> Result<DeliveryStream, AmqpError>;

    async fn publish(&self, msg: OutboundMessage) -> Result<(), AmqpError>;

    /// Acknowledges exactly one delivery.
    async fn ack(&self, delivery_tag: u64) -> Result<(), AmqpError>;

    /// Rejects exactly one delivery.
    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), AmqpError>;

    /// Puts the channel in confirm mode. Every later publish yields one
    /// confirmation on the returned receiver. Must be called once per channel.
    async fn enable_confirms(&self) -> Result<ConfirmReceiver, AmqpError>;
}
