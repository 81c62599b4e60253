// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Messaging Patterns
//!
//! `AmqpError` covers every failure that can happen while talking to the broker:
//! connection and channel setup, topology declaration, consuming, publishing,
//! acknowledging and waiting for publisher confirms.
//!
//! Errors are fatal unless classified otherwise. Malformed payloads are handled
//! inside the consume loops and stale RPC replies are filtered silently, so the
//! only variants a caller may reasonably retry are the publisher-confirm ones
//! (see [`AmqpError::is_retryable`]).

use thiserror::Error;

/// Represents errors that can occur during AMQP/RabbitMQ operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// Internal errors that don't fit into other categories
    #[error("internal error")]
    InternalError,

    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect")]
    ConnectionError,

    /// Error creating a channel from an established connection
    #[error("failure to create a channel")]
    ChannelError,

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding a queue to an exchange
    #[error("failure to bind queue `{1}` to exchange `{0}`")]
    BindingExchangeToQueueError(String, String),

    /// Error configuring Quality of Service parameters
    #[error("failure to configure qos `{0}`")]
    QoSDeclarationError(String),

    /// Error registering a consumer on a queue
    #[error("failure to declare consumer `{0}`")]
    BindingConsumerError(String),

    /// Error delivered by the consumer stream
    #[error("failure to consume message `{0}`")]
    ConsumerError(String),

    /// The delivery stream ended while a result was still expected
    #[error("consumer stream closed")]
    ConsumerClosed,

    /// Error publishing a message
    #[error("failure to publish")]
    PublishingError,

    /// Error parsing a message payload
    #[error("failure to parse payload `{0}`")]
    ParsePayloadError(String),

    /// A request arrived without reply-to or correlation id
    #[error("message without reply metadata")]
    MissingReplyMetadataError,

    /// Error acknowledging a message
    #[error("failure to ack message")]
    AckMessageError,

    /// Error negative-acknowledging a message
    #[error("failure to nack message")]
    NackMessageError,

    /// Error enabling publisher confirms on a channel
    #[error("failure to enable publisher confirms `{0}`")]
    ConfirmSelectError(String),

    /// Fewer confirmations than published messages arrived in time
    #[error("timeout waiting for publisher confirms: {received} of {expected}")]
    ConfirmTimeout { expected: usize, received: usize },

    /// The broker refused a published message
    #[error("message `{0}` was nacked by the broker")]
    ConfirmNacked(u64),

    /// The operation was interrupted by a shutdown request
    #[error("operation cancelled")]
    Cancelled,
}

impl AmqpError {
    /// Delivery failures a publisher may re-send instead of aborting.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AmqpError::ConfirmTimeout { .. } | AmqpError::ConfirmNacked(_)
        )
    }
}
