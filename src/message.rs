// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Envelopes
//!
//! Broker-independent views of what goes over the wire: the properties the
//! patterns care about (content type, persistence, correlation id, reply-to,
//! headers), inbound deliveries and outbound publishings.

use std::collections::BTreeMap;

/// Content type of JSON encoded payloads
pub const JSON_CONTENT_TYPE: &str = "application/json";
/// Content type of plain text payloads
pub const TEXT_CONTENT_TYPE: &str = "text/plain";
/// Name of the default (nameless direct) exchange
pub const DEFAULT_EXCHANGE: &str = "";

/// Whether the broker should write the message to disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryMode {
    #[default]
    Transient,
    Persistent,
}

impl DeliveryMode {
    /// Value of the AMQP `delivery-mode` property.
    pub fn as_amqp(self) -> u8 {
        match self {
            DeliveryMode::Transient => 1,
            DeliveryMode::Persistent => 2,
        }
    }

    pub fn from_amqp(value: u8) -> Self {
        if value == 2 {
            DeliveryMode::Persistent
        } else {
            DeliveryMode::Transient
        }
    }
}

/// Message properties shared by deliveries and publishings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageProperties {
    pub content_type: Option<String>,
    pub delivery_mode: DeliveryMode,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub message_id: Option<String>,
    /// String headers; carries the trace context.
    pub headers: BTreeMap<String, String>,
}

impl MessageProperties {
    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_owned());
        self
    }

    pub fn persistent(mut self) -> Self {
        self.delivery_mode = DeliveryMode::Persistent;
        self
    }

    pub fn with_correlation_id(mut self, id: &str) -> Self {
        self.correlation_id = Some(id.to_owned());
        self
    }

    pub fn with_reply_to(mut self, queue: &str) -> Self {
        self.reply_to = Some(queue.to_owned());
        self
    }
}

/// A message handed to a consumer that has not been finalized yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Opaque broker handle used to ack or nack the message.
    pub delivery_tag: u64,
    pub exchange: String,
    pub routing_key: String,
    /// Set by the broker when the message was handed out before.
    pub redelivered: bool,
    pub properties: MessageProperties,
    pub data: Vec<u8>,
}

impl Delivery {
    /// Payload as text, for logging.
    pub fn body_lossy(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// A message about to be published.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundMessage {
    pub exchange: String,
    pub routing_key: String,
    pub properties: MessageProperties,
    pub data: Vec<u8>,
}

impl OutboundMessage {
    /// Message sent through the default exchange straight to `queue`.
    pub fn to_queue(queue: &str, data: Vec<u8>) -> Self {
        OutboundMessage {
            exchange: DEFAULT_EXCHANGE.to_owned(),
            routing_key: queue.to_owned(),
            properties: MessageProperties::default(),
            data,
        }
    }

    /// Message sent to `exchange` with `routing_key`.
    pub fn to_exchange(exchange: &str, routing_key: &str, data: Vec<u8>) -> Self {
        OutboundMessage {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            properties: MessageProperties::default(),
            data,
        }
    }

    pub fn with_properties(mut self, properties: MessageProperties) -> Self {
        self.properties = properties;
        self
    }
}

/// Broker answer to one message published in confirm mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    /// Publish sequence number on the channel, starting at 1.
    pub delivery_tag: u64,
    pub ack: bool,
}
