// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RPC over the Broker
//!
//! Clients publish requests to the shared `rpc-queue`, tagged with a
//! correlation id and the name of their private reply queue. A pool of
//! servers drains the shared queue and publishes each result to the
//! request's reply queue with the same correlation id.
//!
//! Servers acknowledge a request only after its reply is published. A server
//! dying between the two makes the broker redeliver the request, so a client
//! can see the same answer twice; it drops whatever does not match the call
//! it is waiting for.

mod client;
mod server;

pub use client::RpcClient;
pub use server::{serve_pool, RequestOutcome, RequestState, RpcServer};

use crate::{
    errors::AmqpError,
    message::{Delivery, MessageProperties, OutboundMessage, TEXT_CONTENT_TYPE},
    queue::QueueDefinition,
};

/// Name of the shared request queue
pub const RPC_QUEUE: &str = "rpc-queue";

/// Unacknowledged requests a server may hold
pub const SERVER_PREFETCH: u16 = 1;

/// The shared request queue: transient and shared by every server.
pub fn rpc_queue() -> QueueDefinition {
    QueueDefinition::new(RPC_QUEUE)
}

/// A client-initiated remote computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcRequest {
    pub correlation_id: String,
    /// Private queue the response must be published to.
    pub reply_to: String,
    pub body: Vec<u8>,
}

impl RpcRequest {
    /// Reads a request from a delivery of the shared queue.
    pub fn from_delivery(delivery: &Delivery) -> Result<RpcRequest, AmqpError> {
        match (
            &delivery.properties.correlation_id,
            &delivery.properties.reply_to,
        ) {
            (Some(correlation_id), Some(reply_to)) => Ok(RpcRequest {
                correlation_id: correlation_id.clone(),
                reply_to: reply_to.clone(),
                body: delivery.data.clone(),
            }),
            _ => Err(AmqpError::MissingReplyMetadataError),
        }
    }

    pub fn to_message(&self, queue: &str) -> OutboundMessage {
        OutboundMessage::to_queue(queue, self.body.clone()).with_properties(
            MessageProperties::default()
                .with_content_type(TEXT_CONTENT_TYPE)
                .with_correlation_id(&self.correlation_id)
                .with_reply_to(&self.reply_to),
        )
    }
}

/// Result of one request, tagged with the request's correlation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcResponse {
    pub correlation_id: String,
    pub body: Vec<u8>,
}

impl RpcResponse {
    pub fn to_message(&self, reply_to: &str) -> OutboundMessage {
        OutboundMessage::to_queue(reply_to, self.body.clone()).with_properties(
            MessageProperties::default()
                .with_content_type(TEXT_CONTENT_TYPE)
                .with_correlation_id(&self.correlation_id),
        )
    }
}

/// Computation performed by RPC servers.
pub trait RequestHandler: Send + Sync {
    /// Returns the response body, or `ParsePayloadError` when the request
    /// body is not understood.
    fn handle(&self, body: &[u8]) -> Result<Vec<u8>, AmqpError>;
}

/// Fibonacci numbers, requested and answered as decimal text.
#[derive(Debug, Clone, Copy, Default)]
pub struct FibonacciHandler;

/// Largest n whose Fibonacci number fits in a u64
pub const MAX_FIB_INPUT: u32 = 93;

pub fn fib(n: u32) -> u64 {
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 0..n {
        // b runs one term ahead and may wrap past fib(93)
        (a, b) = (b, a.wrapping_add(b));
    }
    a
}

impl RequestHandler for FibonacciHandler {
    fn handle(&self, body: &[u8]) -> Result<Vec<u8>, AmqpError> {
        let text = std::str::from_utf8(body)
            .map_err(|err| AmqpError::ParsePayloadError(err.to_string()))?;

        let n: u32 = text
            .trim()
            .parse()
            .map_err(|_| AmqpError::ParsePayloadError(format!("`{text}` is not a number")))?;

        if n > MAX_FIB_INPUT {
            return Err(AmqpError::ParsePayloadError(format!(
                "fib({n}) overflows, max input is {MAX_FIB_INPUT}"
            )));
        }

        Ok(fib(n).to_string().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fibonacci_numbers() {
        let first: Vec<u64> = (0..10).map(fib).collect();
        assert_eq!(first, vec![0, 1, 1, 2, 3, 5, 8, 13, 21, 34]);
        assert_eq!(fib(MAX_FIB_INPUT), 12_200_160_415_121_876_738);
    }

    #[test]
    fn handler_answers_in_decimal_text() {
        assert_eq!(FibonacciHandler.handle(b"7").unwrap(), b"13");
        assert_eq!(FibonacciHandler.handle(b" 10\n").unwrap(), b"55");
    }

    #[test]
    fn handler_rejects_bad_input() {
        assert!(matches!(
            FibonacciHandler.handle(b"seven"),
            Err(AmqpError::ParsePayloadError(_))
        ));
        assert!(matches!(
            FibonacciHandler.handle(b"94"),
            Err(AmqpError::ParsePayloadError(_))
        ));
    }

    #[test]
    fn request_needs_reply_metadata() {
        let mut delivery = Delivery {
            data: b"7".to_vec(),
            ..Delivery::default()
        };
        assert_eq!(
            RpcRequest::from_delivery(&delivery),
            Err(AmqpError::MissingReplyMetadataError)
        );

        delivery.properties = MessageProperties::default()
            .with_correlation_id("c-1")
            .with_reply_to("amq.gen-1");
        assert_eq!(
            RpcRequest::from_delivery(&delivery),
            Ok(RpcRequest {
                correlation_id: "c-1".to_owned(),
                reply_to: "amq.gen-1".to_owned(),
                body: b"7".to_vec(),
            })
        );
    }

    #[test]
    fn request_message_carries_metadata() {
        let msg = RpcRequest {
            correlation_id: "c-1".to_owned(),
            reply_to: "amq.gen-1".to_owned(),
            body: b"7".to_vec(),
        }
        .to_message(RPC_QUEUE);

        assert_eq!(msg.routing_key, RPC_QUEUE);
        assert_eq!(msg.properties.correlation_id.as_deref(), Some("c-1"));
        assert_eq!(msg.properties.reply_to.as_deref(), Some("amq.gen-1"));
    }
}
