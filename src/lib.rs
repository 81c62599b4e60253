// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Messaging patterns over an AMQP 0-9-1 broker: point-to-point delivery,
//! a competing-consumer work queue, publish/subscribe with fanout, direct and
//! topic exchanges, RPC with correlation ids and publisher confirms.

mod consumer;
mod otel;

pub mod broker;
pub mod channel;
pub mod configs;
pub mod confirm;
pub mod correlation;
pub mod dispatcher;
pub mod errors;
pub mod exchange;
pub mod hello;
pub mod logging;
pub mod message;
pub mod publisher;
pub mod pubsub;
pub mod queue;
pub mod routing;
pub mod rpc;
pub mod shutdown;
pub mod task;
pub mod topology;

pub use consumer::{MalformedPolicy, TaskOutcome};
