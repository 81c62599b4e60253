// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Definitions
//!
//! Builders for queue declarations and queue-to-exchange bindings, including
//! the optional dead-letter queue used by the work queue when malformed tasks
//! are rejected instead of left pending.

/// Definition of a queue with its declaration flags.
///
/// An empty name asks the broker to generate one; the generated name is
/// returned by the declaration (see [`DeclaredQueue`]).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueDefinition {
    pub(crate) name: String,
    pub(crate) durable: bool,
    pub(crate) delete: bool,
    pub(crate) exclusive: bool,
    pub(crate) dlq_name: Option<String>,
}

impl QueueDefinition {
    /// Creates a transient, shared, non auto-deleting queue definition.
    pub fn new(name: &str) -> QueueDefinition {
        QueueDefinition {
            name: name.to_owned(),
            durable: false,
            delete: false,
            exclusive: false,
            dlq_name: None,
        }
    }

    /// Queue with a broker-generated name.
    pub fn server_named() -> QueueDefinition {
        QueueDefinition::new("")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn is_auto_delete(&self) -> bool {
        self.delete
    }

    /// Name of the dead-letter queue, when one is configured.
    pub fn dlq_name(&self) -> Option<&str> {
        self.dlq_name.as_deref()
    }

    /// Makes the queue survive broker restarts.
    ///
    /// Messages only survive as well when they are published persistent.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Deletes the queue once its last consumer is gone.
    pub fn delete(mut self) -> Self {
        self.delete = true;
        self
    }

    /// Restricts the queue to the declaring connection; it is dropped when
    /// that connection closes.
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// Adds a dead-letter queue named `<name>-dlq`. Messages rejected without
    /// requeue are moved there by the broker.
    pub fn with_dlq(mut self) -> Self {
        self.dlq_name = Some(format!("{}-dlq", self.name));
        self
    }
}

/// Result of a queue declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclaredQueue {
    /// Actual name; differs from the definition for server-named queues.
    pub name: String,
    /// Messages ready for delivery at declaration time.
    pub message_count: u32,
    pub consumer_count: u32,
}

/// Binding of a queue to an exchange with a routing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub(crate) queue_name: String,
    pub(crate) exchange_name: String,
    pub(crate) routing_key: String,
}

impl QueueBinding {
    /// Creates a binding for `queue`; exchange and routing key default to empty.
    pub fn new(queue: &str) -> QueueBinding {
        QueueBinding {
            queue_name: queue.to_owned(),
            exchange_name: String::new(),
            routing_key: String::new(),
        }
    }

    pub fn exchange(mut self, exchange: &str) -> Self {
        self.exchange_name = exchange.to_owned();
        self
    }

    pub fn routing_key(mut self, key: &str) -> Self {
        self.routing_key = key.to_owned();
        self
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn exchange_name(&self) -> &str {
        &self.exchange_name
    }

    pub fn key(&self) -> &str {
        &self.routing_key
    }
}
