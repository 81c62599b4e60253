// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Correlation Ids
//!
//! RPC clients tag each request with a correlation id and match replies on
//! it. Generators are injected into the client so tests can use
//! deterministic ids.

use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Length of generated correlation ids
pub const CORRELATION_ID_LEN: usize = 32;

/// Source of correlation ids. Ids must be unique among the calls a client
/// has in flight.
pub trait CorrelationIdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random 32-character ids (a v4 UUID without hyphens).
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdGenerator;

impl CorrelationIdGenerator for RandomIdGenerator {
    fn next_id(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}

/// Ids `<prefix>-1`, `<prefix>-2`, ... in call order.
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(prefix: &str) -> SequentialIdGenerator {
        SequentialIdGenerator {
            prefix: prefix.to_owned(),
            counter: AtomicU64::new(0),
        }
    }
}

impl CorrelationIdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}-{}", self.prefix, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn random_ids_have_the_expected_shape() {
        let id = RandomIdGenerator.next_id();
        assert_eq!(id.len(), CORRELATION_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn random_ids_do_not_repeat() {
        let ids: HashSet<String> = (0..1000).map(|_| RandomIdGenerator.next_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn sequential_ids_count_up() {
        let ids = SequentialIdGenerator::new("call");
        assert_eq!(ids.next_id(), "call-1");
        assert_eq!(ids.next_id(), "call-2");
    }
}
