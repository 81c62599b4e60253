// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Definitions
//!
//! Exchanges are the routing entities of the broker. The patterns only ever
//! declare them; the routing itself (fanout, exact key match, topic wildcards)
//! happens inside the broker.

/// Represents the types of exchanges used by the patterns.
///
/// - Direct: routes to queues whose binding key equals the routing key
/// - Fanout: broadcasts to all bound queues regardless of routing keys
/// - Topic: routes on dot-separated keys with `*` and `#` wildcards
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExchangeKind {
    #[default]
    Direct,
    Fanout,
    Topic,
}

impl From<ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: ExchangeKind) -> lapin::ExchangeKind {
        match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
        }
    }
}

/// Definition of an exchange with its declaration flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeDefinition {
    pub(crate) name: String,
    pub(crate) kind: ExchangeKind,
    pub(crate) durable: bool,
}

impl ExchangeDefinition {
    /// Creates a non-durable direct exchange definition.
    pub fn new(name: &str) -> ExchangeDefinition {
        ExchangeDefinition {
            name: name.to_owned(),
            kind: ExchangeKind::Direct,
            durable: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exchange_kind(&self) -> ExchangeKind {
        self.kind
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub fn kind(mut self, kind: ExchangeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn direct(self) -> Self {
        self.kind(ExchangeKind::Direct)
    }

    pub fn fanout(self) -> Self {
        self.kind(ExchangeKind::Fanout)
    }

    pub fn topic(self) -> Self {
        self.kind(ExchangeKind::Topic)
    }

    /// Makes the exchange survive broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_kind_and_flags() {
        let def = ExchangeDefinition::new("logs").fanout().durable();
        assert_eq!(def.name(), "logs");
        assert_eq!(def.kind, ExchangeKind::Fanout);
        assert!(def.durable);
    }

    #[test]
    fn maps_to_lapin_kinds() {
        assert!(matches!(
            lapin::ExchangeKind::from(ExchangeKind::Topic),
            lapin::ExchangeKind::Topic
        ));
        assert!(matches!(
            lapin::ExchangeKind::from(ExchangeKind::Fanout),
            lapin::ExchangeKind::Fanout
        ));
    }
}
