// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! In-memory broker for integration tests.
//!
//! Implements just enough of the broker semantics the patterns rely on:
//! default, direct, fanout and topic exchanges, server-named queues,
//! per-channel prefetch, manual and automatic acknowledgement, publisher
//! confirms, and redelivery of unacknowledged messages when a channel is
//! closed.

#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use rabbitmq_patterns::{
    broker::{BrokerChannel, ConfirmReceiver, ConsumeOptions, DeliveryStream},
    errors::AmqpError,
    exchange::{ExchangeDefinition, ExchangeKind},
    message::{Confirmation, Delivery, MessageProperties, OutboundMessage},
    queue::{DeclaredQueue, QueueBinding, QueueDefinition},
};
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
struct Stored {
    exchange: String,
    routing_key: String,
    properties: MessageProperties,
    data: Vec<u8>,
    redelivered: bool,
    delivery_count: u32,
}

#[derive(Default)]
struct QueueState {
    durable: bool,
    messages: VecDeque<Stored>,
}

struct ConsumerState {
    channel: u64,
    queue: String,
    auto_ack: bool,
    tx: mpsc::UnboundedSender<Result<Delivery, AmqpError>>,
}

#[derive(Default)]
struct ChannelState {
    open: bool,
    prefetch: u16,
    next_tag: u64,
    unacked: HashMap<u64, (String, Stored)>,
    max_unacked: usize,
    acks: u64,
    nacks: u64,
    confirms: Option<mpsc::UnboundedSender<Confirmation>>,
    next_publish: u64,
}

/// One delivery made by the broker, for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRecord {
    pub channel: u64,
    pub queue: String,
    pub body: String,
    pub redelivered: bool,
    pub delivery_count: u32,
}

#[derive(Default)]
struct BrokerState {
    queues: HashMap<String, QueueState>,
    exchanges: HashMap<String, ExchangeKind>,
    bindings: Vec<QueueBinding>,
    channels: HashMap<u64, ChannelState>,
    consumers: Vec<ConsumerState>,
    next_channel: u64,
    next_queue: u64,
    round_robin: usize,
    log: Vec<DeliveryRecord>,
}

#[derive(Clone, Default)]
pub struct FakeBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl FakeBroker {
    pub fn new() -> FakeBroker {
        FakeBroker::default()
    }

    /// Opens a new channel on the broker.
    pub fn channel(&self) -> Arc<FakeChannel> {
        let mut state = self.state.lock().unwrap();
        state.next_channel += 1;
        let id = state.next_channel;
        state.channels.insert(
            id,
            ChannelState {
                open: true,
                ..ChannelState::default()
            },
        );

        Arc::new(FakeChannel {
            id,
            state: self.state.clone(),
        })
    }

    /// Closes a channel the way a crashing client would: its consumers are
    /// cancelled and every unacknowledged delivery goes back to the head of
    /// its queue, flagged as redelivered.
    pub fn close_channel(&self, channel: u64) {
        let mut state = self.state.lock().unwrap();
        state.consumers.retain(|c| c.channel != channel);

        let unacked = match state.channels.get_mut(&channel) {
            Some(ch) => {
                ch.open = false;
                let mut pending: Vec<(u64, (String, Stored))> = ch.unacked.drain().collect();
                pending.sort_by_key(|(tag, _)| *tag);
                pending
            }
            None => return,
        };

        for (_, (queue, mut msg)) in unacked.into_iter().rev() {
            msg.redelivered = true;
            if let Some(q) = state.queues.get_mut(&queue) {
                q.messages.push_front(msg);
            }
        }

        dispatch(&mut state);
    }

    /// Messages ready in `queue`, not counting unacknowledged ones.
    pub fn queue_depth(&self, queue: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.queues.get(queue).map_or(0, |q| q.messages.len())
    }

    pub fn queue_exists(&self, queue: &str) -> bool {
        self.state.lock().unwrap().queues.contains_key(queue)
    }

    pub fn consumer_count(&self, queue: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.consumers.iter().filter(|c| c.queue == queue).count()
    }

    pub fn is_durable(&self, queue: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.queues.get(queue).is_some_and(|q| q.durable)
    }

    pub fn unacked(&self, channel: u64) -> usize {
        let state = self.state.lock().unwrap();
        state.channels.get(&channel).map_or(0, |c| c.unacked.len())
    }

    pub fn max_unacked(&self, channel: u64) -> usize {
        let state = self.state.lock().unwrap();
        state.channels.get(&channel).map_or(0, |c| c.max_unacked)
    }

    pub fn acks(&self, channel: u64) -> u64 {
        let state = self.state.lock().unwrap();
        state.channels.get(&channel).map_or(0, |c| c.acks)
    }

    pub fn nacks(&self, channel: u64) -> u64 {
        let state = self.state.lock().unwrap();
        state.channels.get(&channel).map_or(0, |c| c.nacks)
    }

    /// Every delivery made so far, in order.
    pub fn deliveries(&self) -> Vec<DeliveryRecord> {
        self.state.lock().unwrap().log.clone()
    }

    /// Injects a message as if another client had published it.
    pub fn inject(&self, msg: OutboundMessage) {
        let mut state = self.state.lock().unwrap();
        route(&mut state, msg);
        dispatch(&mut state);
    }

    /// Polls `check` until it holds, failing the test after two seconds.
    pub async fn wait_until<F>(&self, what: &str, check: F)
    where
        F: Fn(&FakeBroker) -> bool,
    {
        for _ in 0..400 {
            if check(self) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting until {what}");
    }
}

pub struct FakeChannel {
    id: u64,
    state: Arc<Mutex<BrokerState>>,
}

impl FakeChannel {
    pub fn id(&self) -> u64 {
        self.id
    }

    fn ensure_open(state: &BrokerState, id: u64) -> Result<(), AmqpError> {
        match state.channels.get(&id) {
            Some(ch) if ch.open => Ok(()),
            _ => Err(AmqpError::ChannelError),
        }
    }
}

/// Topic exchange matching: `*` is exactly one word, `#` zero or more.
pub fn topic_matches(pattern: &[&str], key: &[&str]) -> bool {
    match (pattern.first(), key.first()) {
        (None, None) => true,
        (Some(&"#"), _) => {
            topic_matches(&pattern[1..], key)
                || (!key.is_empty() && topic_matches(pattern, &key[1..]))
        }
        (Some(&"*"), Some(_)) => topic_matches(&pattern[1..], &key[1..]),
        (Some(p), Some(k)) if p == k => topic_matches(&pattern[1..], &key[1..]),
        _ => false,
    }
}

fn route(state: &mut BrokerState, msg: OutboundMessage) {
    let targets: Vec<String> = if msg.exchange.is_empty() {
        vec![msg.routing_key.clone()]
    } else {
        let kind = match state.exchanges.get(&msg.exchange) {
            Some(kind) => *kind,
            None => return,
        };
        let mut targets: Vec<String> = state
            .bindings
            .iter()
            .filter(|b| b.exchange_name() == msg.exchange)
            .filter(|b| match kind {
                ExchangeKind::Fanout => true,
                ExchangeKind::Direct => b.key() == msg.routing_key,
                ExchangeKind::Topic => {
                    let pattern: Vec<&str> = b.key().split('.').collect();
                    let key: Vec<&str> = msg.routing_key.split('.').collect();
                    topic_matches(&pattern, &key)
                }
            })
            .map(|b| b.queue_name().to_owned())
            .collect();
        targets.sort();
        targets.dedup();
        targets
    };

    for target in targets {
        if let Some(queue) = state.queues.get_mut(&target) {
            queue.messages.push_back(Stored {
                exchange: msg.exchange.clone(),
                routing_key: msg.routing_key.clone(),
                properties: msg.properties.clone(),
                data: msg.data.clone(),
                redelivered: false,
                delivery_count: 0,
            });
        }
    }
}

/// Hands ready messages to consumers round-robin, honouring each channel's
/// prefetch window.
fn dispatch(state: &mut BrokerState) {
    loop {
        let mut delivered = false;
        let count = state.consumers.len();

        for offset in 0..count {
            let idx = (state.round_robin + offset) % count;
            let (channel, queue, auto_ack) = {
                let c = &state.consumers[idx];
                (c.channel, c.queue.clone(), c.auto_ack)
            };

            let has_room = state.channels.get(&channel).is_some_and(|ch| {
                ch.open && (auto_ack || ch.prefetch == 0 || ch.unacked.len() < ch.prefetch as usize)
            });
            if !has_room {
                continue;
            }

            let Some(mut msg) = state
                .queues
                .get_mut(&queue)
                .and_then(|q| q.messages.pop_front())
            else {
                continue;
            };
            msg.delivery_count += 1;

            let Some(ch) = state.channels.get_mut(&channel) else {
                continue;
            };
            ch.next_tag += 1;
            let tag = ch.next_tag;
            if !auto_ack {
                ch.unacked.insert(tag, (queue.clone(), msg.clone()));
                ch.max_unacked = ch.max_unacked.max(ch.unacked.len());
            }

            state.log.push(DeliveryRecord {
                channel,
                queue: queue.clone(),
                body: String::from_utf8_lossy(&msg.data).into_owned(),
                redelivered: msg.redelivered,
                delivery_count: msg.delivery_count,
            });

            let delivery = Delivery {
                delivery_tag: tag,
                exchange: msg.exchange,
                routing_key: msg.routing_key,
                redelivered: msg.redelivered,
                properties: msg.properties,
                data: msg.data,
            };
            // a consumer whose stream was dropped is cleaned up on its next turn
            let _ = state.consumers[idx].tx.send(Ok(delivery));

            state.round_robin = (idx + 1) % count;
            delivered = true;
            break;
        }

        state.consumers.retain(|c| !c.tx.is_closed());
        if !delivered {
            return;
        }
    }
}

#[async_trait]
impl BrokerChannel for FakeChannel {
    async fn declare_queue(&self, def: &QueueDefinition) -> Result<DeclaredQueue, AmqpError> {
        let mut state = self.state.lock().unwrap();
        FakeChannel::ensure_open(&state, self.id)?;

        let name = if def.name().is_empty() {
            state.next_queue += 1;
            format!("amq.gen-{}", state.next_queue)
        } else {
            def.name().to_owned()
        };

        if let Some(existing) = state.queues.get(&name) {
            if existing.durable != def.is_durable() {
                return Err(AmqpError::DeclareQueueError(name));
            }
        }

        if let Some(dlq) = def.dlq_name() {
            state.queues.entry(dlq.to_owned()).or_insert_with(|| QueueState {
                durable: def.is_durable(),
                ..QueueState::default()
            });
        }

        let queue = state.queues.entry(name.clone()).or_insert_with(|| QueueState {
            durable: def.is_durable(),
            ..QueueState::default()
        });
        let message_count = queue.messages.len() as u32;
        let consumer_count = state.consumers.iter().filter(|c| c.queue == name).count() as u32;

        Ok(DeclaredQueue {
            name,
            message_count,
            consumer_count,
        })
    }

    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError> {
        let mut state = self.state.lock().unwrap();
        FakeChannel::ensure_open(&state, self.id)?;

        match state.exchanges.get(def.name()) {
            Some(kind) if *kind != def.exchange_kind() => {
                Err(AmqpError::DeclareExchangeError(def.name().to_owned()))
            }
            _ => {
                state
                    .exchanges
                    .insert(def.name().to_owned(), def.exchange_kind());
                Ok(())
            }
        }
    }

    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError> {
        let mut state = self.state.lock().unwrap();
        FakeChannel::ensure_open(&state, self.id)?;

        if !state.queues.contains_key(binding.queue_name())
            || !state.exchanges.contains_key(binding.exchange_name())
        {
            return Err(AmqpError::BindingExchangeToQueueError(
                binding.exchange_name().to_owned(),
                binding.queue_name().to_owned(),
            ));
        }

        if !state.bindings.contains(binding) {
            state.bindings.push(binding.clone());
        }
        Ok(())
    }

    async fn qos(&self, prefetch_count: u16) -> Result<(), AmqpError> {
        let mut state = self.state.lock().unwrap();
        FakeChannel::ensure_open(&state, self.id)?;

        if let Some(ch) = state.channels.get_mut(&self.id) {
            ch.prefetch = prefetch_count;
        }
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        options: ConsumeOptions,
    ) -> Result<DeliveryStream, AmqpError> {
        let mut state = self.state.lock().unwrap();
        FakeChannel::ensure_open(&state, self.id)?;

        if !state.queues.contains_key(queue) {
            return Err(AmqpError::BindingConsumerError(queue.to_owned()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.consumers.push(ConsumerState {
            channel: self.id,
            queue: queue.to_owned(),
            auto_ack: options.auto_ack,
            tx,
        });
        dispatch(&mut state);

        Ok(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|delivery| (delivery, rx))
        })
        .boxed())
    }

    async fn publish(&self, msg: OutboundMessage) -> Result<(), AmqpError> {
        let mut state = self.state.lock().unwrap();
        FakeChannel::ensure_open(&state, self.id)?;

        if let Some(ch) = state.channels.get_mut(&self.id) {
            if let Some(confirms) = &ch.confirms {
                ch.next_publish += 1;
                let _ = confirms.send(Confirmation {
                    delivery_tag: ch.next_publish,
                    ack: true,
                });
            }
        }

        route(&mut state, msg);
        dispatch(&mut state);
        Ok(())
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), AmqpError> {
        let mut state = self.state.lock().unwrap();
        FakeChannel::ensure_open(&state, self.id)?;

        let ch = state
            .channels
            .get_mut(&self.id)
            .ok_or(AmqpError::ChannelError)?;
        if ch.unacked.remove(&delivery_tag).is_none() {
            return Err(AmqpError::AckMessageError);
        }
        ch.acks += 1;

        dispatch(&mut state);
        Ok(())
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), AmqpError> {
        let mut state = self.state.lock().unwrap();
        FakeChannel::ensure_open(&state, self.id)?;

        let ch = state
            .channels
            .get_mut(&self.id)
            .ok_or(AmqpError::ChannelError)?;
        let (queue, mut msg) = ch
            .unacked
            .remove(&delivery_tag)
            .ok_or(AmqpError::NackMessageError)?;
        ch.nacks += 1;

        if requeue {
            msg.redelivered = true;
            if let Some(q) = state.queues.get_mut(&queue) {
                q.messages.push_front(msg);
            }
        } else {
            let dlq = format!("{queue}-dlq");
            if let Some(q) = state.queues.get_mut(&dlq) {
                q.messages.push_back(msg);
            }
        }

        dispatch(&mut state);
        Ok(())
    }

    async fn enable_confirms(&self) -> Result<ConfirmReceiver, AmqpError> {
        let mut state = self.state.lock().unwrap();
        FakeChannel::ensure_open(&state, self.id)?;

        let ch = state
            .channels
            .get_mut(&self.id)
            .ok_or(AmqpError::ChannelError)?;
        if ch.confirms.is_some() {
            return Err(AmqpError::ConfirmSelectError("already enabled".to_owned()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        ch.confirms = Some(tx);
        Ok(rx)
    }
}
