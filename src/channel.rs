// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Channel Management
//!
//! This module handles the creation of AMQP connections and channels and
//! provides `LapinChannel`, the [`BrokerChannel`] implementation backed by a
//! lapin channel.

use crate::{
    broker::{BrokerChannel, ConfirmReceiver, ConsumeOptions, DeliveryStream},
    configs::Configs,
    errors::AmqpError,
    exchange::ExchangeDefinition,
    message::{Confirmation, Delivery, DeliveryMode, MessageProperties, OutboundMessage},
    queue::{DeclaredQueue, QueueBinding, QueueDefinition},
    topology::{AMQP_HEADERS_DEAD_LETTER_EXCHANGE, AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY},
};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions, ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions,
        QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable, LongString, ShortString},
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, OnceLock,
    },
};
use tokio::sync::mpsc;
use tracing::{debug, error};
use uuid::Uuid;

/// Opens a connection to the configured broker and creates one channel on it.
///
/// The connection is returned alongside the channel so the caller controls
/// its lifetime; dropping it closes every channel opened on it.
pub async fn new_amqp_channel(
    cfg: &Configs,
) -> Result<(Arc<Connection>, Arc<LapinChannel>), AmqpError> {
    debug!("creating amqp connection...");
    let options = ConnectionProperties::default()
        .with_connection_name(LongString::from(cfg.app.name.clone()));

    let conn = match Connection::connect(&cfg.amqp_uri(), options).await {
        Ok(c) => Ok(c),
        Err(err) => {
            error!(error = err.to_string(), "failure to connect");
            Err(AmqpError::ConnectionError)
        }
    }?;
    debug!("amqp connected");

    let channel = open_channel(&conn).await?;
    Ok((Arc::new(conn), channel))
}

/// Creates one more channel on an open connection. Consumers that need
/// their own prefetch window each get a channel of their own.
pub async fn open_channel(conn: &Connection) -> Result<Arc<LapinChannel>, AmqpError> {
    debug!("creating amqp channel...");
    match conn.create_channel().await {
        Ok(c) => {
            debug!("channel created");
            Ok(Arc::new(LapinChannel::new(c)))
        }
        Err(err) => {
            error!(error = err.to_string(), "error to create the channel");
            Err(AmqpError::ChannelError)
        }
    }
}

/// [`BrokerChannel`] backed by a lapin channel.
pub struct LapinChannel {
    channel: Channel,
    confirms: OnceLock<mpsc::UnboundedSender<Confirmation>>,
    publish_seq: AtomicU64,
}

impl LapinChannel {
    pub fn new(channel: Channel) -> LapinChannel {
        LapinChannel {
            channel,
            confirms: OnceLock::new(),
            publish_seq: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl BrokerChannel for LapinChannel {
    async fn declare_queue(&self, def: &QueueDefinition) -> Result<DeclaredQueue, AmqpError> {
        let mut args = BTreeMap::new();

        if let Some(dlq_name) = &def.dlq_name {
            args.insert(
                ShortString::from(AMQP_HEADERS_DEAD_LETTER_EXCHANGE),
                AMQPValue::LongString(LongString::from("")),
            );
            args.insert(
                ShortString::from(AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY),
                AMQPValue::LongString(LongString::from(dlq_name.clone())),
            );
        }

        match self
            .channel
            .queue_declare(
                &def.name,
                QueueDeclareOptions {
                    passive: false,
                    durable: def.durable,
                    exclusive: def.exclusive,
                    auto_delete: def.delete,
                    nowait: false,
                },
                FieldTable::from(args),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), name = %def.name, "error to declare the queue");
                Err(AmqpError::DeclareQueueError(def.name.clone()))
            }
            Ok(queue) => Ok(DeclaredQueue {
                name: queue.name().as_str().to_owned(),
                message_count: queue.message_count(),
                consumer_count: queue.consumer_count(),
            }),
        }
    }

    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError> {
        match self
            .channel
            .exchange_declare(
                &def.name,
                def.kind.into(),
                ExchangeDeclareOptions {
                    passive: false,
                    durable: def.durable,
                    auto_delete: false,
                    internal: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), name = %def.name, "error to declare the exchange");
                Err(AmqpError::DeclareExchangeError(def.name.clone()))
            }
            _ => Ok(()),
        }
    }

    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError> {
        match self
            .channel
            .queue_bind(
                &binding.queue_name,
                &binding.exchange_name,
                &binding.routing_key,
                QueueBindOptions { nowait: false },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to bind queue to exchange");
                Err(AmqpError::BindingExchangeToQueueError(
                    binding.exchange_name.clone(),
                    binding.queue_name.clone(),
                ))
            }
            _ => Ok(()),
        }
    }

    async fn qos(&self, prefetch_count: u16) -> Result<(), AmqpError> {
        self.channel
            .basic_qos(prefetch_count, BasicQosOptions { global: false })
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error to configure qos");
                AmqpError::QoSDeclarationError(err.to_string())
            })
    }

    async fn consume(
        &self,
        queue: &str,
        options: ConsumeOptions,
    ) -> Result<DeliveryStream, AmqpError> {
        let consumer_tag = format!("{}-{}", queue, Uuid::new_v4());

        let consumer = match self
            .channel
            .basic_consume(
                queue,
                &consumer_tag,
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: options.auto_ack,
                    exclusive: options.exclusive,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to create the consumer");
                Err(AmqpError::BindingConsumerError(queue.to_owned()))
            }
            Ok(c) => Ok(c),
        }?;

        Ok(consumer
            .map(|result| {
                result
                    .map(Delivery::from)
                    .map_err(|err| AmqpError::ConsumerError(err.to_string()))
            })
            .boxed())
    }

    async fn publish(&self, msg: OutboundMessage) -> Result<(), AmqpError> {
        let confirm = match self
            .channel
            .basic_publish(
                &msg.exchange,
                &msg.routing_key,
                BasicPublishOptions {
                    immediate: false,
                    mandatory: false,
                },
                &msg.data,
                basic_properties(&msg.properties),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error publishing message");
                Err(AmqpError::PublishingError)
            }
            Ok(confirm) => Ok(confirm),
        }?;

        if let Some(tx) = self.confirms.get() {
            let delivery_tag = self.publish_seq.fetch_add(1, Ordering::SeqCst) + 1;
            let tx = tx.clone();

            tokio::spawn(async move {
                let ack = match confirm.await {
                    Ok(confirmation) => confirmation.is_ack(),
                    Err(err) => {
                        error!(error = err.to_string(), "error awaiting publisher confirm");
                        false
                    }
                };
                // the receiver may be gone once the publisher gave up
                let _ = tx.send(Confirmation { delivery_tag, ack });
            });
        }

        Ok(())
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), AmqpError> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions { multiple: false })
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error whiling ack msg");
                AmqpError::AckMessageError
            })
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), AmqpError> {
        self.channel
            .basic_nack(
                delivery_tag,
                BasicNackOptions {
                    multiple: false,
                    requeue,
                },
            )
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error whiling nack msg");
                AmqpError::NackMessageError
            })
    }

    async fn enable_confirms(&self) -> Result<ConfirmReceiver, AmqpError> {
        if self.confirms.get().is_some() {
            return Err(AmqpError::ConfirmSelectError("already enabled".to_owned()));
        }

        if let Err(err) = self
            .channel
            .confirm_select(ConfirmSelectOptions { nowait: false })
            .await
        {
            error!(error = err.to_string(), "error enabling publisher confirms");
            return Err(AmqpError::ConfirmSelectError(err.to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.confirms
            .set(tx)
            .map_err(|_| AmqpError::ConfirmSelectError("already enabled".to_owned()))?;

        Ok(rx)
    }
}

impl From<lapin::message::Delivery> for Delivery {
    fn from(delivery: lapin::message::Delivery) -> Delivery {
        Delivery {
            delivery_tag: delivery.delivery_tag,
            exchange: delivery.exchange.as_str().to_owned(),
            routing_key: delivery.routing_key.as_str().to_owned(),
            redelivered: delivery.redelivered,
            properties: message_properties(&delivery.properties),
            data: delivery.data,
        }
    }
}

fn message_properties(props: &BasicProperties) -> MessageProperties {
    let headers = match props.headers() {
        Some(table) => table
            .inner()
            .iter()
            .filter_map(|(key, value)| match value {
                AMQPValue::LongString(v) => Some((
                    key.as_str().to_owned(),
                    String::from_utf8_lossy(v.as_bytes()).into_owned(),
                )),
                AMQPValue::ShortString(v) => Some((key.as_str().to_owned(), v.as_str().to_owned())),
                _ => None,
            })
            .collect(),
        None => BTreeMap::new(),
    };

    MessageProperties {
        content_type: props.content_type().as_ref().map(|v| v.as_str().to_owned()),
        delivery_mode: props
            .delivery_mode()
            .map(DeliveryMode::from_amqp)
            .unwrap_or_default(),
        correlation_id: props.correlation_id().as_ref().map(|v| v.as_str().to_owned()),
        reply_to: props.reply_to().as_ref().map(|v| v.as_str().to_owned()),
        message_id: props.message_id().as_ref().map(|v| v.as_str().to_owned()),
        headers,
    }
}

fn basic_properties(props: &MessageProperties) -> BasicProperties {
    let headers: BTreeMap<ShortString, AMQPValue> = props
        .headers
        .iter()
        .map(|(key, value)| {
            (
                ShortString::from(key.clone()),
                AMQPValue::LongString(LongString::from(value.clone())),
            )
        })
        .collect();

    let mut basic = BasicProperties::default()
        .with_delivery_mode(props.delivery_mode.as_amqp())
        .with_headers(FieldTable::from(headers));

    if let Some(content_type) = &props.content_type {
        basic = basic.with_content_type(ShortString::from(content_type.clone()));
    }
    if let Some(correlation_id) = &props.correlation_id {
        basic = basic.with_correlation_id(ShortString::from(correlation_id.clone()));
    }
    if let Some(reply_to) = &props.reply_to {
        basic = basic.with_reply_to(ShortString::from(reply_to.clone()));
    }
    if let Some(message_id) = &props.message_id {
        basic = basic.with_message_id(ShortString::from(message_id.clone()));
    }

    basic
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties_survive_the_lapin_conversion() {
        let mut props = MessageProperties::default()
            .with_content_type("text/plain")
            .persistent()
            .with_correlation_id("ABCDEFGHIJKLMNOPQRSTUVWXYZABCDEF")
            .with_reply_to("amq.gen-reply");
        props
            .headers
            .insert("traceparent".to_owned(), "00-abc-def-01".to_owned());

        let converted = message_properties(&basic_properties(&props));

        assert_eq!(converted, props);
    }
}
