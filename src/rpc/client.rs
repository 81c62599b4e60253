// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use super::{rpc_queue, RpcRequest, RpcResponse, RPC_QUEUE};
use crate::{
    broker::{BrokerChannel, ConsumeOptions, DeliveryStream},
    correlation::CorrelationIdGenerator,
    errors::AmqpError,
    publisher::AmqpPublisher,
    queue::QueueDefinition,
};
use futures_util::StreamExt;
use opentelemetry::Context;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Caller side of the RPC pattern.
///
/// Each client owns a server-named, exclusive reply queue consumed with
/// automatic acknowledgement. Calls are issued one at a time; `call` borrows
/// the client mutably for the whole round trip.
pub struct RpcClient {
    publisher: AmqpPublisher,
    ids: Arc<dyn CorrelationIdGenerator>,
    reply_queue: String,
    replies: DeliveryStream,
}

impl RpcClient {
    /// Declares the reply queue and starts consuming it. The shared request
    /// queue is declared as well so requests published before any server
    /// starts are kept.
    pub async fn connect(
        channel: Arc<dyn BrokerChannel>,
        ids: Arc<dyn CorrelationIdGenerator>,
    ) -> Result<RpcClient, AmqpError> {
        channel.declare_queue(&rpc_queue()).await?;

        let reply = channel
            .declare_queue(&QueueDefinition::server_named().exclusive().delete())
            .await?;

        let replies = channel
            .consume(&reply.name, ConsumeOptions::auto_ack().exclusive())
            .await?;

        info!(reply_queue = %reply.name, "rpc client ready");

        Ok(RpcClient {
            publisher: AmqpPublisher::new(channel),
            ids,
            reply_queue: reply.name,
            replies,
        })
    }

    /// Name the broker assigned to the reply queue.
    pub fn reply_queue(&self) -> &str {
        &self.reply_queue
    }

    /// Sends `body` to the servers and waits for the matching response.
    ///
    /// Replies carrying any other correlation id are stale (a redelivered
    /// request answered twice, or a call this client gave up on) and are
    /// dropped. There is no timeout: the wait ends on the matching reply,
    /// when `cancel` fires, or when the reply consumer fails or is closed.
    pub async fn call(
        &mut self,
        body: &[u8],
        cancel: &CancellationToken,
    ) -> Result<RpcResponse, AmqpError> {
        let request = RpcRequest {
            correlation_id: self.ids.next_id(),
            reply_to: self.reply_queue.clone(),
            body: body.to_vec(),
        };

        self.publisher
            .publish(&Context::current(), request.to_message(RPC_QUEUE))
            .await?;

        debug!(correlation_id = %request.correlation_id, "rpc request sent");

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AmqpError::Cancelled),
                next = self.replies.next() => next,
            };

            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(err)) => {
                    error!(error = err.to_string(), "errors consume reply");
                    return Err(err);
                }
                None => return Err(AmqpError::ConsumerClosed),
            };

            if delivery.properties.correlation_id.as_deref()
                != Some(request.correlation_id.as_str())
            {
                debug!(
                    expected = %request.correlation_id,
                    received = ?delivery.properties.correlation_id,
                    "dropping reply of another call"
                );
                continue;
            }

            return Ok(RpcResponse {
                correlation_id: request.correlation_id,
                body: delivery.data,
            });
        }
    }

    /// Asks the servers for the n-th Fibonacci number.
    pub async fn fib(&mut self, n: u32, cancel: &CancellationToken) -> Result<u64, AmqpError> {
        let response = self.call(n.to_string().as_bytes(), cancel).await?;
        let text = String::from_utf8_lossy(&response.body);

        text.trim()
            .parse()
            .map_err(|_| AmqpError::ParsePayloadError(format!("`{text}` is not a number")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        broker::MockBrokerChannel,
        correlation::SequentialIdGenerator,
        message::{Delivery, MessageProperties},
        queue::DeclaredQueue,
    };
    use futures_util::stream;

    fn reply(correlation_id: &str, body: &[u8]) -> Result<Delivery, AmqpError> {
        Ok(Delivery {
            data: body.to_vec(),
            properties: MessageProperties::default().with_correlation_id(correlation_id),
            ..Delivery::default()
        })
    }

    fn mock_channel(replies: Vec<Result<Delivery, AmqpError>>) -> MockBrokerChannel {
        let mut channel = MockBrokerChannel::new();
        channel
            .expect_declare_queue()
            .withf(|def| def.name() == RPC_QUEUE && !def.is_durable())
            .times(1)
            .returning(|def| {
                Ok(DeclaredQueue {
                    name: def.name().to_owned(),
                    ..DeclaredQueue::default()
                })
            });
        channel
            .expect_declare_queue()
            .withf(|def| def.name().is_empty() && def.is_exclusive() && def.is_auto_delete())
            .times(1)
            .returning(|_| {
                Ok(DeclaredQueue {
                    name: "amq.gen-1".to_owned(),
                    ..DeclaredQueue::default()
                })
            });

        let mut replies = Some(replies);
        channel
            .expect_consume()
            .withf(|queue, opts| queue == "amq.gen-1" && opts.auto_ack && opts.exclusive)
            .times(1)
            .returning(move |_, _| {
                let items = replies.take().unwrap_or_default();
                Ok(stream::iter(items).boxed())
            });
        channel
    }

    #[tokio::test]
    async fn publishes_request_with_reply_metadata() {
        let mut channel = mock_channel(vec![reply("call-1", b"13")]);
        channel
            .expect_publish()
            .withf(|msg| {
                msg.routing_key == RPC_QUEUE
                    && msg.data == b"7"
                    && msg.properties.correlation_id.as_deref() == Some("call-1")
                    && msg.properties.reply_to.as_deref() == Some("amq.gen-1")
            })
            .times(1)
            .returning(|_| Ok(()));

        let mut client = RpcClient::connect(
            Arc::new(channel),
            Arc::new(SequentialIdGenerator::new("call")),
        )
        .await
        .unwrap();

        assert_eq!(client.reply_queue(), "amq.gen-1");
        assert_eq!(client.fib(7, &CancellationToken::new()).await.unwrap(), 13);
    }

    #[tokio::test]
    async fn drops_replies_of_other_calls() {
        let mut channel = mock_channel(vec![
            reply("stale", b"1"),
            reply("call-1", b"55"),
        ]);
        channel.expect_publish().returning(|_| Ok(()));

        let mut client = RpcClient::connect(
            Arc::new(channel),
            Arc::new(SequentialIdGenerator::new("call")),
        )
        .await
        .unwrap();

        let response = client.call(b"10", &CancellationToken::new()).await.unwrap();
        assert_eq!(response.correlation_id, "call-1");
        assert_eq!(response.body, b"55");
    }

    #[tokio::test]
    async fn connection_loss_fails_the_call() {
        let mut channel = mock_channel(vec![
            reply("stale", b"1"),
            Err(AmqpError::ConsumerError(
                "IO error: connection reset".to_owned(),
            )),
            reply("call-1", b"55"),
        ]);
        channel.expect_publish().returning(|_| Ok(()));

        let mut client = RpcClient::connect(
            Arc::new(channel),
            Arc::new(SequentialIdGenerator::new("call")),
        )
        .await
        .unwrap();

        assert_eq!(
            client.call(b"10", &CancellationToken::new()).await,
            Err(AmqpError::ConsumerError(
                "IO error: connection reset".to_owned()
            ))
        );
    }

    #[tokio::test]
    async fn closed_reply_consumer_fails_the_call() {
        let mut channel = mock_channel(vec![reply("stale", b"1")]);
        channel.expect_publish().returning(|_| Ok(()));

        let mut client = RpcClient::connect(
            Arc::new(channel),
            Arc::new(SequentialIdGenerator::new("call")),
        )
        .await
        .unwrap();

        assert_eq!(
            client.call(b"10", &CancellationToken::new()).await,
            Err(AmqpError::ConsumerClosed)
        );
    }

    #[tokio::test]
    async fn cancelled_call_returns() {
        let mut channel = MockBrokerChannel::new();
        channel.expect_declare_queue().returning(|def| {
            Ok(DeclaredQueue {
                name: if def.name().is_empty() {
                    "amq.gen-2".to_owned()
                } else {
                    def.name().to_owned()
                },
                ..DeclaredQueue::default()
            })
        });
        channel
            .expect_consume()
            .returning(|_, _| Ok(stream::pending().boxed()));
        channel.expect_publish().returning(|_| Ok(()));

        let mut client = RpcClient::connect(
            Arc::new(channel),
            Arc::new(SequentialIdGenerator::new("call")),
        )
        .await
        .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(client.call(b"3", &cancel).await, Err(AmqpError::Cancelled));
    }
}
