// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use super::{rpc_queue, RequestHandler, RpcRequest, RpcResponse, SERVER_PREFETCH};
use crate::{
    broker::{BrokerChannel, ConsumeOptions},
    errors::AmqpError,
    message::Delivery,
    otel,
    publisher::AmqpPublisher,
    topology::{AmqpTopology, Topology},
};
use futures_util::{future::join_all, StreamExt};
use opentelemetry::{
    trace::{Span, Status},
    Context,
};
use std::{borrow::Cow, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Progress of one request through a server. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RequestState {
    Received,
    Computing,
    Replied,
    Acknowledged,
}

impl RequestState {
    fn advance(&mut self, server: usize, next: RequestState) {
        debug_assert!(next > *self, "request state moved backwards");
        debug!(server, from = ?self, to = ?next, "rpc request state");
        *self = next;
    }
}

/// How a request left the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Reply published, then the request acknowledged.
    Answered,
    /// No correlation id or reply queue: acknowledged and dropped.
    Dropped,
    /// Body not understood: rejected without requeue.
    Rejected,
}

/// One member of the server pool. Each server should own its channel so the
/// broker's prefetch of one applies per server.
pub struct RpcServer {
    id: usize,
    channel: Arc<dyn BrokerChannel>,
    publisher: AmqpPublisher,
    handler: Arc<dyn RequestHandler>,
}

impl RpcServer {
    pub fn new(
        id: usize,
        channel: Arc<dyn BrokerChannel>,
        handler: Arc<dyn RequestHandler>,
    ) -> RpcServer {
        RpcServer {
            id,
            publisher: AmqpPublisher::new(channel.clone()),
            channel,
            handler,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Serves requests until `cancel` fires or the consumer is closed,
    /// returning the number of requests answered. A delivery stream error
    /// ends the server with that error.
    pub async fn serve(&self, cancel: CancellationToken) -> Result<u64, AmqpError> {
        AmqpTopology::new(self.channel.clone())
            .queue(rpc_queue())
            .install()
            .await?;
        self.channel.qos(SERVER_PREFETCH).await?;

        let mut deliveries = self
            .channel
            .consume(rpc_queue().name(), ConsumeOptions::manual_ack())
            .await?;

        info!(server = self.id, "awaiting rpc requests");

        let mut answered = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(server = self.id, "rpc server stopping");
                    break;
                }
                next = deliveries.next() => next,
            };

            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(err)) => {
                    error!(server = self.id, error = err.to_string(), "errors consume msg");
                    return Err(err);
                }
                None => {
                    warn!(server = self.id, "consumer stream closed");
                    break;
                }
            };

            if self.handle(&delivery).await? == RequestOutcome::Answered {
                answered += 1;
            }
        }

        Ok(answered)
    }

    /// Handles one request. The reply is published before the request is
    /// acknowledged, so a crash in between leads to a redelivery and a
    /// duplicate reply rather than a lost one.
    pub async fn handle(&self, delivery: &Delivery) -> Result<RequestOutcome, AmqpError> {
        let (_ctx, mut span) = otel::consumer_span(&delivery.properties, "rpc request");
        let mut state = RequestState::Received;

        info!(
            server = self.id,
            redelivered = delivery.redelivered,
            "received new rpc request: {}",
            delivery.body_lossy()
        );

        let request = match RpcRequest::from_delivery(delivery) {
            Ok(request) => request,
            Err(err) => {
                warn!(
                    server = self.id,
                    delivery_tag = delivery.delivery_tag,
                    "dropping rpc request without reply metadata"
                );
                span.record_error(&err);
                self.channel.ack(delivery.delivery_tag).await?;
                return Ok(RequestOutcome::Dropped);
            }
        };

        state.advance(self.id, RequestState::Computing);

        let body = match self.handler.handle(&request.body) {
            Ok(body) => body,
            Err(err) => {
                warn!(
                    server = self.id,
                    error = err.to_string(),
                    "rejecting rpc request"
                );
                span.record_error(&err);
                span.set_status(Status::Error {
                    description: Cow::from("invalid rpc request"),
                });
                self.channel.nack(delivery.delivery_tag, false).await?;
                return Ok(RequestOutcome::Rejected);
            }
        };

        let response = RpcResponse {
            correlation_id: request.correlation_id,
            body,
        };

        self.publisher
            .publish(&Context::current(), response.to_message(&request.reply_to))
            .await?;
        state.advance(self.id, RequestState::Replied);

        info!(
            server = self.id,
            correlation_id = %response.correlation_id,
            "replied: {}",
            String::from_utf8_lossy(&response.body)
        );

        self.channel.ack(delivery.delivery_tag).await?;
        state.advance(self.id, RequestState::Acknowledged);
        span.set_status(Status::Ok);

        Ok(RequestOutcome::Answered)
    }
}

/// Runs every server concurrently until `cancel` fires. A server failing
/// stops the whole pool and its error is returned.
pub async fn serve_pool(
    servers: Vec<RpcServer>,
    cancel: CancellationToken,
) -> Result<u64, AmqpError> {
    let pool = cancel.child_token();

    let handles = servers.into_iter().map(|server| {
        let pool = pool.clone();
        tokio::spawn(async move {
            let result = server.serve(pool.clone()).await;
            if let Err(err) = &result {
                error!(server = server.id(), error = err.to_string(), "rpc server failed");
                pool.cancel();
            }
            result
        })
    });

    let mut answered = 0;
    let mut failure = None;

    for joined in join_all(handles).await {
        match joined {
            Ok(Ok(n)) => answered += n,
            Ok(Err(err)) => {
                failure.get_or_insert(err);
            }
            Err(err) => {
                error!(error = err.to_string(), "rpc server task panicked");
                failure.get_or_insert(AmqpError::InternalError);
            }
        }
    }

    match failure {
        Some(err) => Err(err),
        None => Ok(answered),
    }
}
