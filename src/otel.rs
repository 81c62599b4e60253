// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # OpenTelemetry Integration
//!
//! Propagates trace context through message headers. Publishers inject the
//! current context; the task worker and the RPC server extract it and start
//! a consumer span per delivery, so a request can be followed across the
//! broker hop.

use crate::message::MessageProperties;
use opentelemetry::{
    global::{self, BoxedSpan},
    propagation::{Extractor, Injector},
    trace::{SpanKind, Tracer},
    Context,
};
use std::{borrow::Cow, collections::BTreeMap};

/// Writes propagation fields into message headers.
pub(crate) struct HeaderInjector<'a> {
    headers: &'a mut BTreeMap<String, String>,
}

impl<'a> HeaderInjector<'a> {
    pub(crate) fn new(headers: &'a mut BTreeMap<String, String>) -> Self {
        Self { headers }
    }
}

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.headers.insert(key.to_lowercase(), value);
    }
}

/// Reads propagation fields from message headers.
pub(crate) struct HeaderExtractor<'a> {
    headers: &'a BTreeMap<String, String>,
}

impl<'a> HeaderExtractor<'a> {
    pub(crate) fn new(headers: &'a BTreeMap<String, String>) -> Self {
        Self { headers }
    }
}

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(|value| value.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        self.headers.keys().map(|key| key.as_str()).collect()
    }
}

/// Injects `ctx` into the headers of an outgoing message.
pub fn inject_context(ctx: &Context, props: &mut MessageProperties) {
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(ctx, &mut HeaderInjector::new(&mut props.headers))
    });
}

/// Starts a consumer span named `name`, parented on the context carried by
/// the delivery's headers.
pub fn consumer_span(props: &MessageProperties, name: &str) -> (Context, BoxedSpan) {
    let ctx = global::get_text_map_propagator(|propagator| {
        propagator.extract(&HeaderExtractor::new(&props.headers))
    });

    let tracer = global::tracer("amqp consumer");
    let span = tracer
        .span_builder(Cow::from(name.to_owned()))
        .with_kind(SpanKind::Consumer)
        .start_with_context(&tracer, &ctx);

    (ctx, span)
}
