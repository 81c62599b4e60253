// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Returns a token cancelled on the first Ctrl-C. Must be called from within
/// a tokio runtime.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let on_signal = token.clone();

    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                on_signal.cancel();
            }
            Err(err) => error!(error = err.to_string(), "unable to listen for shutdown signal"),
        }
    });

    token
}
