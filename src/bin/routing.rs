// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Direct routing by severity.
//!
//! ```bash
//! routing --mode subscriber --sevs warn-error
//! routing --mode publisher
//! ```

use clap::{Parser, ValueEnum};
use rabbitmq_patterns::{
    channel::new_amqp_channel,
    configs::Configs,
    errors::AmqpError,
    logging::init_logging,
    pubsub::{routing_exchange, LogPublisher, LogSubscriber},
    routing::{parse_severities, severity_log_line, Severity},
    shutdown::shutdown_token,
};
use rand::Rng;
use std::{process, time::Duration};
use tracing::{error, info};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    Publisher,
    Subscriber,
}

#[derive(Parser)]
#[command(name = "routing", about = "Route logs by severity through the `logs-routing` exchange")]
struct Args {
    #[arg(long, value_enum)]
    mode: Mode,

    /// One or more of 'info', 'warn' or 'error' (format: info-warn-error)
    #[arg(long, default_value = "info-warn-error")]
    sevs: String,

    /// Longest pause between two published logs, in seconds
    #[arg(long, default_value_t = 7)]
    max_pause: u64,
}

async fn run(
    mode: Mode,
    severities: Vec<Severity>,
    max_pause: u64,
    cfg: Configs,
) -> Result<(), AmqpError> {
    let (_conn, channel) = new_amqp_channel(&cfg).await?;
    let cancel = shutdown_token();

    match mode {
        Mode::Publisher => {
            let publisher = LogPublisher::new(channel, routing_exchange());
            publisher.declare().await?;

            let mut i: u64 = 0;
            while !cancel.is_cancelled() {
                let (severity, pause) = {
                    let mut rng = rand::thread_rng();
                    (Severity::random(&mut rng), rng.gen_range(0..max_pause.max(1)))
                };

                publisher
                    .publish(severity.as_str(), &severity_log_line(severity, i))
                    .await?;
                info!("#{} - {}", i, severity);
                i += 1;

                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(Duration::from_secs(pause)) => {}
                }
            }
        }
        Mode::Subscriber => {
            let keys = severities.iter().map(|sev| sev.to_string()).collect();
            let subscription = LogSubscriber::new(channel, routing_exchange(), keys)
                .subscribe()
                .await?;
            let received = subscription.run(cancel).await?;
            info!(received, "subscriber stopped");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let cfg = match Configs::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("{err}");
            process::exit(1);
        }
    };
    init_logging(&cfg.logging);

    let severities = match parse_severities(&args.sevs) {
        Ok(severities) => severities,
        Err(err) => {
            error!(error = err.to_string(), "invalid --sevs");
            process::exit(1);
        }
    };

    if let Err(err) = run(args.mode, severities, args.max_pause, cfg).await {
        error!(error = err.to_string(), "routing failed");
        process::exit(1);
    }
}
