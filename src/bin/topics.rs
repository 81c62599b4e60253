// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Topic routing by `<facility>.<severity>`.
//!
//! ```bash
//! topics --mode subscriber --bind 'nginx.*' --bind '*.error'
//! topics --mode publisher
//! ```

use clap::{Parser, ValueEnum};
use futures_util::future::join_all;
use rabbitmq_patterns::{
    channel::new_amqp_channel,
    configs::Configs,
    errors::AmqpError,
    logging::init_logging,
    pubsub::{topic_exchange, LogPublisher, LogSubscriber},
    routing::{log_line, validate_topic_binding, Facility, Severity},
    shutdown::shutdown_token,
};
use rand::Rng;
use std::{process, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    Publisher,
    Subscriber,
}

#[derive(Parser)]
#[command(name = "topics", about = "Route logs by facility and severity through a topic exchange")]
struct Args {
    #[arg(long, value_enum)]
    mode: Mode,

    /// Binding key `<facility>.<severity>`; either part may be `*` or `#`
    #[arg(long, default_value = "#.#")]
    bind: Vec<String>,

    /// Longest pause between two logs of one facility, in seconds
    #[arg(long, default_value_t = 10)]
    max_pause: u64,
}

/// Publishes logs of one facility with random severities until cancelled.
async fn generate_logs(
    publisher: Arc<LogPublisher>,
    facility: Facility,
    max_pause: u64,
    cancel: CancellationToken,
) -> Result<(), AmqpError> {
    let mut i: u64 = 0;

    while !cancel.is_cancelled() {
        let (severity, pause) = {
            let mut rng = rand::thread_rng();
            (Severity::random(&mut rng), rng.gen_range(0..max_pause.max(1)))
        };

        let key = facility.topic_key(severity);
        publisher.publish(&key, &log_line(&key, i)).await?;
        info!("#{} - {}", i, key);
        i += 1;

        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(Duration::from_secs(pause)) => {}
        }
    }

    Ok(())
}

async fn run(args: Args, cfg: Configs) -> Result<(), AmqpError> {
    let (_conn, channel) = new_amqp_channel(&cfg).await?;
    let cancel = shutdown_token();

    match args.mode {
        Mode::Publisher => {
            let publisher = Arc::new(LogPublisher::new(channel, topic_exchange()));
            publisher.declare().await?;

            let generators = Facility::ALL.into_iter().map(|facility| {
                generate_logs(publisher.clone(), facility, args.max_pause, cancel.clone())
            });

            for result in join_all(generators).await {
                result?;
            }
        }
        Mode::Subscriber => {
            let subscription = LogSubscriber::new(channel, topic_exchange(), args.bind)
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

    if let Some(err) = args
        .bind
        .iter()
        .find_map(|bind| validate_topic_binding(bind).err())
    {
        error!(error = err.to_string(), "invalid --bind");
        process::exit(1);
    }

    if let Err(err) = run(args, cfg).await {
        error!(error = err.to_string(), "topics failed");
        process::exit(1);
    }
}
