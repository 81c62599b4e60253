// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Fanout publish/subscribe: every subscriber receives every log line.
//!
//! ```bash
//! publish_subscribe --mode subscriber
//! publish_subscribe --mode publisher
//! ```

use clap::{Parser, ValueEnum};
use rabbitmq_patterns::{
    channel::new_amqp_channel,
    configs::Configs,
    errors::AmqpError,
    logging::init_logging,
    pubsub::{fanout_exchange, LogPublisher, LogSubscriber},
    shutdown::shutdown_token,
};
use std::{process, time::Duration};
use tracing::{error, info};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    Publisher,
    Subscriber,
}

#[derive(Parser)]
#[command(name = "publish_subscribe", about = "Broadcast logs through the `logs` fanout exchange")]
struct Args {
    #[arg(long, value_enum)]
    mode: Mode,
}

async fn run(args: Args, cfg: Configs) -> Result<(), AmqpError> {
    let (_conn, channel) = new_amqp_channel(&cfg).await?;
    let cancel = shutdown_token();

    match args.mode {
        Mode::Publisher => {
            let publisher = LogPublisher::new(channel, fanout_exchange());
            publisher.declare().await?;

            let mut i: u64 = 0;
            while !cancel.is_cancelled() {
                publisher.publish("", &format!("log #{i}")).await?;
                info!("sent log #{}", i);
                i += 1;

                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                }
            }
        }
        Mode::Subscriber => {
            let subscription = LogSubscriber::new(channel, fanout_exchange(), vec![])
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

    if let Err(err) = run(args, cfg).await {
        error!(error = err.to_string(), "publish/subscribe failed");
        process::exit(1);
    }
}
