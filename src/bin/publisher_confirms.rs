// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Publishing with broker confirmations, first one message at a time, then
//! in batches.

use clap::Parser;
use rabbitmq_patterns::{
    channel::new_amqp_channel, configs::Configs, confirm::ConfirmPublisher, errors::AmqpError,
    logging::init_logging,
};
use std::{process, time::Instant};
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "publisher_confirms",
    about = "Publish messages and wait for broker confirmations"
)]
struct Args {
    /// Messages confirmed one at a time
    #[arg(long, default_value_t = 10)]
    individual: usize,

    /// Messages confirmed in batches
    #[arg(long, default_value_t = 1000)]
    batched: usize,

    /// Batch size, overrides CONFIRM_BATCH_SIZE
    #[arg(long)]
    batch_size: Option<usize>,
}

async fn run(args: Args, cfg: Configs) -> Result<(), AmqpError> {
    let (_conn, channel) = new_amqp_channel(&cfg).await?;
    let mut publisher = ConfirmPublisher::new(channel, cfg.patterns.confirm_timeout).await?;

    let started = Instant::now();
    publisher.publish_individually(args.individual).await?;
    info!(elapsed_ms = started.elapsed().as_millis() as u64, "individual confirms done");

    let started = Instant::now();
    let batch_size = args.batch_size.unwrap_or(cfg.patterns.confirm_batch_size);
    publisher.publish_in_batches(args.batched, batch_size).await?;
    info!(elapsed_ms = started.elapsed().as_millis() as u64, "batch confirms done");

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
        error!(
            error = err.to_string(),
            retryable = err.is_retryable(),
            "publisher confirms failed"
        );
        process::exit(1);
    }
}
