// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Point-to-point hello world.
//!
//! ```bash
//! hello_world --mode consumer
//! hello_world --mode producer --count 10
//! ```

use clap::{Parser, ValueEnum};
use rabbitmq_patterns::{
    channel::new_amqp_channel,
    configs::Configs,
    errors::AmqpError,
    hello::{hello_consumer, HelloProducer},
    logging::init_logging,
    shutdown::shutdown_token,
};
use std::process;
use tracing::{error, info};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    Producer,
    Consumer,
}

#[derive(Parser)]
#[command(name = "hello_world", about = "Send and receive messages through the `hello` queue")]
struct Args {
    #[arg(long, value_enum)]
    mode: Mode,

    /// Messages sent by the producer
    #[arg(long, default_value_t = 10)]
    count: u64,
}

async fn run(args: Args, cfg: Configs) -> Result<(), AmqpError> {
    let (_conn, channel) = new_amqp_channel(&cfg).await?;

    match args.mode {
        Mode::Producer => {
            let producer = HelloProducer::new(channel);
            producer.declare().await?;
            producer.send_all(args.count).await?;
        }
        Mode::Consumer => {
            let subscription = hello_consumer(channel.as_ref()).await?;
            info!("waiting for messages, press CTRL+C to exit");
            let received = subscription.run(shutdown_token()).await?;
            info!(received, "consumer stopped");
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
        error!(error = err.to_string(), "hello world failed");
        process::exit(1);
    }
}
