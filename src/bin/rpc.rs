// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Fibonacci over RPC.
//!
//! ```bash
//! rpc --mode server --servers 3
//! rpc --mode client
//! ```

use clap::{Parser, ValueEnum};
use rabbitmq_patterns::{
    channel::{new_amqp_channel, open_channel},
    configs::Configs,
    correlation::RandomIdGenerator,
    errors::AmqpError,
    logging::init_logging,
    rpc::{serve_pool, FibonacciHandler, RpcClient, RpcServer},
    shutdown::shutdown_token,
};
use rand::Rng;
use std::{process, sync::Arc, time::Duration};
use tracing::{error, info};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    Client,
    Server,
}

#[derive(Parser)]
#[command(name = "rpc", about = "Compute Fibonacci numbers on a pool of RPC servers")]
struct Args {
    #[arg(long, value_enum)]
    mode: Mode,

    /// Servers in the pool, overrides RPC_SERVERS
    #[arg(long)]
    servers: Option<usize>,

    /// Pause between two client calls, in seconds
    #[arg(long, default_value_t = 2)]
    interval: u64,
}

async fn run(args: Args, cfg: Configs) -> Result<(), AmqpError> {
    let (conn, channel) = new_amqp_channel(&cfg).await?;
    let cancel = shutdown_token();

    match args.mode {
        Mode::Server => {
            let size = args.servers.unwrap_or(cfg.patterns.rpc_servers).max(1);
            let handler = Arc::new(FibonacciHandler);

            let mut servers = vec![RpcServer::new(0, channel, handler.clone())];
            for id in 1..size {
                servers.push(RpcServer::new(id, open_channel(&conn).await?, handler.clone()));
            }

            info!(servers = size, "starting rpc server pool");
            let answered = serve_pool(servers, cancel).await?;
            info!(answered, "rpc server pool stopped");
        }
        Mode::Client => {
            let mut client = RpcClient::connect(channel, Arc::new(RandomIdGenerator)).await?;

            while !cancel.is_cancelled() {
                let n = rand::thread_rng().gen_range(5..15);
                info!("requesting fib({})", n);

                match client.fib(n, &cancel).await {
                    Ok(result) => info!("fib({}) = {}", n, result),
                    Err(AmqpError::Cancelled) => break,
                    Err(err) => return Err(err),
                }

                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(Duration::from_secs(args.interval)) => {}
                }
            }
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
        error!(error = err.to_string(), "rpc failed");
        process::exit(1);
    }
}
