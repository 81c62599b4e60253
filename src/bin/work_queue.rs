// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Competing-consumer work queue.
//!
//! ```bash
//! work_queue --mode worker
//! work_queue --mode producer                 # 30 `hello` tasks, one per second
//! work_queue --mode producer --task resize...  # one task of level 3
//! ```

use clap::{Parser, ValueEnum};
use rabbitmq_patterns::{
    channel::new_amqp_channel,
    configs::Configs,
    dispatcher::{task_queue, TaskProducer, TaskWorker},
    errors::AmqpError,
    logging::init_logging,
    shutdown::shutdown_token,
    task::Task,
};
use std::{process, time::Duration};
use tracing::{error, info};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    Producer,
    Worker,
}

#[derive(Parser)]
#[command(name = "work_queue", about = "Distribute tasks among competing workers")]
struct Args {
    #[arg(long, value_enum, default_value = "producer")]
    mode: Mode,

    /// Send a single task built from this argument, one level per `.`
    #[arg(long)]
    task: Option<String>,

    /// Tasks sent when no `--task` is given
    #[arg(long, default_value_t = 30)]
    count: u32,
}

async fn run(args: Args, cfg: Configs) -> Result<(), AmqpError> {
    let (_conn, channel) = new_amqp_channel(&cfg).await?;
    let queue = task_queue(cfg.patterns.malformed_policy);

    match args.mode {
        Mode::Producer => {
            let producer = TaskProducer::new(channel, queue);
            producer.declare().await?;

            match args.task {
                Some(arg) => producer.dispatch(&Task::from_arg(&arg)).await?,
                None => {
                    for level in 0..args.count {
                        producer.dispatch(&Task::new("hello", level)).await?;
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
        Mode::Worker => {
            let worker = TaskWorker::new(
                channel,
                queue,
                cfg.patterns.work_unit,
                cfg.patterns.malformed_policy,
            );
            let report = worker.run(shutdown_token()).await?;
            info!(
                completed = report.completed,
                skipped = report.skipped,
                dead_lettered = report.dead_lettered,
                "worker stopped"
            );
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
        error!(error = err.to_string(), "work queue failed");
        process::exit(1);
    }
}
