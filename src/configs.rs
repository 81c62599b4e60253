// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Configuration
//!
//! Application, broker, logging and pattern settings, read from environment
//! variables. Every value has a default that matches a stock local RabbitMQ
//! (`guest:guest@localhost:5672`, vhost `/`), so the examples run with no
//! environment at all.
//!
//! | Variable | Default |
//! |---|---|
//! | `APP_NAME` | `rabbitmq-patterns` |
//! | `RABBITMQ_HOST` | `localhost` |
//! | `RABBITMQ_PORT` | `5672` |
//! | `RABBITMQ_USER` | `guest` |
//! | `RABBITMQ_PASSWORD` | `guest` |
//! | `RABBITMQ_VHOST` | `%2f` |
//! | `LOG_LEVEL` | `info` |
//! | `LOG_FORMAT` | `compact` |
//! | `WORK_UNIT_MS` | `1000` |
//! | `CONFIRM_TIMEOUT_SECS` | `5` |
//! | `CONFIRM_BATCH_SIZE` | `50` |
//! | `RPC_SERVERS` | `3` |
//! | `MALFORMED_POLICY` | `skip` |

use crate::{consumer::MalformedPolicy, logging::LogFormat};
use std::{str::FromStr, time::Duration};
use thiserror::Error;

/// Errors raised while reading the configuration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigsError {
    #[error("invalid value `{value}` for `{key}`")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfigs {
    /// Reported to the broker as the connection name.
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RabbitMQConfigs {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfigs {
    pub level: String,
    pub format: LogFormat,
}

/// Knobs of the individual messaging patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternConfigs {
    /// Simulated work per task level.
    pub work_unit: Duration,
    /// How long a publisher waits for one batch of confirmations.
    pub confirm_timeout: Duration,
    pub confirm_batch_size: usize,
    /// Size of the RPC server pool.
    pub rpc_servers: usize,
    pub malformed_policy: MalformedPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configs {
    pub app: AppConfigs,
    pub rabbitmq: RabbitMQConfigs,
    pub logging: LoggingConfigs,
    pub patterns: PatternConfigs,
}

impl Default for Configs {
    fn default() -> Self {
        Configs {
            app: AppConfigs {
                name: "rabbitmq-patterns".to_owned(),
            },
            rabbitmq: RabbitMQConfigs {
                host: "localhost".to_owned(),
                port: 5672,
                user: "guest".to_owned(),
                password: "guest".to_owned(),
                vhost: "%2f".to_owned(),
            },
            logging: LoggingConfigs {
                level: "info".to_owned(),
                format: LogFormat::Compact,
            },
            patterns: PatternConfigs {
                work_unit: Duration::from_secs(1),
                confirm_timeout: Duration::from_secs(5),
                confirm_batch_size: 50,
                rpc_servers: 3,
                malformed_policy: MalformedPolicy::Skip,
            },
        }
    }
}

impl Configs {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Configs, ConfigsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, falling back to the defaults
    /// for every key it does not know.
    pub fn from_lookup<F>(lookup: F) -> Result<Configs, ConfigsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Configs::default();

        Ok(Configs {
            app: AppConfigs {
                name: lookup("APP_NAME").unwrap_or(defaults.app.name),
            },
            rabbitmq: RabbitMQConfigs {
                host: lookup("RABBITMQ_HOST").unwrap_or(defaults.rabbitmq.host),
                port: parse_or(&lookup, "RABBITMQ_PORT", defaults.rabbitmq.port)?,
                user: lookup("RABBITMQ_USER").unwrap_or(defaults.rabbitmq.user),
                password: lookup("RABBITMQ_PASSWORD").unwrap_or(defaults.rabbitmq.password),
                vhost: lookup("RABBITMQ_VHOST").unwrap_or(defaults.rabbitmq.vhost),
            },
            logging: LoggingConfigs {
                level: lookup("LOG_LEVEL").unwrap_or(defaults.logging.level),
                format: lookup("LOG_FORMAT")
                    .map(|v| LogFormat::parse(&v))
                    .unwrap_or(defaults.logging.format),
            },
            patterns: PatternConfigs {
                work_unit: Duration::from_millis(parse_or(
                    &lookup,
                    "WORK_UNIT_MS",
                    defaults.patterns.work_unit.as_millis() as u64,
                )?),
                confirm_timeout: Duration::from_secs(parse_or(
                    &lookup,
                    "CONFIRM_TIMEOUT_SECS",
                    defaults.patterns.confirm_timeout.as_secs(),
                )?),
                confirm_batch_size: parse_or(
                    &lookup,
                    "CONFIRM_BATCH_SIZE",
                    defaults.patterns.confirm_batch_size,
                )?,
                rpc_servers: parse_or(&lookup, "RPC_SERVERS", defaults.patterns.rpc_servers)?,
                malformed_policy: parse_or(
                    &lookup,
                    "MALFORMED_POLICY",
                    defaults.patterns.malformed_policy,
                )?,
            },
        })
    }

    /// AMQP URI of the configured broker.
    pub fn amqp_uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}",
            self.rabbitmq.user,
            self.rabbitmq.password,
            self.rabbitmq.host,
            self.rabbitmq.port,
            self.rabbitmq.vhost
        )
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigsError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigsError::InvalidValue {
            key: key.to_owned(),
            value,
        }),
    }
}
