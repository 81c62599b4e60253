// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Log Routing Keys
//!
//! Severities and facilities of the example log streams, and validation of
//! the keys subscribers bind with.

use rand::Rng;
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Wildcard matching exactly one word of a topic key
pub const STAR: &str = "*";
/// Wildcard matching zero or more words of a topic key
pub const HASH: &str = "#";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RoutingError {
    #[error("invalid severity: '{0}'")]
    InvalidSeverity(String),

    #[error("expected 1 to 3 severities, got {0}")]
    SeverityCount(usize),

    #[error("invalid facility: '{0}'")]
    InvalidFacility(String),

    #[error("invalid binding: '{0}', expected <facility>.<severity>")]
    InvalidBinding(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Info, Severity::Warn, Severity::Error];

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
        }
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Severity {
        Severity::ALL[rng.gen_range(0..Severity::ALL.len())]
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|sev| sev.as_str() == s)
            .ok_or_else(|| RoutingError::InvalidSeverity(s.to_owned()))
    }
}

/// Parses `-` separated severities such as `info-warn`.
pub fn parse_severities(input: &str) -> Result<Vec<Severity>, RoutingError> {
    let parts: Vec<&str> = input.split('-').collect();
    if parts.len() > Severity::ALL.len() {
        return Err(RoutingError::SeverityCount(parts.len()));
    }

    parts.into_iter().map(Severity::from_str).collect()
}

/// Sources of the topic log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facility {
    Nginx,
    Cron,
    Sshd,
}

impl Facility {
    pub const ALL: [Facility; 3] = [Facility::Nginx, Facility::Cron, Facility::Sshd];

    pub fn as_str(self) -> &'static str {
        match self {
            Facility::Nginx => "nginx",
            Facility::Cron => "cron",
            Facility::Sshd => "sshd",
        }
    }

    /// Topic routing key `<facility>.<severity>`.
    pub fn topic_key(self, severity: Severity) -> String {
        format!("{}.{}", self.as_str(), severity)
    }
}

impl fmt::Display for Facility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Facility {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Facility::ALL
            .into_iter()
            .find(|facility| facility.as_str() == s)
            .ok_or_else(|| RoutingError::InvalidFacility(s.to_owned()))
    }
}

fn is_wildcard(word: &str) -> bool {
    word == STAR || word == HASH
}

/// Checks a topic binding key: exactly two words, a facility and a
/// severity, either of which may be a wildcard.
pub fn validate_topic_binding(binding: &str) -> Result<&str, RoutingError> {
    let invalid = || RoutingError::InvalidBinding(binding.to_owned());

    let (facility, severity) = binding.split_once('.').ok_or_else(invalid)?;

    if !is_wildcard(facility) && facility.parse::<Facility>().is_err() {
        return Err(invalid());
    }
    if !is_wildcard(severity) && severity.parse::<Severity>().is_err() {
        return Err(invalid());
    }

    Ok(binding)
}

/// Body of the `i`-th generated log line routed with `key`.
pub fn log_line(key: &str, i: u64) -> String {
    format!("[{key}] #{i} log some stuff")
}

/// Body of the `i`-th log line routed by severity; the tag is upper-cased.
pub fn severity_log_line(severity: Severity, i: u64) -> String {
    log_line(&severity.as_str().to_uppercase(), i)
}
