// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Work Queue Tasks

use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

/// A unit of work for the work queue. `level` is its workload magnitude.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    pub level: u32,
}

impl Task {
    pub fn new(name: &str, level: u32) -> Task {
        Task {
            name: name.to_owned(),
            level,
        }
    }

    /// Builds a task from a command line argument: the argument is the name
    /// and every `.` in it adds one level. An empty argument yields
    /// `{ hello, 1 }`.
    pub fn from_arg(arg: &str) -> Task {
        if arg.is_empty() {
            return Task::new("hello", 1);
        }

        let level = arg.matches('.').count() as u32;
        Task::new(arg, level)
    }

    /// Time needed to complete the task when one level costs `unit`.
    pub fn workload(&self, unit: Duration) -> Duration {
        unit.saturating_mul(self.level)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ name: '{}', level: {} }}", self.name, self.level)
    }
}
