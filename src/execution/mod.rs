//! Execution identity, topics and lifecycle.
//!
//! Every run request becomes one execution with its own topic triple:
//!
//! - `<ns>/<worker>/run/<id>`: status (`Starting`, `Failed`, `Succeeded`)
//! - `<ns>/<worker>/run/<id>/log`: raw stdout chunks
//! - `<ns>/<worker>/run/<id>/error`: raw stderr chunks and failure text
//!
//! # Components
//!
//! - [`ExecutionIdAllocator`]: second-resolution UTC ids, unique per process
//! - [`Topics`]: topic names for one worker
//! - [`Reporter`]: publishes status/log/error for one execution
//! - [`Orchestrator`]: drives one run request from payload to final status

pub mod orchestrator;
pub mod reporter;

use std::sync::Mutex;

use chrono::{DateTime, Utc};

pub use orchestrator::Orchestrator;
pub use reporter::Reporter;

/// Timestamp layout of an execution id, e.g. `20240131235959`.
pub const EXECUTION_ID_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Starting,
    Failed,
    Succeeded,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Starting => "Starting",
            ExecutionStatus::Failed => "Failed",
            ExecutionStatus::Succeeded => "Succeeded",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecutionId(String);

impl ExecutionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hands out execution ids derived from wall-clock time.
///
/// The first id in a given second is the bare timestamp. Later ids in the
/// same second get a `-1`, `-2`, ... suffix so concurrent requests never
/// share topics. If the clock steps back, ids keep counting on the latest
/// second already issued.
#[derive(Debug, Default)]
pub struct ExecutionIdAllocator {
    last: Mutex<(String, u32)>,
}

impl ExecutionIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self) -> ExecutionId {
        self.allocate_at(Utc::now())
    }

    pub fn allocate_at(&self, now: DateTime<Utc>) -> ExecutionId {
        let stamp = now.format(EXECUTION_ID_FORMAT).to_string();
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());

        // Fixed-width stamps order lexically.
        if stamp <= last.0 {
            last.1 += 1;
            ExecutionId(format!("{}-{}", last.0, last.1))
        } else {
            *last = (stamp.clone(), 0);
            ExecutionId(stamp)
        }
    }
}

/// Topic names for one worker.
#[derive(Debug, Clone)]
pub struct Topics {
    base: String,
}

impl Topics {
    pub fn new(namespace: &str, identifier: &str) -> Self {
        Self {
            base: format!("{}/{}", namespace, identifier),
        }
    }

    /// Availability flag: `"true"` on connect, `"false"` as last will.
    pub fn available(&self) -> String {
        format!("{}/available", self.base)
    }

    /// Inbound run requests.
    pub fn run_start(&self) -> String {
        format!("{}/run/start", self.base)
    }

    pub fn execution(&self, id: &ExecutionId) -> ExecutionTopics {
        let status = format!("{}/run/{}", self.base, id);
        ExecutionTopics {
            log: format!("{}/log", status),
            error: format!("{}/error", status),
            status,
        }
    }
}

/// Fixed outbound topics of a single execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionTopics {
    pub status: String,
    pub log: String,
    pub error: String,
}
