//! Process runner for resolved scripts.
//!
//! - [`ScriptExecutor`]: spawns `/bin/sh <script>` and streams output
//! - [`OutputSink`]: receives each stdout/stderr chunk as it is read
//!
//! # Execution Flow
//!
//! 1. [`ScriptExecutor::run`] spawns the shell with both pipes captured
//! 2. stdout and stderr are drained concurrently, one sink call per read
//! 3. the exit status is mapped to `Ok(())` or [`RunError`]
//!
//! # Security Note
//!
//! Scripts run with the worker's own privileges, without any sandbox.

pub mod executor;

pub use executor::{OutputSink, RunError, ScriptExecutor};
