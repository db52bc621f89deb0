pub mod channel;
pub mod config;
pub mod error;
pub mod execution;
pub mod node;
pub mod script;
pub mod shutdown;
pub mod worker;
