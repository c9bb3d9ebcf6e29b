//! Retry policy engine.
//!
//! # Structure
//!
//! - `policy` - Immutable policy configuration, its builder and wait schedule
//! - `predicate` - Ordered, type-tagged retry predicates over errors and results
//! - `execute` - The retry loop driving an async operation
//! - `variance` - Jitter and clamping helpers for wait durations

mod execute;
mod policy;
pub mod predicate;
pub mod variance;

pub use policy::{
    Completion, CompletionHook, RetryPolicy, RetryPolicyBuilder, WaitSchedule,
    duration_from_millis,
};
