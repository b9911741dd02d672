//! Test doubles and fixtures for the forage job runtime.

mod job;
mod mock;
mod queue;

pub use job::*;
pub use mock::*;
pub use queue::*;
