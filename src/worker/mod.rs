//! Request serialization

pub mod queue;

pub use queue::{TaskHandle, TaskId, TaskQueue};
