//! Rate limiting logic and state management.

mod batch;
mod cache;
mod engine;
mod limits;
pub mod store;

pub use batch::{DeferredUpdate, UpdateBatcher};
pub use cache::AdmissionCache;
pub use engine::DecisionEngine;
pub use limits::{Dimension, LimitTable, SelectedLimit};
pub use store::{CounterStore, RedisCounterStore};
