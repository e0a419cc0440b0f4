//! Side-channel instrumentation for stream lifecycles.

mod stats;

pub use stats::{LifecycleSnapshot, LifecycleStats};
