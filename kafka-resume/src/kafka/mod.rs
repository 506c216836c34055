// Kafka module - group consumption with store-driven resume offsets
pub mod config;
pub mod consumer;
pub mod context;

// Public API
pub use config::ConsumerConfigBuilder;
pub use consumer::{PositionRecorder, ResumeConsumer};
pub use context::{ConsumerEvent, ResumeConsumerContext};
