use std::time::Duration;

use envconfig::Envconfig;
use rdkafka::ClientConfig;

use crate::kafka::ConsumerConfigBuilder;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    // Kafka configuration
    #[envconfig(default = "localhost:9092")]
    pub kafka_hosts: String,

    #[envconfig(default = "kafka-resume")]
    pub kafka_consumer_group: String,

    // Comma-separated list of topics to subscribe to
    #[envconfig(default = "events")]
    pub kafka_consumer_topics: String,

    // Only used when a resume offset is out of range on the broker
    #[envconfig(default = "earliest")]
    pub kafka_consumer_offset_reset: String,

    #[envconfig(default = "false")]
    pub kafka_tls: bool,

    // Enables cooperative-sticky assignment with static membership
    pub kafka_client_id: Option<String>,

    // Position store configuration
    #[envconfig(default = "./positions")]
    pub position_store_path: String,

    #[envconfig(default = "10000")]
    pub position_lookup_timeout_ms: u64,

    // Consecutive failed position writes before the consumer gives up
    #[envconfig(default = "10")]
    pub position_write_max_failures: u32,

    // HTTP server configuration
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "8080")]
    pub port: u16,
}

impl Config {
    pub fn init_with_defaults() -> Result<Self, envconfig::Error> {
        Config::init_from_env()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn topics(&self) -> Vec<String> {
        self.kafka_consumer_topics
            .split(',')
            .map(str::trim)
            .filter(|topic| !topic.is_empty())
            .map(ToString::to_string)
            .collect()
    }

    pub fn position_lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.position_lookup_timeout_ms)
    }

    pub fn to_client_config(&self) -> ClientConfig {
        ConsumerConfigBuilder::new(&self.kafka_hosts, &self.kafka_consumer_group)
            .with_tls(self.kafka_tls)
            .with_offset_reset(&self.kafka_consumer_offset_reset)
            .with_sticky_partition_assignment(self.kafka_client_id.as_deref())
            .build()
    }
}
