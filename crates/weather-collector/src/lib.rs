//! Weather collector service.
//!
//! Periodically fetches current conditions for a fixed location from the
//! Open-Meteo API, normalizes them into a stable JSON schema and publishes
//! each observation to a durable RabbitMQ queue.
//!
//! # Architecture
//!
//! ```text
//! tick ──► api::fetch ──► extract ──► normalize ──► serialize ──► publisher
//!  │           │             │            │                          │
//!  │       FetchError  ExtractionError  ValidationError         PublishError
//!  │                                                                 │
//!  └──────────────── collector: one cycle per tick, never fatal ◄───┘
//! ```
//!
//! # Modules
//!
//! - [`api`]: HTTP client for the weather provider.
//! - [`extract`]: Field extraction and WMO code mapping.
//! - [`normalize`]: Validation, message assembly, JSON encoding.
//! - [`publisher`]: AMQP queue publisher with explicit lifecycle.
//! - [`collector`]: Per-tick orchestration and graceful shutdown.
//! - [`config`]: Environment and YAML configuration.
//! - [`error`]: Error types for every pipeline stage.

pub mod api;
pub mod collector;
pub mod config;
pub mod error;
pub mod extract;
pub mod normalize;
pub mod publisher;
pub mod weather_codes;

pub use api::{OpenMeteoClient, WeatherSource};
pub use collector::WeatherCollector;
pub use config::Config;
pub use error::{
    CollectorError, ConfigError, ExtractionError, FetchError, PublishError, SerializationError,
    ValidationError,
};
pub use extract::{extract, ExtractedReading};
pub use normalize::{
    check_schema, normalize, serialize, validate_schema, NormalizedMessage, DEFAULT_SOURCE,
};
pub use publisher::{publish_once, LapinConnector, QueuePublisher};
