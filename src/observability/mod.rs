//! Observability for the connectivity stack
//!
//! Structured logging only; state is reported over MQTT by the device
//! features rather than through a local endpoint.

pub mod logging;

pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};

// Span macros for structured logging
pub use logging::{dns_span, lifecycle_span, link_span, mqtt_span};
