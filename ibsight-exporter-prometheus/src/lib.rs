//! Prometheus metrics exporter for InfiniBand port counters.
//!
//! Every scrape of the HTTP `/metrics` endpoint reads the kernel's
//! InfiniBand counter tree, updates the gauge registry and renders it.
//! There is no background polling and nothing is cached between scrapes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │  sysfs counters │────>│    Collector    │────>│   HTTP Server   │
//! │ (/sys/class/ib) │     │ (read, update)  │     │   (/metrics)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! Run the exporter binary, optionally with a configuration file:
//!
//! ```bash
//! ibsight-exporter-prometheus --config config.json5
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod collector;
pub mod config;
pub mod http;
pub mod mapping;
pub mod metrics;

pub use collector::{ScrapeCollector, ScrapeOutcome, SharedCollector};
pub use config::{AbsentSeriesPolicy, ExporterConfig};
pub use http::HttpServer;
pub use metrics::InfiniBandMetrics;
