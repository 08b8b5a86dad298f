//! Configuration for Tally.
//!
//! Configuration lives in a `config.yml` file inside a config directory and is loaded with
//! [`Config::from_path`]. All sections are optional:
//!
//! ```yaml
//! logging:
//!   level: debug
//! metrics:
//!   statsd: 127.0.0.1:8125
//! export:
//!   exchange: metrics
//!   prefix: app.node1
//!   headers:
//!     region: eu
//! listener:
//!   default_prefix: unknown
//! aggregate:
//!   key_pattern: d.k.d
//! kafka_config:
//!   - name: bootstrap.servers
//!     value: 127.0.0.1:9092
//! ```
//!
//! Individual values can be replaced afterwards, for example from environment variables, with
//! [`Config::apply_override`].
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod config;

pub use config::*;
