//! Logging for the Tally workspace, a thin layer over `tracing`.
//!
//! All crates log through the re-exported macros [`error!`], [`warn!`], [`info!`], [`debug!`]
//! and [`trace!`]. Messages start lowercase and carry no trailing punctuation. Metric names and
//! routing keys go into fields rather than into the message where practical:
//!
//! ```
//! tally_log::debug!(metric = "counter.requests", "derived delta");
//! ```
//!
//! Errors are logged with their sources through [`LogError`].
//!
//! With the `init` feature, [`init`] installs a subscriber from a [`LogConfig`], which is usually
//! part of the `logging` section of the Tally configuration file:
//!
//! ```yaml
//! logging:
//!   level: debug
//!   format: json
//! ```
//!
//! With the `test` feature, [`init_test!`] routes output of the calling crate to the test harness.
#![warn(missing_docs)]

#[cfg(feature = "init")]
mod setup;
mod utils;

#[cfg(feature = "init")]
pub use setup::*;
#[cfg(feature = "test")]
pub use test::*;
pub use utils::*;

#[doc(inline)]
pub use tracing::{debug, error, info, trace, warn};
