//! StatsD reporting of Tally's own health, built on cadence.
//!
//! These are measurements about the pipeline itself: messages published, payload sizes, counters
//! tracked. They are unrelated to the application metrics Tally transports.
//!
//! Each measurement is named by a small enum implementing one of [`CounterMetric`],
//! [`GaugeMetric`], [`DistributionMetric`] or [`TimerMetric`]. The trait decides which statsd
//! type the name may be used with, so a counter name cannot end up in a gauge.
//!
//! Emitting is a no-op until a client is installed with [`init`] or [`set_client`].
//!
//! ```
//! use tally_statsd::{metric, CounterMetric};
//!
//! enum PipelineCounters {
//!     Forwarded,
//! }
//!
//! impl CounterMetric for PipelineCounters {
//!     fn name(&self) -> &'static str {
//!         match self {
//!             Self::Forwarded => "pipeline.forwarded",
//!         }
//!     }
//! }
//!
//! let captures = tally_statsd::with_capturing_test_client(|| {
//!     metric!(counter(PipelineCounters::Forwarded) += 2, channel = "sink");
//! });
//!
//! assert_eq!(captures, ["pipeline.forwarded:2|c|#channel:sink"]);
//! ```
#![warn(missing_docs)]

mod client;

pub use client::*;

#[doc(hidden)]
pub mod _pred {
    pub use cadence::prelude::*;
}

/// Name of a counter. Emitted with `metric!(counter(..) += n)`.
pub trait CounterMetric {
    /// Returns the name reported to statsd.
    fn name(&self) -> &'static str;
}

/// Name of a gauge. Emitted with `metric!(gauge(..) = v)`.
pub trait GaugeMetric {
    /// Returns the name reported to statsd.
    fn name(&self) -> &'static str;
}

/// Name of a distribution. Emitted with `metric!(distribution(..) = v)`.
pub trait DistributionMetric {
    /// Returns the name reported to statsd.
    fn name(&self) -> &'static str;
}

/// Name of a timer. Emitted with `metric!(timer(..) = duration)` or around a block.
pub trait TimerMetric {
    /// Returns the name reported to statsd.
    fn name(&self) -> &'static str;
}

/// Emits a measurement to the client of the current thread.
///
/// Tags follow the value as `key = value` pairs. Distributions and timers accept an explicit
/// `sample` rate, which is capped by the global rate of the client.
///
/// ```
/// use std::time::Duration;
/// use tally_statsd::{metric, DistributionMetric, GaugeMetric, TimerMetric};
///
/// struct QueueDepth;
/// impl GaugeMetric for QueueDepth {
///     fn name(&self) -> &'static str { "queue.depth" }
/// }
///
/// struct PayloadSize;
/// impl DistributionMetric for PayloadSize {
///     fn name(&self) -> &'static str { "payload.size" }
/// }
///
/// struct Flush;
/// impl TimerMetric for Flush {
///     fn name(&self) -> &'static str { "flush.duration" }
/// }
///
/// metric!(gauge(QueueDepth) = 12_u64);
/// metric!(distribution(PayloadSize, sample = 0.1) = 512_u64, variant = "delta");
/// metric!(timer(Flush) = Duration::from_millis(3));
///
/// let flushed = metric!(timer(Flush), {
///     true
/// });
/// assert!(flushed);
/// ```
#[macro_export]
macro_rules! metric {
    (counter($id:expr) += $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {{
        let value: i64 = $value;
        $crate::metric!(@send count_with_tags, $crate::CounterMetric::name(&$id), value, None $(, $($k).* = $v)*)
    }};
    (counter($id:expr) -= $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {{
        let value: i64 = $value;
        $crate::metric!(@send count_with_tags, $crate::CounterMetric::name(&$id), -value, None $(, $($k).* = $v)*)
    }};

    (gauge($id:expr) = $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {
        $crate::metric!(@send gauge_with_tags, $crate::GaugeMetric::name(&$id), $value, None $(, $($k).* = $v)*)
    };

    (distribution($id:expr, sample = $sample:expr) = $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {
        $crate::metric!(@send distribution_with_tags, $crate::DistributionMetric::name(&$id), $value, Some($crate::SampleRate::from($sample)) $(, $($k).* = $v)*)
    };
    (distribution($id:expr) = $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {
        $crate::metric!(@send distribution_with_tags, $crate::DistributionMetric::name(&$id), $value, None $(, $($k).* = $v)*)
    };

    (timer($id:expr, sample = $sample:expr) = $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {
        $crate::metric!(@send time_with_tags, $crate::TimerMetric::name(&$id), $value, Some($crate::SampleRate::from($sample)) $(, $($k).* = $v)*)
    };
    (timer($id:expr) = $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {
        $crate::metric!(@send time_with_tags, $crate::TimerMetric::name(&$id), $value, None $(, $($k).* = $v)*)
    };
    (timer($id:expr), $($($k:ident).* = $v:expr,)* $block:block) => {{
        let started = ::std::time::Instant::now();
        let result = $block;
        $crate::metric!(timer($id) = started.elapsed() $(, $($k).* = $v)*);
        result
    }};

    (@send $method:ident, $name:expr, $value:expr, $sample:expr $(, $($k:ident).* = $v:expr)*) => {
        $crate::with_client(|client| {
            use $crate::_pred::*;
            client.send(
                client.statsd().$method($name, $value)
                    $(.with_tag(stringify!($($k).*), $v))*,
                $sample,
            );
        })
    };
}
