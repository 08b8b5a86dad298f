use std::cell::RefCell;
use std::collections::BTreeMap;
use std::net::{ToSocketAddrs, UdpSocket};
use std::sync::Arc;

use cadence::{
    BufferedUdpMetricSink, Metric, MetricBuilder, MetricResult, QueuingMetricSink, SpyMetricSink,
    StatsdClient,
};
use parking_lot::RwLock;
use rand::Rng;

/// Upper bound of queued measurements. Beyond it, new measurements are dropped.
const QUEUE_CAPACITY: usize = 100_000;

/// The fraction of measurements that is sent, between `0.0` and `1.0`.
///
/// Values outside that range are clamped.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SampleRate(f64);

impl SampleRate {
    /// Sends every measurement.
    pub const ALL: Self = Self(1.0);

    /// Returns the stricter of two rates.
    pub fn min(self, other: Self) -> Self {
        Self(self.0.min(other.0))
    }

    /// Rolls the dice for a single measurement.
    fn admits(self) -> bool {
        match self.0 {
            rate if rate >= 1.0 => true,
            rate if rate <= 0.0 => false,
            rate => rand::rng().random::<f64>() < rate,
        }
    }
}

impl Default for SampleRate {
    fn default() -> Self {
        Self::ALL
    }
}

impl From<f64> for SampleRate {
    fn from(value: f64) -> Self {
        Self(value.clamp(0.0, 1.0))
    }
}

impl From<SampleRate> for f64 {
    fn from(value: SampleRate) -> Self {
        value.0
    }
}

/// Settings for [`init`].
#[derive(Debug)]
pub struct MetricsClientConfig<'a, A> {
    /// Prefix of all metric names, without trailing dot.
    pub prefix: &'a str,
    /// Address of the statsd server.
    pub host: A,
    /// Tags attached to every measurement.
    pub default_tags: BTreeMap<String, String>,
    /// Rate applied to every measurement. Explicit per-metric rates can only lower it.
    pub default_sample_rate: SampleRate,
}

/// A statsd client together with the tags and sample rate applied to every measurement.
#[derive(Debug)]
pub struct MetricsClient {
    statsd: StatsdClient,
    default_tags: BTreeMap<String, String>,
    sample_rate: SampleRate,
}

impl MetricsClient {
    /// Wraps a cadence client without default tags, sending every measurement.
    pub fn new(statsd: StatsdClient) -> Self {
        Self {
            statsd,
            default_tags: BTreeMap::new(),
            sample_rate: SampleRate::ALL,
        }
    }

    /// Attaches `tags` to every measurement.
    pub fn with_default_tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.default_tags = tags;
        self
    }

    /// Sets the global sample rate.
    pub fn with_sample_rate(mut self, rate: SampleRate) -> Self {
        self.sample_rate = rate;
        self
    }

    /// Returns the underlying cadence client to build measurements with.
    pub fn statsd(&self) -> &StatsdClient {
        &self.statsd
    }

    /// Completes and sends a measurement built from [`statsd`](Self::statsd).
    ///
    /// The default tags are appended. An explicit `sample_rate` is capped by the global rate.
    #[doc(hidden)]
    pub fn send<'a, T>(
        &'a self,
        mut builder: MetricBuilder<'a, '_, T>,
        sample_rate: Option<SampleRate>,
    ) where
        T: Metric + From<String>,
    {
        let rate = sample_rate.map_or(self.sample_rate, |rate| rate.min(self.sample_rate));
        if !rate.admits() {
            return;
        }

        for (key, value) in &self.default_tags {
            builder = builder.with_tag(key, value);
        }

        if rate != SampleRate::ALL {
            builder = builder.with_sampling_rate(rate.into());
        }

        if let Err(error) = builder.try_send() {
            tally_log::error!(
                error = &error as &dyn std::error::Error,
                queue_capacity = QUEUE_CAPACITY,
                "dropped internal metric",
            );
        }
    }
}

static GLOBAL_CLIENT: RwLock<Option<Arc<MetricsClient>>> = RwLock::new(None);

thread_local! {
    // Seeded from the global client when the thread first emits. Tests replace it per thread.
    static THREAD_CLIENT: RefCell<Option<Arc<MetricsClient>>> = RefCell::new(GLOBAL_CLIENT.read().clone());
}

/// Installs `client` for all threads that have not yet emitted, and for the current one.
pub fn set_client(client: MetricsClient) {
    let client = Arc::new(client);
    *GLOBAL_CLIENT.write() = Some(Arc::clone(&client));
    THREAD_CLIENT.with(|cell| cell.replace(Some(client)));
}

/// Removes the installed client. Subsequent measurements on this thread are discarded.
pub fn disable() {
    GLOBAL_CLIENT.write().take();
    THREAD_CLIENT.with(|cell| cell.replace(None));
}

/// Runs `f` with the client of the current thread.
///
/// Without a client, `f` is skipped and `R::default()` is returned. Prefer the
/// [`metric!`](crate::metric) macro.
#[inline(always)]
pub fn with_client<F, R>(f: F) -> R
where
    F: FnOnce(&MetricsClient) -> R,
    R: Default,
{
    THREAD_CLIENT.with(|cell| match cell.borrow().as_deref() {
        Some(client) => f(client),
        None => R::default(),
    })
}

/// Starts reporting internal metrics to the statsd server at `config.host`.
///
/// Measurements are queued in memory and sent in batched UDP packets from a background thread.
pub fn init<A: ToSocketAddrs>(config: MetricsClientConfig<'_, A>) -> MetricResult<()> {
    let addrs: Vec<_> = config.host.to_socket_addrs()?.collect();
    if let Some(addr) = addrs.first() {
        tally_log::info!("reporting internal metrics to statsd at {addr}");
    }

    if f64::from(config.default_sample_rate) == 0.0 {
        tally_log::warn!("internal metrics sample rate is 0, nothing will be reported");
    }

    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.set_nonblocking(true)?;

    let udp = BufferedUdpMetricSink::from(addrs.as_slice(), socket)?;
    let sink = QueuingMetricSink::with_capacity(udp, QUEUE_CAPACITY);

    set_client(
        MetricsClient::new(StatsdClient::from_sink(config.prefix, sink))
            .with_default_tags(config.default_tags)
            .with_sample_rate(config.default_sample_rate),
    );

    Ok(())
}

/// Captures all measurements emitted by `f` on the current thread.
///
/// Returns them in statsd line format, for example `bus.message.published:1|c|#variant:metric`.
pub fn with_capturing_test_client(f: impl FnOnce()) -> Vec<String> {
    with_capturing_test_client_sample_rate(1.0, f)
}

/// Like [`with_capturing_test_client`] with a global sample rate.
#[doc(hidden)]
pub fn with_capturing_test_client_sample_rate(sample_rate: f64, f: impl FnOnce()) -> Vec<String> {
    capture_with(|client| client.with_sample_rate(sample_rate.into()), f)
}

/// Installs a capturing client shaped by `configure` for the duration of `f`.
pub(crate) fn capture_with(
    configure: impl FnOnce(MetricsClient) -> MetricsClient,
    f: impl FnOnce(),
) -> Vec<String> {
    let (rx, sink) = SpyMetricSink::new();
    let client = configure(MetricsClient::new(StatsdClient::from_sink("", sink)));

    let previous = THREAD_CLIENT.with(|cell| cell.replace(Some(Arc::new(client))));
    f();
    THREAD_CLIENT.with(|cell| cell.replace(previous));

    rx.try_iter()
        .map(|line| String::from_utf8_lossy(&line).into_owned())
        .collect()
}
