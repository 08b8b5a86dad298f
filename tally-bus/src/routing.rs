use crate::config::ExportConfig;
use crate::envelope::{HEADER_METRIC_NAME, HEADER_METRIC_PREFIX, Headers};

/// Routing key prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "metrics";

/// Separator between segments of routing keys and metric names.
pub const SEPARATOR: char = '.';

/// Normalizes a routing key prefix by removing trailing separators.
///
/// Absent and empty prefixes, including those made up of separators only, fall back to
/// [`DEFAULT_PREFIX`]. Normalization is idempotent.
///
/// ```
/// use tally_bus::normalize_prefix;
///
/// assert_eq!(normalize_prefix(Some("app.node1..")), "app.node1");
/// assert_eq!(normalize_prefix(Some("")), "metrics");
/// assert_eq!(normalize_prefix(None), "metrics");
/// ```
pub fn normalize_prefix(prefix: Option<&str>) -> String {
    match prefix.map(|p| p.trim_end_matches(SEPARATOR)) {
        Some(trimmed) if !trimmed.is_empty() => trimmed.to_owned(),
        _ => DEFAULT_PREFIX.to_owned(),
    }
}

/// Where and how metrics are published, resolved once when a sink is created.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RoutingContext {
    exchange: String,
    prefix: String,
    fixed_headers: Headers,
}

impl RoutingContext {
    /// Creates a routing context, normalizing the prefix.
    pub fn new(exchange: impl Into<String>, prefix: Option<&str>, fixed_headers: Headers) -> Self {
        Self {
            exchange: exchange.into(),
            prefix: normalize_prefix(prefix),
            fixed_headers,
        }
    }

    /// Creates a routing context from the export configuration.
    pub fn from_config(config: &ExportConfig) -> Self {
        Self::new(
            config.exchange.as_str(),
            config.prefix.as_deref(),
            config.headers.clone(),
        )
    }

    /// The exchange or topic all metrics are published to.
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// The normalized prefix, without a trailing separator.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Headers added to every message in addition to the metric headers.
    pub fn fixed_headers(&self) -> &Headers {
        &self.fixed_headers
    }

    /// Returns the routing key for a metric name.
    pub fn routing_key(&self, name: &str) -> String {
        format!("{}{SEPARATOR}{name}", self.prefix)
    }

    /// Returns the full header set for a metric name.
    ///
    /// Fixed headers are applied last and take precedence over `metric.name` and `metric.prefix`.
    pub fn headers_for(&self, name: &str) -> Headers {
        let mut headers = Headers::new();
        headers.insert(HEADER_METRIC_NAME.to_owned(), name.to_owned());
        headers.insert(HEADER_METRIC_PREFIX.to_owned(), self.prefix.clone());
        headers.extend(
            self.fixed_headers
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        headers
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix(Some("app")), "app");
        assert_eq!(normalize_prefix(Some("app.")), "app");
        assert_eq!(normalize_prefix(Some("app...")), "app");
        assert_eq!(normalize_prefix(Some("a.b.c.")), "a.b.c");
        assert_eq!(normalize_prefix(Some("...")), DEFAULT_PREFIX);
        assert_eq!(normalize_prefix(Some("")), DEFAULT_PREFIX);
        assert_eq!(normalize_prefix(None), DEFAULT_PREFIX);
    }

    #[test]
    fn test_normalize_prefix_idempotent() {
        for prefix in ["app", "app.", "app..", "", ".", "x.y.."] {
            let once = normalize_prefix(Some(prefix));
            assert_eq!(normalize_prefix(Some(&once)), once);
        }
    }

    #[test]
    fn test_routing_key_has_single_separator() {
        for prefix in ["app", "app.", "app..."] {
            let context = RoutingContext::new("metrics", Some(prefix), Headers::new());
            assert_eq!(context.routing_key("counter.foo"), "app.counter.foo");
        }

        let context = RoutingContext::new("metrics", None, Headers::new());
        assert_eq!(context.routing_key("gauge.cpu"), "metrics.gauge.cpu");
    }

    #[test]
    fn test_headers_for() {
        let mut fixed = Headers::new();
        fixed.insert("region".to_owned(), "eu".to_owned());
        let context = RoutingContext::new("metrics", Some("app."), fixed);

        let headers = context.headers_for("counter.foo");
        assert_eq!(headers["metric.name"], "counter.foo");
        assert_eq!(headers["metric.prefix"], "app");
        assert_eq!(headers["region"], "eu");
        assert_eq!(headers.len(), 3);
    }

    #[test]
    fn test_fixed_headers_take_precedence() {
        let mut fixed = Headers::new();
        fixed.insert("metric.prefix".to_owned(), "override".to_owned());
        let context = RoutingContext::new("metrics", Some("app"), fixed);

        assert_eq!(context.headers_for("x")["metric.prefix"], "override");
    }

    #[test]
    fn test_from_config() {
        let config: ExportConfig =
            serde_yaml::from_str("exchange: telemetry\nprefix: node1..").unwrap();
        let context = RoutingContext::from_config(&config);

        assert_eq!(context.exchange(), "telemetry");
        assert_eq!(context.prefix(), "node1");
        assert!(context.fixed_headers().is_empty());
    }
}
