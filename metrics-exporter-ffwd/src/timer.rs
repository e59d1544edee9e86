use std::{fmt, sync::Arc, time::Duration};

use parking_lot::Mutex;
use quanta::{Clock, Instant};

use crate::{
    metric::{Labels, Metric, Payload},
    value::Value,
};

/// Attribute key holding the unit of a timer.
pub const UNIT: &str = "unit";

const NANOSECONDS: &str = "ns";
const NANOS_PER_SEC: f64 = 1e9;

/// A metric that measures the wall-clock duration of a scoped region, in nanoseconds.
///
/// The value is unset until the first measurement completes. Each measurement overwrites the previous one.
///
/// `Timer` is a handle: clones share the same measured value, so a handle obtained from a [`Relay`][crate::Relay]
/// can be held across a scope that keeps using the relay.
#[derive(Clone)]
pub struct Timer {
    metric: Metric,
    value: Arc<Mutex<Option<Value>>>,
    clock: Clock,
}

impl Timer {
    /// Creates a new `Timer` named `what`, reported under `key`.
    pub fn new<W, K>(what: W, key: K) -> Self
    where
        W: Into<String>,
        K: Into<String>,
    {
        let mut metric = Metric::new(what, key);
        metric.clear_value();
        metric.pin_attribute(UNIT, NANOSECONDS.to_string());

        Timer { metric, value: Arc::new(Mutex::new(None)), clock: Clock::new() }
    }

    /// Sets the clock used for measurements.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Adds the given attributes. See [`Metric::with_attributes`].
    ///
    /// The `unit` attribute is always `ns` and cannot be overridden.
    #[must_use]
    pub fn with_attributes<I, K, V>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.metric = self.metric.with_attributes(attributes);
        self.metric.pin_attribute(UNIT, NANOSECONDS.to_string());
        self
    }

    /// Adds the given resources. See [`Metric::with_resources`].
    #[must_use]
    pub fn with_resources<I, K, V>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.metric = self.metric.with_resources(resources);
        self
    }

    /// Appends the given tags.
    #[must_use]
    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.metric = self.metric.with_tags(tags);
        self
    }

    /// Starts a measurement.
    ///
    /// The elapsed time is recorded when the returned guard is dropped, including when the stack is unwinding from a
    /// panic. The guard does not borrow this handle.
    pub fn start(&self) -> TimerGuard {
        TimerGuard { value: Arc::clone(&self.value), clock: self.clock.clone(), start: self.clock.now() }
    }

    /// Runs `f`, recording how long it took.
    ///
    /// The measurement is stored before the result of `f` is handed back, so an `Err` returned by `f` still reaches
    /// the caller untouched, as does a panic.
    pub fn time<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = self.start();
        f()
    }

    /// Overwrites the current value, for every handle to this timer.
    pub fn update<V: Into<Value>>(&self, value: V) {
        *self.value.lock() = Some(value.into());
    }

    /// Returns the last measurement, in nanoseconds, if any.
    pub fn value(&self) -> Option<Value> {
        *self.value.lock()
    }

    /// Returns a snapshot of the underlying metric, carrying the last measurement.
    pub fn to_metric(&self) -> Metric {
        let mut metric = self.metric.clone();
        if let Some(value) = self.value() {
            metric.update(value);
        }
        metric
    }

    /// Builds the wire payload for the current state of this timer.
    pub fn to_payload(&self) -> Payload {
        self.to_metric().to_payload()
    }

    /// Builds the wire payload and hands it to `sink`.
    pub fn render<F>(&self, sink: F)
    where
        F: FnOnce(Payload),
    {
        sink(self.to_payload());
    }

    pub(crate) fn merge_defaults(&mut self, attributes: &Labels, resources: &Labels) {
        self.metric.merge_defaults(attributes, resources);
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer").field("metric", &self.metric).field("value", &self.value()).finish_non_exhaustive()
    }
}

impl From<Timer> for Metric {
    fn from(timer: Timer) -> Metric {
        timer.to_metric()
    }
}

/// An in-flight measurement. Dropping it records the elapsed time on the [`Timer`] it was started from.
#[must_use = "dropping the guard immediately ends the measurement"]
pub struct TimerGuard {
    value: Arc<Mutex<Option<Value>>>,
    clock: Clock,
    start: Instant,
}

impl TimerGuard {
    /// Returns the time elapsed since the measurement started.
    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.start)
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        let nanos = self.elapsed().as_secs_f64() * NANOS_PER_SEC;
        *self.value.lock() = Some(Value::Float(nanos));
    }
}

impl fmt::Debug for TimerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerGuard").field("elapsed", &self.elapsed()).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        panic::{catch_unwind, AssertUnwindSafe},
        time::Duration,
    };

    use quanta::Clock;

    use super::Timer;
    use crate::{metric::Labels, value::Value};

    #[test]
    fn unset_until_measured() {
        let timer = Timer::new("timer", "key");
        let json = serde_json::to_value(timer.to_payload()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "key": "key",
                "attributes": {"what": "timer", "unit": "ns"},
                "value": null,
                "type": "metric",
                "tags": [],
                "resources": {},
            })
        );
    }

    #[test]
    fn measures_in_nanoseconds() {
        let (clock, mock) = Clock::mock();
        let timer = Timer::new("timer", "key").with_attributes([("test", "test")]).with_clock(clock);

        timer.time(|| mock.increment(Duration::from_secs(1)));

        assert_eq!(timer.value(), Some(Value::Float(1_000_000_000.0)));
    }

    #[test]
    fn measures_with_tags_and_resources() {
        let (clock, mock) = Clock::mock();
        let timer = Timer::new("timer", "key")
            .with_attributes([("test", "test")])
            .with_resources([("res1", "test")])
            .with_tags(["test"])
            .with_clock(clock);

        {
            let _guard = timer.start();
            mock.increment(Duration::from_secs(1));
        }

        assert_eq!(timer.value(), Some(Value::Float(1_000_000_000.0)));
        let metric = timer.to_metric();
        assert_eq!(metric.tags(), ["test".to_string()]);
        assert_eq!(metric.resources().get("res1").map(String::as_str), Some("test"));
    }

    #[test]
    fn records_when_body_fails() {
        let (clock, mock) = Clock::mock();
        let timer = Timer::new("timer", "key").with_clock(clock);

        let result: Result<(), &str> = timer.time(|| {
            mock.increment(Duration::from_millis(250));
            Err("boom")
        });

        assert_eq!(result, Err("boom"));
        assert_eq!(timer.value(), Some(Value::Float(250_000_000.0)));
    }

    #[test]
    fn records_when_body_panics() {
        let (clock, mock) = Clock::mock();
        let timer = Timer::new("timer", "key").with_clock(clock);

        let result = catch_unwind(AssertUnwindSafe(|| {
            let _: () = timer.time(|| {
                mock.increment(Duration::from_secs(2));
                panic!("measured body failed");
            });
        }));

        assert!(result.is_err());
        assert_eq!(timer.value(), Some(Value::Float(2_000_000_000.0)));
    }

    #[test]
    fn each_measurement_overwrites() {
        let (clock, mock) = Clock::mock();
        let timer = Timer::new("timer", "key").with_clock(clock);

        timer.time(|| mock.increment(Duration::from_secs(3)));
        timer.time(|| mock.increment(Duration::from_secs(1)));

        assert_eq!(timer.value(), Some(Value::Float(1_000_000_000.0)));
    }

    #[test]
    fn unit_is_fixed() {
        let mut timer = Timer::new("timer", "key").with_attributes([("unit", "ms")]);
        let defaults: Labels = [("unit".to_string(), "s".to_string())].into_iter().collect();
        timer.merge_defaults(&defaults, &Labels::new());

        assert_eq!(timer.to_metric().attributes().get("unit").map(String::as_str), Some("ns"));
    }

    #[test]
    fn clones_share_measurements() {
        let (clock, mock) = Clock::mock();
        let timer = Timer::new("timer", "key").with_clock(clock);
        let other = timer.clone();

        other.time(|| mock.increment(Duration::from_secs(4)));
        assert_eq!(timer.value(), Some(Value::Float(4_000_000_000.0)));

        timer.update(7);
        assert_eq!(other.to_payload().value, Some(Value::Integer(7)));
    }

    #[test]
    fn guard_outlives_handle() {
        let (clock, mock) = Clock::mock();
        let timer = Timer::new("timer", "key").with_clock(clock);

        let guard = timer.clone().start();
        mock.increment(Duration::from_millis(500));
        assert_eq!(guard.elapsed(), Duration::from_millis(500));
        drop(guard);

        assert_eq!(timer.value(), Some(Value::Float(500_000_000.0)));
    }
}
