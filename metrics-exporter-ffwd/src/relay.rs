use std::fmt;

use indexmap::IndexMap;
use quanta::Clock;
use tracing::debug;

use crate::{
    counter::Counter,
    metric::{Labels, Metric},
    timer::Timer,
    transport::{Transport, TransportError},
    value::Value,
};

/// Creates, holds, and sends metrics.
///
/// The relay is a process-local registry of named counters and timers, all reported under a default key and carrying
/// a default set of attributes and resources. Nothing is sent until [`flush`][Relay::flush] is called, and flushing
/// never resets anything: counters keep accumulating on top of what was already sent.
///
/// Counters and timers live in separate namespaces, so a counter and a timer may share a logical name.
///
/// All I/O happens inline on the calling thread, through the relay's [`Transport`].
pub struct Relay {
    default_key: String,
    default_attributes: Labels,
    default_resources: Labels,
    clock: Clock,
    counters: IndexMap<String, Counter>,
    timers: IndexMap<String, Timer>,
    transport: Box<dyn Transport + Send>,
}

impl Relay {
    pub(crate) fn new(
        default_key: String,
        default_attributes: Labels,
        default_resources: Labels,
        clock: Clock,
        transport: Box<dyn Transport + Send>,
    ) -> Self {
        Relay {
            default_key,
            default_attributes,
            default_resources,
            clock,
            counters: IndexMap::new(),
            timers: IndexMap::new(),
            transport,
        }
    }

    /// Sends a one-off metric named `name` with the given value.
    ///
    /// The metric is not retained.
    ///
    /// # Errors
    ///
    /// If the transport fails to send the metric, an error is returned.
    pub fn emit<V: Into<Value>>(&self, name: &str, value: V) -> Result<(), TransportError> {
        self.emit_with(name, value, Labels::new(), Labels::new(), Vec::new())
    }

    /// Sends a one-off metric named `name` with the given value, attributes, resources, and tags.
    ///
    /// The given attributes and resources take precedence over the relay defaults. The metric is not retained.
    ///
    /// # Errors
    ///
    /// If the transport fails to send the metric, an error is returned.
    pub fn emit_with<V: Into<Value>>(
        &self,
        name: &str,
        value: V,
        attributes: Labels,
        resources: Labels,
        tags: Vec<String>,
    ) -> Result<(), TransportError> {
        let mut metric = Metric::new(name, self.default_key.as_str())
            .with_value(value)
            .with_attributes(attributes)
            .with_resources(resources)
            .with_tags(tags);
        metric.merge_defaults(&self.default_attributes, &self.default_resources);

        self.flush_single(&metric)
    }

    /// Increments the counter named `name` by `amount`, creating it if it does not exist yet.
    pub fn increment<V: Into<Value>>(&mut self, name: &str, amount: V) {
        let Relay { default_key, default_attributes, default_resources, counters, .. } = self;
        counters
            .entry(name.to_string())
            .or_insert_with(|| {
                Counter::new(name, default_key.as_str())
                    .with_attributes(default_attributes.clone())
                    .with_resources(default_resources.clone())
            })
            .increment(amount);
    }

    /// Increments the counter named `name` by one, creating it if it does not exist yet.
    pub fn increment_one(&mut self, name: &str) {
        self.increment(name, 1);
    }

    /// Gets a handle to the timer named `name`, creating it if it does not exist yet.
    ///
    /// The handle shares its measurements with the registered timer and does not borrow the relay, so the relay stays
    /// usable while a measurement is in progress. Repeated calls return handles to the same timer until it is replaced
    /// with [`set_timer`][Relay::set_timer].
    pub fn timer(&mut self, name: &str) -> Timer {
        let Relay { default_key, default_attributes, default_resources, clock, timers, .. } = self;
        timers
            .entry(name.to_string())
            .or_insert_with(|| {
                Timer::new(name, default_key.as_str())
                    .with_attributes(default_attributes.clone())
                    .with_resources(default_resources.clone())
                    .with_clock(clock.clone())
            })
            .clone()
    }

    /// Registers `counter` under `name`, replacing any existing counter of that name.
    ///
    /// The relay defaults are filled in underneath the counter's own attributes and resources.
    pub fn set_counter(&mut self, name: &str, mut counter: Counter) {
        counter.merge_defaults(&self.default_attributes, &self.default_resources);
        self.counters.insert(name.to_string(), counter);
    }

    /// Registers `timer` under `name`, replacing any existing timer of that name.
    ///
    /// Handles to the replaced timer keep working but are no longer flushed. The relay defaults are filled in underneath the timer's own attributes and resources.
    pub fn set_timer(&mut self, name: &str, mut timer: Timer) {
        timer.merge_defaults(&self.default_attributes, &self.default_resources);
        self.timers.insert(name.to_string(), timer);
    }

    /// Returns the counter named `name`, if one is registered.
    pub fn counter(&self, name: &str) -> Option<&Counter> {
        self.counters.get(name)
    }

    /// Returns `true` if a counter or timer is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.counters.contains_key(name) || self.timers.contains_key(name)
    }

    /// Returns the number of registered metrics.
    pub fn len(&self) -> usize {
        self.counters.len() + self.timers.len()
    }

    /// Returns `true` if no metrics are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sends every registered metric as one batch.
    ///
    /// Counters are sent first, followed by timers, each in registration order. Nothing is reset.
    ///
    /// # Errors
    ///
    /// If the transport fails to send the batch, an error is returned.
    pub fn flush(&self) -> Result<(), TransportError> {
        if self.is_empty() {
            return Ok(());
        }

        let timers = self.timers.values().map(Timer::to_metric).collect::<Vec<_>>();
        let metrics = self.counters.values().map(Counter::metric).chain(timers.iter()).collect::<Vec<_>>();

        debug!(counters = self.counters.len(), timers = self.timers.len(), "Flushing metrics.");
        self.transport.send(&metrics)
    }

    /// Sends a single metric, bypassing the registry.
    ///
    /// # Errors
    ///
    /// If the transport fails to send the metric, an error is returned.
    pub fn flush_single(&self, metric: &Metric) -> Result<(), TransportError> {
        self.transport.send_single(metric)
    }
}

impl fmt::Debug for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relay")
            .field("default_key", &self.default_key)
            .field("default_attributes", &self.default_attributes)
            .field("default_resources", &self.default_resources)
            .field("counters", &self.counters.keys().collect::<Vec<_>>())
            .field("timers", &self.timers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
