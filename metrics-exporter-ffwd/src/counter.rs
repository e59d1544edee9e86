use crate::{
    metric::{Labels, Metric, Payload},
    value::Value,
};

/// A metric that keeps track of an incrementally increasing value.
///
/// Counters are never reset: flushing sends the current total, and subsequent increments build on top of it.
#[derive(Clone, Debug, PartialEq)]
pub struct Counter {
    metric: Metric,
}

impl Counter {
    /// Creates a new `Counter` named `what`, reported under `key`, starting at zero.
    pub fn new<W, K>(what: W, key: K) -> Self
    where
        W: Into<String>,
        K: Into<String>,
    {
        Counter { metric: Metric::new(what, key) }
    }

    /// Adds the given attributes. See [`Metric::with_attributes`].
    #[must_use]
    pub fn with_attributes<I, K, V>(self, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Counter { metric: self.metric.with_attributes(attributes) }
    }

    /// Adds the given resources. See [`Metric::with_resources`].
    #[must_use]
    pub fn with_resources<I, K, V>(self, resources: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Counter { metric: self.metric.with_resources(resources) }
    }

    /// Appends the given tags.
    #[must_use]
    pub fn with_tags<I, T>(self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Counter { metric: self.metric.with_tags(tags) }
    }

    /// Sets the value the counter starts from.
    #[must_use]
    pub fn with_value<V: Into<Value>>(self, value: V) -> Self {
        Counter { metric: self.metric.with_value(value) }
    }

    /// Increments the counter by `amount`.
    ///
    /// Fractional amounts are allowed, and turn the counter into a floating-point counter from then on.
    pub fn increment<V: Into<Value>>(&mut self, amount: V) {
        let current = self.metric.value().unwrap_or_default();
        self.metric.update(current + amount.into());
    }

    /// Increments the counter by one.
    pub fn increment_one(&mut self) {
        self.increment(1);
    }

    /// Overwrites the current value.
    pub fn update<V: Into<Value>>(&mut self, value: V) {
        self.metric.update(value);
    }

    /// Returns the current value.
    pub fn value(&self) -> Value {
        self.metric.value().unwrap_or_default()
    }

    /// Returns the underlying metric.
    pub fn metric(&self) -> &Metric {
        &self.metric
    }

    /// Builds the wire payload for the current state of this counter.
    pub fn to_payload(&self) -> Payload {
        self.metric.to_payload()
    }

    /// Builds the wire payload and hands it to `sink`.
    pub fn render<F>(&self, sink: F)
    where
        F: FnOnce(Payload),
    {
        self.metric.render(sink);
    }

    pub(crate) fn merge_defaults(&mut self, attributes: &Labels, resources: &Labels) {
        self.metric.merge_defaults(attributes, resources);
    }
}

impl From<Counter> for Metric {
    fn from(counter: Counter) -> Metric {
        counter.metric
    }
}
