use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A set of string key/value pairs, used for both attributes and resources.
pub type Labels = BTreeMap<String, String>;

/// Attribute key holding the logical name of a metric.
pub const WHAT: &str = "what";

/// The `type` field of every payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    /// A point metric. This is the only kind ffwd accepts from this client.
    #[default]
    Metric,
}

/// The canonical structured form of a single metric, as sent over the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Identity of the reporting source.
    pub key: String,

    /// Attributes, always including `what`.
    pub attributes: Labels,

    /// Current value, or `None` if the metric has not been measured yet.
    pub value: Option<Value>,

    /// Payload type, always `metric`.
    #[serde(rename = "type")]
    pub kind: PayloadKind,

    /// Free-form tags, in insertion order.
    pub tags: Vec<String>,

    /// Dimensions of the reporting entity, such as host or pod.
    pub resources: Labels,
}

/// A single observation with an updateable value.
///
/// There is no local aggregation: whatever value a metric holds when it is sent is what the collector receives.
#[derive(Clone, Debug, PartialEq)]
pub struct Metric {
    key: String,
    what: String,
    attributes: Labels,
    resources: Labels,
    tags: Vec<String>,
    value: Option<Value>,
}

impl Metric {
    /// Creates a new `Metric` named `what`, reported under `key`, with a value of zero.
    pub fn new<W, K>(what: W, key: K) -> Self
    where
        W: Into<String>,
        K: Into<String>,
    {
        let what = what.into();
        let mut attributes = Labels::new();
        attributes.insert(WHAT.to_string(), what.clone());

        Metric {
            key: key.into(),
            what,
            attributes,
            resources: Labels::new(),
            tags: Vec::new(),
            value: Some(Value::default()),
        }
    }

    /// Adds the given attributes, overriding any existing attribute with the same key.
    ///
    /// The `what` attribute always reflects the name the metric was created with and cannot be overridden.
    #[must_use]
    pub fn with_attributes<I, K, V>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.attributes.extend(attributes.into_iter().map(|(k, v)| (k.into(), v.into())));
        self.pin_attribute(WHAT, self.what.clone());
        self
    }

    /// Adds the given resources, overriding any existing resource with the same key.
    #[must_use]
    pub fn with_resources<I, K, V>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.resources.extend(resources.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Appends the given tags.
    #[must_use]
    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Sets the initial value.
    #[must_use]
    pub fn with_value<V: Into<Value>>(mut self, value: V) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Overwrites the current value.
    pub fn update<V: Into<Value>>(&mut self, value: V) {
        self.value = Some(value.into());
    }

    /// Returns the current value, if any.
    pub fn value(&self) -> Option<Value> {
        self.value
    }

    /// Returns the key of the reporting source.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the logical name of this metric.
    pub fn what(&self) -> &str {
        &self.what
    }

    /// Returns the attributes.
    pub fn attributes(&self) -> &Labels {
        &self.attributes
    }

    /// Returns the resources.
    pub fn resources(&self) -> &Labels {
        &self.resources
    }

    /// Returns the tags.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Builds the wire payload for the current state of this metric.
    pub fn to_payload(&self) -> Payload {
        Payload {
            key: self.key.clone(),
            attributes: self.attributes.clone(),
            value: self.value,
            kind: PayloadKind::Metric,
            tags: self.tags.clone(),
            resources: self.resources.clone(),
        }
    }

    /// Builds the wire payload and hands it to `sink`.
    pub fn render<F>(&self, sink: F)
    where
        F: FnOnce(Payload),
    {
        sink(self.to_payload());
    }

    /// Fills in any attribute or resource that is not already set from the given defaults.
    pub(crate) fn merge_defaults(&mut self, attributes: &Labels, resources: &Labels) {
        merge_missing(&mut self.attributes, attributes);
        merge_missing(&mut self.resources, resources);
    }

    pub(crate) fn clear_value(&mut self) {
        self.value = None;
    }

    pub(crate) fn pin_attribute(&mut self, key: &str, value: String) {
        self.attributes.insert(key.to_string(), value);
    }
}

fn merge_missing(target: &mut Labels, defaults: &Labels) {
    for (k, v) in defaults {
        target.entry(k.clone()).or_insert_with(|| v.clone());
    }
}
