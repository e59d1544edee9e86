//! A client for emitting point metrics to a local [ffwd][ffwd] agent.
//!
//! [ffwd]: https://github.com/spotify/ffwd
//!
//! Every value emitted is a complete, independent observation: there is no local aggregation, windowing, or
//! retrying. Metrics are forwarded either immediately, for one-off values, or when the relay is explicitly flushed.
//!
//! # Usage
//!
//! ```no_run
//! # use metrics_exporter_ffwd::RelayBuilder;
//! // Build a relay that reports under the key `my-service`, tagging every metric with the host it runs on.
//! let mut relay = RelayBuilder::new("my-service")
//!     .with_default_attributes([("host", "web-01")])
//!     .build()
//!     .expect("failed to build relay");
//!
//! // Counters are created on first use.
//! relay.increment_one("requests");
//!
//! // Timers measure a scoped region in nanoseconds, even if the region returns an error. The relay stays usable
//! // while the measurement is running.
//! let result: Result<(), &str> = relay.timer("handler").time(|| {
//!     relay.increment_one("handled");
//!     Ok(())
//! });
//!
//! // One-off values are sent right away and are not retained.
//! relay.emit("queue-depth", 12).expect("failed to emit");
//!
//! // Send everything that is registered. Nothing is reset.
//! relay.flush().expect("failed to flush");
//! # let _ = result;
//! ```
//!
//! # Transports
//!
//! ## UDP
//!
//! By default, each metric is sent as its own datagram to `127.0.0.1:19000`, encoded as JSON:
//!
//! ```json
//! {"key":"my-service","attributes":{"host":"web-01","what":"requests"},"value":1,"type":"metric","tags":[],"resources":{}}
//! ```
//!
//! Datagrams lost in flight go unnoticed. Only failures of the socket write itself are reported.
//!
//! ## HTTP
//!
//! With [`RelayBuilder::with_http`], all metrics in a flush are posted as a single batch:
//!
//! ```json
//! {"points":[{"key":"my-service","tags":{"host":"web-01","what":"requests"},"resource":{},"value":1,"timestamp":1500000000000}]}
//! ```
//!
//! Any non-success status is returned as an error. The request is made synchronously, so an HTTP relay must not be
//! flushed from within an asynchronous runtime.
//!
//! # Concurrency
//!
//! A relay is meant to be owned by a single thread. Sharing one across threads requires external synchronization,
//! such as wrapping it in a `Mutex`.
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod builder;
pub use self::builder::{BuildError, RelayBuilder, DEFAULT_HOST, DEFAULT_PORT};

mod counter;
pub use self::counter::Counter;

mod metric;
pub use self::metric::{Labels, Metric, Payload, PayloadKind, WHAT};

mod relay;
pub use self::relay::Relay;

mod timer;
pub use self::timer::{Timer, TimerGuard, UNIT};

pub mod transport;
pub use self::transport::{Transport, TransportError};

mod value;
pub use self::value::Value;
