//! Delivery of metrics to the collector.

use std::io;

use hyper::StatusCode;
use thiserror::Error;

use crate::metric::Metric;

pub mod http;
pub mod udp;

pub use self::{http::HttpSender, udp::UdpSender};

/// Errors that could occur while delivering metrics to the collector.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Writing to the socket failed.
    #[error("failed to send datagram: {0}")]
    Io(#[from] io::Error),

    /// Encoding the payload failed.
    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The HTTP request could not be built.
    #[error("failed to build request: {reason}")]
    InvalidRequest {
        /// Details about the failure.
        reason: String,
    },

    /// The HTTP request could not be completed.
    #[error("failed to send request: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    /// The collector answered with a non-success status.
    #[error("collector responded with status {status}: {body}")]
    Status {
        /// Response status.
        status: StatusCode,

        /// Response body, or a placeholder if it could not be read.
        body: String,
    },
}

/// A delivery mechanism for metrics.
///
/// Transports serialize each metric's wire payload and ship it to the collector. Delivery happens inline on the
/// calling thread; there is no buffering, batching across calls, or retrying.
pub trait Transport {
    /// Sends the given metrics.
    ///
    /// # Errors
    ///
    /// If a payload cannot be serialized or delivered, an error is returned. Transports with best-effort delivery,
    /// such as UDP, only fail when the underlying write fails, not when a payload is lost in flight.
    fn send(&self, metrics: &[&Metric]) -> Result<(), TransportError>;

    /// Sends a single metric.
    ///
    /// # Errors
    ///
    /// See [`Transport::send`].
    fn send_single(&self, metric: &Metric) -> Result<(), TransportError> {
        self.send(&[metric])
    }
}
