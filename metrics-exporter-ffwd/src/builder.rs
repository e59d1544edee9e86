use std::{
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs as _},
};

use quanta::Clock;
use thiserror::Error;
use tracing::debug;

use crate::{
    metric::Labels,
    relay::Relay,
    transport::{HttpSender, Transport, UdpSender},
};

/// Default address of the ffwd agent.
pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Default port of the ffwd agent, for both the UDP and HTTP inputs.
pub const DEFAULT_PORT: u16 = 19000;

/// Errors that could occur while building a relay.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Both a host name and an IP address were configured.
    #[error("both a host and an IP address were set, but only one of them is allowed at a time")]
    ConflictingHosts,

    /// Failed to resolve the remote address.
    #[error("invalid remote address: {reason}")]
    InvalidRemoteAddress {
        /// Details about the resolution failure.
        reason: String,
    },

    /// Failed to form a valid URI for the HTTP endpoint.
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        /// The endpoint as it was assembled from the configuration.
        endpoint: String,

        /// Details about the parsing failure.
        reason: String,
    },

    /// Failed to create the socket or runtime backing the transport.
    #[error("failed to create transport: {0}")]
    Io(#[from] io::Error),
}

enum Destination {
    Host(String),
    Ip(IpAddr),
}

impl Destination {
    fn http_host(&self) -> String {
        match self {
            Destination::Host(host) => host.clone(),
            Destination::Ip(IpAddr::V6(ip)) => format!("[{ip}]"),
            Destination::Ip(ip) => ip.to_string(),
        }
    }

    fn socket_addr(&self, port: u16) -> Result<SocketAddr, BuildError> {
        match self {
            Destination::Ip(ip) => Ok(SocketAddr::new(*ip, port)),
            Destination::Host(host) => {
                let addrs = (host.as_str(), port)
                    .to_socket_addrs()
                    .map_err(|e| BuildError::InvalidRemoteAddress { reason: e.to_string() })?;
                prefer_ipv4(addrs).ok_or_else(|| BuildError::InvalidRemoteAddress {
                    reason: format!("'{host}' did not resolve to any address"),
                })
            }
        }
    }
}

/// Picks the first IPv4 address, falling back to the first IPv6 address when the host has no IPv4 address at all.
///
/// Resolvers commonly list `::1` ahead of `127.0.0.1` for `localhost`, while the agent listens on IPv4 by default.
fn prefer_ipv4<I>(addrs: I) -> Option<SocketAddr>
where
    I: IntoIterator<Item = SocketAddr>,
{
    let mut fallback = None;
    for addr in addrs {
        if addr.is_ipv4() {
            return Some(addr);
        }
        fallback = fallback.or(Some(addr));
    }
    fallback
}

/// Builder for a [`Relay`].
///
/// The builder owns copies of the default attributes and resources it is given, so changes a caller makes to their
/// own maps afterwards never reach metrics created by the relay.
pub struct RelayBuilder {
    default_key: String,
    host: Option<String>,
    ip: Option<IpAddr>,
    port: u16,
    path: Option<String>,
    default_attributes: Labels,
    default_resources: Labels,
    use_http: bool,
    clock: Option<Clock>,
}

impl RelayBuilder {
    /// Creates a new `RelayBuilder` reporting metrics under `default_key`.
    pub fn new<K: Into<String>>(default_key: K) -> Self {
        RelayBuilder {
            default_key: default_key.into(),
            host: None,
            ip: None,
            port: DEFAULT_PORT,
            path: None,
            default_attributes: Labels::new(),
            default_resources: Labels::new(),
            use_http: false,
            clock: None,
        }
    }

    /// Sets the host name of the agent.
    ///
    /// For HTTP, the host may carry an explicit `http://` or `https://` scheme. Mutually exclusive with
    /// [`with_ip`][Self::with_ip].
    ///
    /// Defaults to `127.0.0.1`.
    #[must_use]
    pub fn with_host<H: Into<String>>(mut self, host: H) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the IP address of the agent.
    ///
    /// Mutually exclusive with [`with_host`][Self::with_host].
    #[must_use]
    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip = Some(ip);
        self
    }

    /// Sets the port of the agent.
    ///
    /// Defaults to 19000.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the path of the HTTP endpoint. Ignored for UDP.
    #[must_use]
    pub fn with_path<P: Into<String>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the attributes applied to every metric created by the relay.
    ///
    /// Attributes set explicitly on a metric take precedence.
    #[must_use]
    pub fn with_default_attributes<I, K, V>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.default_attributes = attributes.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    /// Sets the resources applied to every metric created by the relay.
    ///
    /// Resources set explicitly on a metric take precedence.
    #[must_use]
    pub fn with_default_resources<I, K, V>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.default_resources = resources.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    /// Sends metrics in batches over HTTP instead of as individual UDP datagrams.
    ///
    /// Defaults to `false`.
    #[must_use]
    pub fn with_http(mut self, use_http: bool) -> Self {
        self.use_http = use_http;
        self
    }

    /// Sets the clock handed to timers created by the relay.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the relay, opening the configured transport.
    ///
    /// # Errors
    ///
    /// If both a host and an IP address are set, [`BuildError::ConflictingHosts`] is returned before any transport
    /// resources are created. Otherwise, an error is returned if the destination cannot be resolved or the transport
    /// cannot be created.
    pub fn build(self) -> Result<Relay, BuildError> {
        let destination = self.destination()?;

        let transport: Box<dyn Transport + Send> = if self.use_http {
            let sender = HttpSender::new(&destination.http_host(), self.port, self.path.as_deref())?;
            debug!(endpoint = %sender.endpoint(), "Sending metrics over HTTP.");
            Box::new(sender)
        } else {
            let sender = UdpSender::new(destination.socket_addr(self.port)?)?;
            debug!(remote_addr = %sender.remote_addr(), "Sending metrics over UDP.");
            Box::new(sender)
        };

        Ok(self.into_relay(transport))
    }

    /// Builds the relay on top of a caller-supplied transport.
    ///
    /// Destination settings (host, IP, port, path, HTTP) are not used, but are still validated for conflicts.
    ///
    /// # Errors
    ///
    /// If both a host and an IP address are set, [`BuildError::ConflictingHosts`] is returned.
    pub fn build_with_transport<T>(self, transport: T) -> Result<Relay, BuildError>
    where
        T: Transport + Send + 'static,
    {
        self.destination()?;
        Ok(self.into_relay(Box::new(transport)))
    }

    fn destination(&self) -> Result<Destination, BuildError> {
        match (&self.host, self.ip) {
            (Some(_), Some(_)) => Err(BuildError::ConflictingHosts),
            (Some(host), None) => Ok(Destination::Host(host.clone())),
            (None, Some(ip)) => Ok(Destination::Ip(ip)),
            (None, None) => Ok(Destination::Ip(DEFAULT_HOST)),
        }
    }

    fn into_relay(self, transport: Box<dyn Transport + Send>) -> Relay {
        Relay::new(
            self.default_key,
            self.default_attributes,
            self.default_resources,
            self.clock.unwrap_or_else(Clock::new),
            transport,
        )
    }
}
