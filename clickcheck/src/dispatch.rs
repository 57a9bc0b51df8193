//! Sending composed messages through an authenticated mail relay.

use lettre::address::{Address, Envelope};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{SmtpTransport, Transport as _};
use tracing::{error, info};

use crate::error::{ConfigError, TransportError};
use crate::params::TrackingParameters;
use crate::sink::RecordSink;

/// Mail relay location and credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relay {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl Relay {
    /// Parse a `host:port` smarthost. IPv6 hosts must be bracketed.
    pub fn from_smarthost(
        smarthost: &str,
        username: &str,
        password: &str,
    ) -> Result<Self, ConfigError> {
        let malformed = |reason| ConfigError::Smarthost {
            value: smarthost.to_string(),
            reason,
        };

        let (host, port) = if let Some(bracketed) = smarthost.strip_prefix('[') {
            bracketed
                .split_once("]:")
                .ok_or_else(|| malformed("missing port after bracketed host"))?
        } else {
            let (host, port) = smarthost
                .rsplit_once(':')
                .ok_or_else(|| malformed("missing port"))?;
            if host.contains(':') {
                return Err(malformed("too many colons"));
            }
            (host, port)
        };

        if host.is_empty() {
            return Err(malformed("missing host"));
        }
        let port = port.parse().map_err(|_| malformed("invalid port"))?;

        Ok(Self {
            host: host.to_string(),
            port,
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

/// Capability to deliver one message to one recipient.
pub trait Transport {
    fn send(&self, from: &str, to: &str, message: &[u8]) -> Result<(), TransportError>;
}

/// SMTP relay client. Upgrades to TLS when the server offers STARTTLS and
/// authenticates with PLAIN when credentials are configured.
pub struct SmtpRelay {
    relay: Relay,
    transport: SmtpTransport,
}

impl SmtpRelay {
    pub fn new(relay: Relay) -> Result<Self, TransportError> {
        let tls = TlsParameters::new(relay.host.clone()).map_err(|e| TransportError::Relay {
            host: relay.host.clone(),
            reason: e.to_string(),
        })?;

        let mut builder = SmtpTransport::builder_dangerous(relay.host.as_str())
            .port(relay.port)
            .tls(Tls::Opportunistic(tls));

        if !relay.username.is_empty() {
            builder = builder
                .credentials(Credentials::new(
                    relay.username.clone(),
                    relay.password.clone(),
                ))
                .authentication(vec![Mechanism::Plain]);
        }

        Ok(Self {
            transport: builder.build(),
            relay,
        })
    }
}

impl Transport for SmtpRelay {
    fn send(&self, from: &str, to: &str, message: &[u8]) -> Result<(), TransportError> {
        let envelope = Envelope::new(Some(envelope_address(from)?), vec![envelope_address(to)?])
            .map_err(|e| TransportError::Address {
                value: to.to_string(),
                reason: e.to_string(),
            })?;

        info!(
            host = %self.relay.host,
            port = self.relay.port,
            from = %from,
            to = %to,
            "smtp_send_start"
        );

        self.transport
            .send_raw(&envelope, message)
            .map_err(|e| TransportError::Send(e.to_string()))?;

        Ok(())
    }
}

/// Extract the bare address from either `user@host` or `Name <user@host>`.
pub fn envelope_address(value: &str) -> Result<Address, TransportError> {
    let invalid = |reason: String| TransportError::Address {
        value: value.to_string(),
        reason,
    };

    match value.trim().parse::<Address>() {
        Ok(address) => Ok(address),
        Err(_) => value
            .parse::<Mailbox>()
            .map(|mailbox| mailbox.email)
            .map_err(|e| invalid(e.to_string())),
    }
}

/// A composed message ready to be sent.
#[derive(Debug, Clone)]
pub struct Outgoing {
    pub from: String,
    pub to: String,
    pub message: Vec<u8>,
    pub link: String,
    pub params: TrackingParameters,
}

/// Send `outgoing` and, on success, report the recipient, link and
/// parameters to `sink`.
///
/// Failures are returned as-is; nothing is retried.
pub fn dispatch(
    transport: &dyn Transport,
    outgoing: &Outgoing,
    sink: &RecordSink,
) -> Result<(), TransportError> {
    if let Err(e) = transport.send(&outgoing.from, &outgoing.to, &outgoing.message) {
        error!(to = %outgoing.to, error = %e, "mail_send_failed");
        return Err(e);
    }

    info!(
        to = %outgoing.to,
        link = %outgoing.link,
        param_count = outgoing.params.len(),
        "mail_sent"
    );

    sink.line(&format!("Mail sent to {}\n{}", outgoing.to, outgoing.link))?;
    sink.emit_params(&outgoing.params)?;
    Ok(())
}
