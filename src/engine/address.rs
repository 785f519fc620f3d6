//! Broker connection strings.
//!
//! `scheme://[user[:pass]@]host[:port][?key=value&...]`
//!
//! The scheme picks the transport. `amqp://` URLs are handed to lapin as
//! they are; `mqtt://` URLs are parsed here into an `MqttConfig`.
//!
//! Username, password and `clientId` are percent-decoded, so `%40`, `%26`
//! and `%3F` stand for a literal `@`, `&` and `?`. IPv6 hosts are kept in
//! brackets.

use std::fmt;

use crate::utils::ConfigurationError;

pub const MQTT_SCHEME: &str = "mqtt://";
pub const AMQP_SCHEME: &str = "amqp://";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Amqp,
    Mqtt,
}

impl TransportKind {
    pub fn from_url(url: &str) -> Result<Self, ConfigurationError> {
        if url.starts_with(MQTT_SCHEME) {
            Ok(Self::Mqtt)
        } else if url.starts_with(AMQP_SCHEME) {
            Ok(Self::Amqp)
        } else {
            Err(ConfigurationError::UnsupportedScheme(url.to_string()))
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Amqp => AMQP_SCHEME,
            Self::Mqtt => MQTT_SCHEME,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Amqp => f.write_str("amqp"),
            Self::Mqtt => f.write_str("mqtt"),
        }
    }
}

/// Connection settings for the MQTT engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    /// Seconds.
    pub keep_alive: u16,
    /// Empty means "generate one when connecting".
    pub client_id: String,
    pub clean_session: bool,
    pub username: String,
    pub password: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: Self::DEFAULT_PORT,
            keep_alive: Self::DEFAULT_KEEP_ALIVE,
            client_id: String::new(),
            clean_session: true,
            username: String::new(),
            password: String::new(),
        }
    }
}

impl MqttConfig {
    pub const DEFAULT_PORT: u16 = 1883;
    pub const DEFAULT_KEEP_ALIVE: u16 = 180;

    pub fn from_url(url: &str) -> Result<Self, ConfigurationError> {
        let rest = url
            .strip_prefix(MQTT_SCHEME)
            .ok_or_else(|| ConfigurationError::UnsupportedScheme(url.to_string()))?;

        let mut config = Self::default();

        let (authority, query) = match rest.split_once('?') {
            Some((authority, query)) => (authority, Some(query)),
            None => (rest, None),
        };

        let host_port = match authority.split_once('@') {
            Some((userinfo, host_port)) => {
                let (user, pass) = userinfo.split_once(':').unwrap_or((userinfo, ""));
                config.username = decode(user)?;
                config.password = decode(pass)?;
                host_port
            }
            None => authority,
        };

        let (host, port) = split_port(host_port)?;
        config.host = host;
        if let Some(port) = port {
            config.port = port;
        }

        if let Some(query) = query {
            for pair in query.split('&').filter(|kv| !kv.is_empty()) {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                config.apply(key, value)?;
            }
        }

        Ok(config)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigurationError> {
        match key {
            "keepAlive" => self.keep_alive = parse_keep_alive(value)?,
            "clientId" => self.client_id = decode(value)?,
            "cleanSession" => self.clean_session = !matches!(value, "0" | "no" | "false"),
            _ => {}
        }
        Ok(())
    }

    /// Canonical URL; `from_url(to_url())` yields the same config.
    pub fn to_url(&self) -> String {
        let mut url = String::from(MQTT_SCHEME);
        // a host with `@` in it needs the separator even without credentials
        if !self.username.is_empty() || !self.password.is_empty() || self.host.contains('@') {
            url.push_str(&urlencoding::encode(&self.username));
            if !self.password.is_empty() {
                url.push(':');
                url.push_str(&urlencoding::encode(&self.password));
            }
            url.push('@');
        }
        url.push_str(&format!(
            "{}:{}?keepAlive={}&clientId={}&cleanSession={}",
            self.host,
            self.port,
            self.keep_alive,
            urlencoding::encode(&self.client_id),
            self.clean_session
        ));
        url
    }
}

fn parse_keep_alive(value: &str) -> Result<u16, ConfigurationError> {
    match value.parse::<u16>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(ConfigurationError::BadKeepAlive),
    }
}

fn decode(value: &str) -> Result<String, ConfigurationError> {
    urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| ConfigurationError::BadEncoding(value.to_string()))
}

/// Splits an optional trailing `:port` off the host. An empty port means
/// the default. An unbracketed IPv6 literal has no port and gets bracketed.
fn split_port(host_port: &str) -> Result<(String, Option<u16>), ConfigurationError> {
    let bad_port = || ConfigurationError::BadPort(host_port.to_string());

    let (host, port) = if host_port.starts_with('[') {
        let end = host_port.find(']').ok_or_else(bad_port)?;
        let (host, rest) = host_port.split_at(end + 1);
        if rest.is_empty() {
            (host.to_string(), None)
        } else {
            (host.to_string(), Some(rest.strip_prefix(':').ok_or_else(bad_port)?))
        }
    } else {
        match host_port.rsplit_once(':') {
            Some((host, _)) if host.contains(':') => (format!("[{host_port}]"), None),
            Some((host, port)) => (host.to_string(), Some(port)),
            None => (host_port.to_string(), None),
        }
    };

    let port = match port {
        None | Some("") => None,
        Some(port) if port.bytes().all(|b| b.is_ascii_digit()) => {
            Some(port.parse::<u16>().map_err(|_| bad_port())?)
        }
        Some(_) => return Err(bad_port()),
    };
    Ok((host, port))
}
