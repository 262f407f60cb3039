//! Connection URL.
//!
//! §3 of SPEC_FULL.md treats the URL as an opaque, already-parsed bag of
//! `{protocol, user, password, host, port, path, parameters}` and explicitly puts the URL
//! *parser* out of scope as an external collaborator. [`ConnectionUrl`] is that bag; it's a
//! thin projection over `url::Url` (the parsing crate the teacher already depends on) rather
//! than a hand-rolled parser.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// An immutable, already-parsed connection URL.
///
/// Construct with [`ConnectionUrl::parse`]. Every accessor is a cheap borrow; the value is
/// immutable after construction, matching §3.
#[derive(Debug, Clone)]
pub struct ConnectionUrl {
    protocol: String,
    user: Option<String>,
    password: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    path: String,
    parameters: BTreeMap<String, String>,
}

impl ConnectionUrl {
    /// Parses a connection URL such as `sqlite:///path/to/db?synchronous=off` or
    /// `postgresql://user:pw@host:5432/db?use-ssl=true`.
    ///
    /// The leading `/` of the path is stripped, per §6 ("Path's leading `/` is stripped to
    /// obtain the database/service name").
    pub fn parse(url: &str) -> Result<Self> {
        let parsed = url::Url::parse(url)?;

        let parameters = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let path = parsed.path().strip_prefix('/').unwrap_or(parsed.path()).to_owned();

        Ok(ConnectionUrl {
            protocol: parsed.scheme().to_owned(),
            user: non_empty(parsed.username()),
            password: parsed.password().map(str::to_owned),
            host: parsed.host_str().map(str::to_owned),
            port: parsed.port(),
            path,
            parameters,
        })
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// The explicit port, if present; callers apply their own backend-specific default
    /// (MySQL 3306, PostgreSQL 5432, Oracle 1521 — §6).
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// The database/service name (path with its leading `/` already stripped).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Looks up a query parameter. Query parameters double as the `user=`/`password=`
    /// overrides and driver-specific pragmas/options documented in §6.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// `user=`/`password=` query parameters take precedence over the userinfo component,
    /// matching every example URL in §6 which lists both forms.
    pub fn effective_user(&self) -> Option<&str> {
        self.parameter("user").or(self.user())
    }

    pub fn effective_password(&self) -> Option<&str> {
        self.parameter("password").or(self.password())
    }

    pub fn parameter_bool(&self, name: &str) -> Option<bool> {
        self.parameter(name).map(|v| matches!(v, "true" | "1" | "yes"))
    }

    pub fn as_str_for_error(&self) -> String {
        format!("{}://{}", self.protocol, self.host.as_deref().unwrap_or(&self.path))
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_owned())
    }
}

/// Returns `true` if `scheme` is supported by a driver whose table's name is a prefix of
/// `scheme` — the prefix-match dispatch from §4.5, but usable before a [`ConnectionUrl`] is
/// even constructed, mirroring `Connection_isSupported` in the source.
pub fn protocol_is_registered(scheme: &str) -> bool {
    crate::driver::lookup(scheme).is_some()
}

pub(crate) fn unsupported(protocol: &str) -> Error {
    Error::UnsupportedProtocol(protocol.to_owned())
}
