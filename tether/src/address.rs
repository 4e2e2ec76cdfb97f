//! # Endpoint addresses
//!
//! Addresses are validated and normalized before any channel exists, so malformed
//! input fails construction immediately rather than surfacing as an obscure
//! transport error later.
//!
//! Two addresses are considered equal when they differ only by casing or by a
//! trailing slash; both are normalized away so logically-equal addresses land on
//! the same cache entry.
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("Address '{0}' is empty or malformed")]
    Malformed(String),
    #[error("Port {port} is outside the valid range [1, 65535]")]
    PortOutOfRange { port: u32 },
}

/// A validated endpoint address.
///
/// The original spelling is kept for display; equality and hashing use the
/// normalized form (lowercased, trailing slash trimmed).
#[derive(Debug, Clone)]
pub struct EndpointAddress {
    uri: String,
    normalized: String,
}

impl EndpointAddress {
    /// Parses and validates an address string.
    ///
    /// # Returns
    ///
    /// * `Ok(EndpointAddress)` - The validated address.
    /// * `Err(AddressError::Malformed)` - Empty input or embedded whitespace.
    pub fn parse(addr: &str) -> Result<Self, AddressError> {
        let trimmed = addr.trim();
        if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
            return Err(AddressError::Malformed(addr.to_string()));
        }
        Ok(Self {
            uri: trimmed.to_string(),
            normalized: normalize(trimmed),
        })
    }

    /// Expands a `(scheme, host, port)` triple into a full address, using the
    /// contract identity as the path: `scheme://host:port/<contract-full-name>`.
    ///
    /// The port is validated against `[1, 65535]` before anything else happens.
    pub fn from_host_port(
        scheme: &str,
        host: &str,
        port: u32,
        contract_full_name: &str,
    ) -> Result<Self, AddressError> {
        if port == 0 || port > u32::from(u16::MAX) {
            return Err(AddressError::PortOutOfRange { port });
        }
        Self::parse(&format!("{scheme}://{host}:{port}/{contract_full_name}"))
    }

    /// The address as originally spelled (whitespace-trimmed).
    pub fn as_str(&self) -> &str {
        &self.uri
    }

    /// The case-insensitive, trailing-slash-trimmed form used for cache keys.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }
}

impl PartialEq for EndpointAddress {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for EndpointAddress {}

impl Hash for EndpointAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

fn normalize(addr: &str) -> String {
    addr.trim_end_matches('/').to_ascii_lowercase()
}
