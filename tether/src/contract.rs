//! # Contract model
//!
//! A contract identifies a remote interface: a stable fully-qualified name plus the
//! set of operations a client may invoke against it. Contracts are caller-supplied
//! and immutable; the framework never inspects payload schemas, it only validates
//! that a requested operation belongs to the contract before dispatching.
//!
//! Payloads travel as [`serde_json::Value`] inside an [`Envelope`], so callers can
//! issue requests without compile-time knowledge of the remote message types.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A single operation exposed by a contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationDescriptor {
    name: String,
    one_way: bool,
}

impl OperationDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            one_way: false,
        }
    }

    /// Marks the operation as one-way: the reply envelope carries no payload.
    pub fn one_way(mut self) -> Self {
        self.one_way = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_one_way(&self) -> bool {
        self.one_way
    }
}

/// Identity of a remote interface: a fully-qualified name (e.g. `billing.v1.Invoicing`)
/// plus its operation signatures.
///
/// Equality and hashing are based on the full name alone, which is the stable type
/// identity used for proxy synthesis keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractDescriptor {
    full_name: String,
    operations: Vec<OperationDescriptor>,
}

impl ContractDescriptor {
    pub fn new(full_name: impl Into<String>, operations: Vec<OperationDescriptor>) -> Self {
        Self {
            full_name: full_name.into(),
            operations,
        }
    }

    /// The fully qualified contract name (e.g. `my.package.Service`).
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn operations(&self) -> &[OperationDescriptor] {
        &self.operations
    }

    /// Looks up an operation by name.
    pub fn operation(&self, name: &str) -> Option<&OperationDescriptor> {
        self.operations.iter().find(|op| op.name() == name)
    }
}

impl PartialEq for ContractDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.full_name == other.full_name
    }
}

impl Eq for ContractDescriptor {}

impl Hash for ContractDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.full_name.hash(state);
    }
}

/// The unit of exchange on the transport seam: one request or one reply.
///
/// Carries the contract and operation being addressed, a JSON body, and custom
/// headers to attach to the message.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Fully qualified contract name this message belongs to.
    pub contract: String,
    /// The operation being invoked (requests) or replied to (replies).
    pub operation: String,
    /// The JSON payload.
    pub body: serde_json::Value,
    /// Custom message headers as key/value pairs.
    pub headers: Vec<(String, String)>,
}

impl Envelope {
    pub fn new(
        contract: impl Into<String>,
        operation: impl Into<String>,
        body: serde_json::Value,
    ) -> Self {
        Self {
            contract: contract.into(),
            operation: operation.into(),
            body,
            headers: Vec::new(),
        }
    }
}

/// Human-readable rendering used by the interception pipeline.
impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", self.contract, self.operation, self.body)
    }
}
