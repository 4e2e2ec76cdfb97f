//! # Tether
//!
//! `tether` is a client-side orchestration framework for calling remote services
//! through a statically-described contract while deferring the concrete transport
//! to runtime. Callers supply a [`ContractDescriptor`], a [`LifecyclePolicy`] and
//! a target; the framework synthesizes (once) a proxy blueprint for the pair,
//! caches blueprints, channel factories and live clients keyed by configuration,
//! and drives every client through a safe connect/call/close/abort lifecycle.
//!
//! ## Key Components
//!
//! * **[`ProxyForge`]:** The main entry point. It owns the process-wide caches,
//!   the [`BindingResolver`] and the [`InterceptionPipeline`], and turns a
//!   [`ClientRequest`] into a ready [`ServiceClient`].
//! * **[`ServiceClient`]:** A proxy instance bound to one contract, policy and
//!   endpoint. Calls carry JSON payloads in an [`Envelope`], so no compile-time
//!   knowledge of the remote message types is needed.
//! * **[`Binding`] & [`Channel`]:** The transport seam. The framework implements
//!   no wire protocol of its own; the embedding application (or a test harness)
//!   supplies bindings that build channels.
//! * **[`InterceptionPipeline`]:** Hook points observing every outbound request
//!   and inbound reply, stamped with correlation ids for diagnostics.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tether::{
//!     BindingResolver, ClientRequest, ContractDescriptor, LifecyclePolicy,
//!     OperationDescriptor, ProxyForge, Target,
//! };
//!
//! # async fn run(binding: Arc<dyn tether::Binding>) -> Result<(), Box<dyn std::error::Error>> {
//! let mut resolver = BindingResolver::new();
//! resolver.register_binding(binding);
//!
//! let forge = ProxyForge::new(resolver);
//! let contract = ContractDescriptor::new(
//!     "billing.v1.Invoicing",
//!     vec![OperationDescriptor::new("Submit")],
//! );
//!
//! let client = forge.client(ClientRequest::new(
//!     contract,
//!     LifecyclePolicy::SharedReusable,
//!     Target::Resolve {
//!         binding: "tcp".into(),
//!         address: "tcp://billing:7000".into(),
//!     },
//! ))?;
//!
//! let reply = client.invoke("Submit", serde_json::json!({"amount": 10})).await?;
//! # let _ = reply;
//! # Ok(())
//! # }
//! ```
pub mod address;
pub mod binding;
pub mod cache;
pub mod channel;
pub mod client;
pub mod contract;
pub mod forge;
pub mod interception;
pub mod policy;

pub use address::{AddressError, EndpointAddress};
pub use binding::{
    Binding, BindingResolver, ChannelLimits, ClientConfig, Credentials, EndpointConfig,
    ResolveError,
};
pub use cache::{InstanceKey, KeyedCache};
pub use channel::{Channel, ChannelState, Fault, TransportError};
pub use client::{CallError, ServiceClient};
pub use contract::{ContractDescriptor, Envelope, OperationDescriptor};
pub use forge::{
    ChannelFactory, ClientRequest, ConstructionError, ProxyBlueprint, ProxyForge, SynthesisError,
    SynthesisKey, Target,
};
pub use interception::{
    CorrelationId, EndpointIdentity, EventKind, InterceptionEvent, InterceptionPipeline,
};
pub use policy::LifecyclePolicy;

/// Type alias for the standard boxed error used at the transport seam.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
