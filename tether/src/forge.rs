//! # Proxy forge
//!
//! The forge is the entry point of the framework. Given a contract, a lifecycle
//! policy and a target, it produces a ready-to-call [`ServiceClient`] in three
//! cached steps:
//!
//! 1. **Blueprint synthesis** — validates the contract shape once per
//!    `(contract, policy)` pair and captures the policy as a strategy value. No
//!    code generation is involved; one generic client type branches on the policy
//!    captured here.
//! 2. **Factory resolution** — resolves the target to a binding and a normalized
//!    address and wraps both in a shared [`ChannelFactory`].
//! 3. **Instance construction** — builds (or returns the cached) client.
//!
//! All three caches follow the double-checked locking discipline of
//! [`KeyedCache`]; synthesis and construction errors propagate immediately and
//! are never cached.
use crate::address::{AddressError, EndpointAddress};
use crate::binding::{Binding, BindingResolver, ChannelLimits, ClientConfig, ResolveError};
use crate::cache::{InstanceKey, KeyedCache};
use crate::channel::{Channel, TransportError};
use crate::client::ServiceClient;
use crate::contract::{ContractDescriptor, OperationDescriptor};
use crate::interception::{EndpointIdentity, InterceptionPipeline};
use crate::policy::LifecyclePolicy;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Contract shape unsupported by proxy synthesis. Surfaced to the caller at
/// first use and never cached.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("Contract has no name")]
    AnonymousContract,
    #[error("Contract '{0}' declares no operations")]
    EmptyContract(String),
    #[error("Contract '{contract}' declares an unnamed operation")]
    UnnamedOperation { contract: String },
    #[error("Contract '{contract}' declares operation '{operation}' more than once")]
    DuplicateOperation { contract: String, operation: String },
}

/// Synthesis cache key: one blueprint per `(contract, policy)` pair per process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SynthesisKey {
    contract: String,
    policy: LifecyclePolicy,
}

impl SynthesisKey {
    pub fn new(contract: &ContractDescriptor, policy: LifecyclePolicy) -> Self {
        Self {
            contract: contract.full_name().to_string(),
            policy,
        }
    }
}

/// The synthesized proxy shape: the validated operation-dispatch table plus the
/// lifecycle policy fixed at synthesis time.
#[derive(Debug)]
pub struct ProxyBlueprint {
    contract: ContractDescriptor,
    policy: LifecyclePolicy,
    operations: HashMap<String, OperationDescriptor>,
}

impl ProxyBlueprint {
    pub(crate) fn synthesize(
        contract: &ContractDescriptor,
        policy: LifecyclePolicy,
    ) -> Result<Self, SynthesisError> {
        if contract.full_name().is_empty() {
            return Err(SynthesisError::AnonymousContract);
        }
        if contract.operations().is_empty() {
            return Err(SynthesisError::EmptyContract(
                contract.full_name().to_string(),
            ));
        }

        let mut operations = HashMap::new();
        for op in contract.operations() {
            if op.name().is_empty() {
                return Err(SynthesisError::UnnamedOperation {
                    contract: contract.full_name().to_string(),
                });
            }
            if operations
                .insert(op.name().to_string(), op.clone())
                .is_some()
            {
                return Err(SynthesisError::DuplicateOperation {
                    contract: contract.full_name().to_string(),
                    operation: op.name().to_string(),
                });
            }
        }

        Ok(Self {
            contract: contract.clone(),
            policy,
            operations,
        })
    }

    pub fn contract(&self) -> &ContractDescriptor {
        &self.contract
    }

    pub fn policy(&self) -> LifecyclePolicy {
        self.policy
    }

    pub fn operation(&self, name: &str) -> Option<&OperationDescriptor> {
        self.operations.get(name)
    }
}

/// A reusable channel recipe: a binding plus a resolved address.
///
/// Factories are shared across instances through the factory cache; the channels
/// they create are not.
pub struct ChannelFactory {
    binding: Arc<dyn Binding>,
    address: EndpointAddress,
}

impl ChannelFactory {
    pub(crate) fn new(binding: Arc<dyn Binding>, address: EndpointAddress) -> Self {
        Self { binding, address }
    }

    pub fn create(&self) -> Result<Box<dyn Channel>, TransportError> {
        self.binding.build(&self.address)
    }

    pub fn limits(&self) -> ChannelLimits {
        self.binding.limits()
    }

    pub fn address(&self) -> &EndpointAddress {
        &self.address
    }

    pub fn binding_name(&self) -> &str {
        self.binding.name()
    }
}

/// Where a client should point.
#[derive(Clone)]
pub enum Target {
    /// A named endpoint configuration. The address overrides the configured
    /// default when present; an empty/missing address defers to it.
    EndpointConfig {
        name: String,
        address: Option<String>,
    },
    /// An explicit binding object and address.
    Binding {
        binding: Arc<dyn Binding>,
        address: String,
    },
    /// A binding name resolved through the resolver, plus an address.
    Resolve { binding: String, address: String },
    /// A binding name plus a `(scheme, host, port)` triple; the address expands
    /// to `scheme://host:port/<contract-full-name>`.
    HostPort {
        binding: String,
        scheme: String,
        host: String,
        port: u32,
    },
}

/// The single parameterized construction path: contract, policy, target, and the
/// caching flag that every entry point carries.
#[derive(Clone)]
pub struct ClientRequest {
    pub contract: ContractDescriptor,
    pub policy: LifecyclePolicy,
    pub target: Target,
    /// When false, the factory and instance caches are bypassed entirely and a
    /// fresh client is always constructed. Defaults to true.
    pub from_cache: bool,
    /// Initial client configuration. Ignored when a cached instance is returned;
    /// use [`ServiceClient::set_config`] to reconfigure a live client.
    pub config: ClientConfig,
}

impl ClientRequest {
    pub fn new(contract: ContractDescriptor, policy: LifecyclePolicy, target: Target) -> Self {
        Self {
            contract,
            policy,
            target,
            from_cache: true,
            config: ClientConfig::default(),
        }
    }

    pub fn from_cache(mut self, from_cache: bool) -> Self {
        self.from_cache = from_cache;
        self
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }
}

/// Malformed address, invalid port, or unresolved binding: fatal per attempt,
/// never cached, safe to retry with corrected input.
#[derive(Debug, thiserror::Error)]
pub enum ConstructionError {
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("Failed to construct channel factory: {0}")]
    Factory(#[from] TransportError),
}

/// Process-wide proxy factory: owns the blueprint, factory and instance caches,
/// the binding resolver, and the interception pipeline shared by every client it
/// builds.
pub struct ProxyForge {
    blueprints: KeyedCache<SynthesisKey, ProxyBlueprint>,
    factories: KeyedCache<InstanceKey, ChannelFactory>,
    instances: KeyedCache<InstanceKey, ServiceClient>,
    resolver: BindingResolver,
    pipeline: Arc<InterceptionPipeline>,
}

impl ProxyForge {
    pub fn new(resolver: BindingResolver) -> Self {
        Self {
            blueprints: KeyedCache::new(),
            factories: KeyedCache::new(),
            instances: KeyedCache::new(),
            resolver,
            pipeline: Arc::new(InterceptionPipeline::new()),
        }
    }

    /// Bounds the factory and instance caches; the blueprint cache stays
    /// unbounded since it grows with the set of contracts, not with the set of
    /// addresses ever dialed.
    pub fn with_instance_capacity(resolver: BindingResolver, capacity: NonZeroUsize) -> Self {
        Self {
            blueprints: KeyedCache::new(),
            factories: KeyedCache::with_capacity(capacity),
            instances: KeyedCache::with_capacity(capacity),
            resolver,
            pipeline: Arc::new(InterceptionPipeline::new()),
        }
    }

    /// The pipeline observing every call made through clients of this forge.
    pub fn pipeline(&self) -> &Arc<InterceptionPipeline> {
        &self.pipeline
    }

    pub fn resolver(&self) -> &BindingResolver {
        &self.resolver
    }

    /// Synthesizes (or returns the cached) blueprint for a contract/policy pair.
    pub fn blueprint(
        &self,
        contract: &ContractDescriptor,
        policy: LifecyclePolicy,
    ) -> Result<Arc<ProxyBlueprint>, SynthesisError> {
        self.blueprints
            .get_or_create(SynthesisKey::new(contract, policy), || {
                ProxyBlueprint::synthesize(contract, policy)
            })
    }

    /// Builds (or returns the cached) client for `request`.
    ///
    /// Per-call policies always construct fresh regardless of `from_cache`; a
    /// cached per-call instance would be disposed by its first caller.
    pub fn client(&self, request: ClientRequest) -> Result<Arc<ServiceClient>, ConstructionError> {
        let blueprint = self.blueprint(&request.contract, request.policy)?;
        let (binding, address, key) = self.resolve_target(&request)?;

        let cacheable = request.from_cache && request.policy.cache_instances();

        let factory = if cacheable {
            self.factories.get_or_create(key.clone(), || {
                Ok::<_, ConstructionError>(ChannelFactory::new(
                    Arc::clone(&binding),
                    address.clone(),
                ))
            })?
        } else {
            Arc::new(ChannelFactory::new(Arc::clone(&binding), address.clone()))
        };

        let endpoint = EndpointIdentity {
            name: binding.name().to_string(),
            address: address.as_str().to_string(),
            listen_uri: address.as_str().to_string(),
        };

        let build = || {
            Ok::<_, ConstructionError>(ServiceClient::new(
                Arc::clone(&blueprint),
                Arc::clone(&factory),
                Arc::clone(&self.pipeline),
                endpoint.clone(),
                request.config.clone(),
            ))
        };

        if cacheable {
            self.instances.get_or_create(key, build)
        } else {
            Ok(Arc::new(build()?))
        }
    }

    /// Drops a cached instance so the next request constructs a fresh one.
    pub fn evict_instance(&self, key: &InstanceKey) -> bool {
        self.instances.evict(key)
    }

    /// Clears the factory and instance caches. Blueprints are kept; synthesis is
    /// idempotent for the process lifetime.
    pub fn clear_instances(&self) {
        self.factories.clear();
        self.instances.clear();
    }

    pub fn cached_instances(&self) -> usize {
        self.instances.len()
    }

    /// Resolves a target to a binding, a validated address and the instance key.
    ///
    /// Endpoint-configuration targets key on the configuration name; explicit
    /// bindings key on the binding fingerprint.
    fn resolve_target(
        &self,
        request: &ClientRequest,
    ) -> Result<(Arc<dyn Binding>, EndpointAddress, InstanceKey), ConstructionError> {
        match &request.target {
            Target::EndpointConfig { name, address } => {
                let endpoint = self.resolver.endpoint(name)?;
                let binding = self.resolver.binding(&endpoint.binding)?;
                let addr = match address.as_deref().filter(|a| !a.trim().is_empty()) {
                    Some(explicit) => EndpointAddress::parse(explicit)?,
                    None => EndpointAddress::parse(&endpoint.address)?,
                };
                let key = InstanceKey::from_endpoint(request.policy, name, &addr);
                Ok((binding, addr, key))
            }
            Target::Binding { binding, address } => {
                let addr = EndpointAddress::parse(address)?;
                let key =
                    InstanceKey::from_binding(request.policy, &binding.fingerprint(), &addr);
                Ok((Arc::clone(binding), addr, key))
            }
            Target::Resolve { binding, address } => {
                let binding = self.resolver.binding(binding)?;
                let addr = EndpointAddress::parse(address)?;
                let key =
                    InstanceKey::from_binding(request.policy, &binding.fingerprint(), &addr);
                Ok((binding, addr, key))
            }
            Target::HostPort {
                binding,
                scheme,
                host,
                port,
            } => {
                let binding = self.resolver.binding(binding)?;
                let addr = EndpointAddress::from_host_port(
                    scheme,
                    host,
                    *port,
                    request.contract.full_name(),
                )?;
                let key =
                    InstanceKey::from_binding(request.policy, &binding.fingerprint(), &addr);
                Ok((binding, addr, key))
            }
        }
    }
}
