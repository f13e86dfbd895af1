//! Component descriptors and the manifest components register themselves
//! into (spec §3, §4.1).
//!
//! There is no runtime reflection in a systems language, so "discovery by
//! convention" is realized as an explicit manifest: component authors call
//! [`ComponentManifest::register`] with a [`ComponentDescriptor`] built by
//! [`ComponentBuilder`], in whatever order their crate's bootstrap code
//! chooses - that order *is* the "insertion order" the spec requires
//! discovery to preserve.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::container::ResolutionContext;

/// Stable identifier for a component type. Two descriptors with the same
/// key collide (spec §3: "Key is unique in the container").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentKey(Arc<str>);

impl ComponentKey {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// Derive a key from a concrete Rust type. Not `TypeId`-based so the
    /// same key is stable across process runs (useful for diagnostics and
    /// deterministic test fixtures).
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self(std::any::type_name::<T>().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role a component plays, derived from its declared capabilities rather
/// than an annotation (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Service,
    Repository,
    Validator,
    EventHandler,
    Migration,
    Middleware,
    Route,
    ConfigProvider,
}

impl Role {
    /// Capability-name to role mapping used to derive a component's role
    /// from its declared capability set. First match wins; a component
    /// declaring no recognized capability defaults to `Service`.
    fn from_capabilities(capabilities: &[Capability]) -> Role {
        const ORDER: &[(&str, Role)] = &[
            ("Repository", Role::Repository),
            ("Validator", Role::Validator),
            ("EventHandler", Role::EventHandler),
            ("Migration", Role::Migration),
            ("Middleware", Role::Middleware),
            ("Route", Role::Route),
            ("ConfigProvider", Role::ConfigProvider),
        ];
        for (name, role) in ORDER {
            if capabilities.iter().any(|c| c.0.as_ref() == *name) {
                return *role;
            }
        }
        Role::Service
    }
}

/// Marker-interface tag used for role derivation and `get_all::<C>()`
/// capability-typed lookups (spec §3, glossary "Capability").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Capability(Arc<str>);

impl Capability {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// What a constructor parameter is resolved against. Plain `Type` is the
/// common case; the other three back the mechanisms spec §4.2-§4.4 name
/// explicitly: capability-typed parameters, framework-supplied well-known
/// properties, and types only a particular optional feature contributes.
#[derive(Debug, Clone)]
pub enum DependencyKind {
    Type(ComponentKey),
    /// Resolved against every descriptor declaring this capability: one
    /// match binds, zero or an unresolved tie is a validation error (spec
    /// §4.4 "the single implementing component (error if ambiguous) or a
    /// user-supplied primary marker").
    Capability(String),
    /// A fixed, framework-recognized property name rather than a scanned
    /// Rust type - resolved against a descriptor registered under the same
    /// name as its key (spec §4.2 "a fixed set of framework-provided types
    /// [that] add implicit edges").
    WellKnownProperty(String),
    /// A type only present in the manifest when `feature` is enabled (spec
    /// §4.3 `FeatureProvidedType`: "remediation names the missing feature
    /// switch").
    FeatureProvided { feature: String, required_type: ComponentKey },
}

/// One constructor parameter, becoming a required (or soft, if `optional`)
/// edge in the dependency graph (spec §3 "Dependency edge", §4.2).
#[derive(Debug, Clone)]
pub struct Dependency {
    pub parameter_name: String,
    pub kind: DependencyKind,
    pub optional: bool,
    pub lazy: bool,
}

impl Dependency {
    pub fn required(parameter_name: impl Into<String>, required_type: ComponentKey) -> Self {
        Self {
            parameter_name: parameter_name.into(),
            kind: DependencyKind::Type(required_type),
            optional: false,
            lazy: false,
        }
    }

    pub fn optional(parameter_name: impl Into<String>, required_type: ComponentKey) -> Self {
        Self {
            parameter_name: parameter_name.into(),
            kind: DependencyKind::Type(required_type),
            optional: true,
            lazy: false,
        }
    }

    pub fn capability(parameter_name: impl Into<String>, capability: impl Into<String>) -> Self {
        Self {
            parameter_name: parameter_name.into(),
            kind: DependencyKind::Capability(capability.into()),
            optional: false,
            lazy: false,
        }
    }

    pub fn well_known_property(parameter_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            parameter_name: parameter_name.into(),
            kind: DependencyKind::WellKnownProperty(name.into()),
            optional: false,
            lazy: false,
        }
    }

    pub fn feature_provided(
        parameter_name: impl Into<String>,
        feature: impl Into<String>,
        required_type: ComponentKey,
    ) -> Self {
        Self {
            parameter_name: parameter_name.into(),
            kind: DependencyKind::FeatureProvided {
                feature: feature.into(),
                required_type,
            },
            optional: false,
            lazy: false,
        }
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }
}

/// Outcome of resolving a capability-typed dependency against a descriptor
/// set (spec §4.4).
pub(crate) enum CapabilityResolution {
    Unique(ComponentKey),
    Missing,
    Ambiguous,
}

/// Resolves a capability name to the single descriptor that implements it.
/// Zero candidates is `Missing`; more than one candidate is `Ambiguous`
/// unless exactly one of them is marked [`ComponentBuilder::primary`].
pub(crate) fn resolve_capability(descriptors: &[ComponentDescriptor], capability: &str) -> CapabilityResolution {
    let candidates: Vec<&ComponentDescriptor> = descriptors
        .iter()
        .filter(|d| d.has_capability(capability))
        .collect();

    match candidates.len() {
        0 => CapabilityResolution::Missing,
        1 => CapabilityResolution::Unique(candidates[0].key.clone()),
        _ => {
            let primaries: Vec<&&ComponentDescriptor> = candidates.iter().filter(|d| d.primary).collect();
            match primaries.as_slice() {
                [only] => CapabilityResolution::Unique(only.key.clone()),
                _ => CapabilityResolution::Ambiguous,
            }
        }
    }
}

/// Error produced while invoking a component's type-erased factory during
/// instantiation (spec §3 `InstantiationFailure`, §7 `DIInstantiationError`).
#[derive(Debug, Error)]
#[error("failed to instantiate component {key}: {reason}")]
pub struct DIInstantiationError {
    pub key: ComponentKey,
    pub reason: String,
}

/// Type-erased constructor. Receives a [`ResolutionContext`] scoped to the
/// instantiation currently in progress and returns the boxed instance.
pub type ComponentFactory =
    Arc<dyn Fn(&ResolutionContext) -> Result<Box<dyn Any + Send + Sync>, DIInstantiationError> + Send + Sync>;

/// Type-erased shutdown hook, run in reverse topological order for
/// components that registered one (spec §4.4 "close capability").
pub type CloseHook = Arc<dyn Fn(&(dyn Any + Send + Sync)) -> Result<(), DIInstantiationError> + Send + Sync>;

/// Full metadata plus constructor for one discoverable component (spec §3
/// "Component descriptor").
#[derive(Clone)]
pub struct ComponentDescriptor {
    pub key: ComponentKey,
    pub capabilities: Vec<Capability>,
    pub dependencies: Vec<Dependency>,
    pub factory: ComponentFactory,
    /// Whether the constructor is reachable at all (false models a
    /// private/abstract constructor the validator must reject as
    /// `Uninstantiable`).
    pub constructible: bool,
    /// Free-form annotation-equivalent markers (spec §4.1 `hasAnnotation`,
    /// `hasMethodsWithAnnotation`, `isNotTest`), since a systems language
    /// has no runtime annotation metadata to query.
    pub tags: Vec<String>,
    /// Registration order, used as the topological-sort tie-break (spec
    /// §4.2 "tie-broken by declared insertion order").
    pub(crate) insertion_index: usize,
    /// Optional shutdown hook; present only for components the bootstrap
    /// code marked closeable.
    pub close: Option<CloseHook>,
    /// User-supplied tie-break for capability-typed dependency resolution
    /// when more than one component declares the same capability (spec
    /// §4.4 "a user-supplied primary marker").
    pub primary: bool,
}

impl ComponentDescriptor {
    pub fn role(&self) -> Role {
        Role::from_capabilities(&self.capabilities)
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c.as_str() == name)
    }
}

impl fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("key", &self.key)
            .field("capabilities", &self.capabilities)
            .field("dependencies", &self.dependencies)
            .field("constructible", &self.constructible)
            .field("primary", &self.primary)
            .finish()
    }
}

/// Builds a [`ComponentDescriptor`] for one type.
pub struct ComponentBuilder {
    key: ComponentKey,
    capabilities: Vec<Capability>,
    dependencies: Vec<Dependency>,
    constructible: bool,
    tags: Vec<String>,
    close: Option<CloseHook>,
    primary: bool,
}

impl ComponentBuilder {
    pub fn new<T: 'static>() -> Self {
        Self {
            key: ComponentKey::of::<T>(),
            capabilities: Vec::new(),
            dependencies: Vec::new(),
            constructible: true,
            tags: Vec::new(),
            close: None,
            primary: false,
        }
    }

    pub fn with_key(key: ComponentKey) -> Self {
        Self {
            key,
            capabilities: Vec::new(),
            dependencies: Vec::new(),
            constructible: true,
            tags: Vec::new(),
            close: None,
            primary: false,
        }
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn capability(mut self, name: impl Into<Arc<str>>) -> Self {
        self.capabilities.push(Capability::new(name));
        self
    }

    pub fn depends_on(mut self, parameter_name: impl Into<String>, required_type: ComponentKey) -> Self {
        self.dependencies
            .push(Dependency::required(parameter_name, required_type));
        self
    }

    pub fn depends_on_optional(
        mut self,
        parameter_name: impl Into<String>,
        required_type: ComponentKey,
    ) -> Self {
        self.dependencies
            .push(Dependency::optional(parameter_name, required_type));
        self
    }

    /// Declare a capability-typed constructor parameter, resolved at
    /// container-build time against every descriptor declaring `capability`
    /// (spec §4.4).
    pub fn depends_on_capability(mut self, parameter_name: impl Into<String>, capability: impl Into<String>) -> Self {
        self.dependencies.push(Dependency::capability(parameter_name, capability));
        self
    }

    /// Declare a dependency on a fixed, framework-recognized well-known
    /// property rather than a scanned type (spec §4.2).
    pub fn depends_on_well_known_property(mut self, parameter_name: impl Into<String>, name: impl Into<String>) -> Self {
        self.dependencies
            .push(Dependency::well_known_property(parameter_name, name));
        self
    }

    /// Declare a dependency on a type only present when `feature` is
    /// enabled (spec §4.3 `FeatureProvidedType`).
    pub fn depends_on_feature_provided(
        mut self,
        parameter_name: impl Into<String>,
        feature: impl Into<String>,
        required_type: ComponentKey,
    ) -> Self {
        self.dependencies
            .push(Dependency::feature_provided(parameter_name, feature, required_type));
        self
    }

    /// Mark this as the tie-break winner among components sharing a
    /// capability another component depends on by capability (spec §4.4
    /// "a user-supplied primary marker").
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Mark this descriptor as uninstantiable (private/abstract constructor
    /// in the source system; spec §4.3 `Uninstantiable`).
    pub fn uninstantiable(mut self) -> Self {
        self.constructible = false;
        self
    }

    /// Register a shutdown hook, run during container shutdown in reverse
    /// topological order (spec §4.4).
    pub fn on_close(
        mut self,
        hook: impl Fn(&(dyn Any + Send + Sync)) -> Result<(), DIInstantiationError> + Send + Sync + 'static,
    ) -> Self {
        self.close = Some(Arc::new(hook));
        self
    }

    pub fn build(
        self,
        factory: impl Fn(&ResolutionContext) -> Result<Box<dyn Any + Send + Sync>, DIInstantiationError>
            + Send
            + Sync
            + 'static,
    ) -> ComponentDescriptor {
        ComponentDescriptor {
            key: self.key,
            capabilities: self.capabilities,
            dependencies: self.dependencies,
            factory: Arc::new(factory),
            constructible: self.constructible,
            tags: self.tags,
            insertion_index: 0,
            close: self.close,
            primary: self.primary,
        }
    }
}

/// Insertion-ordered set of discovered component descriptors (spec §4.1
/// "discovery must be deterministic (insertion-order preserved)").
#[derive(Default)]
pub struct ComponentManifest {
    descriptors: Vec<ComponentDescriptor>,
}

impl ComponentManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, mut descriptor: ComponentDescriptor) {
        descriptor.insertion_index = self.descriptors.len();
        self.descriptors.push(descriptor);
    }

    pub fn descriptors(&self) -> &[ComponentDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;

    #[test]
    fn component_key_is_stable_for_same_type() {
        assert_eq!(ComponentKey::of::<A>(), ComponentKey::of::<A>());
    }

    #[test]
    fn role_derives_from_first_matching_capability() {
        let descriptor = ComponentBuilder::new::<A>()
            .capability("EventHandler")
            .capability("Repository")
            .build(|_| Ok(Box::new(())));
        // Repository is checked before EventHandler in the derivation order.
        assert_eq!(descriptor.role(), Role::Repository);
    }

    #[test]
    fn role_defaults_to_service() {
        let descriptor = ComponentBuilder::new::<A>().build(|_| Ok(Box::new(())));
        assert_eq!(descriptor.role(), Role::Service);
    }

    #[test]
    fn manifest_preserves_insertion_order() {
        let mut manifest = ComponentManifest::new();
        manifest.register(
            ComponentBuilder::with_key(ComponentKey::new("b")).build(|_| Ok(Box::new(()))),
        );
        manifest.register(
            ComponentBuilder::with_key(ComponentKey::new("a")).build(|_| Ok(Box::new(()))),
        );

        let keys: Vec<_> = manifest.descriptors().iter().map(|d| d.key.to_string()).collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn resolve_capability_binds_the_single_implementor() {
        let descriptors = vec![ComponentBuilder::with_key(ComponentKey::new("a"))
            .capability("Notifier")
            .build(|_| Ok(Box::new(())))];
        match resolve_capability(&descriptors, "Notifier") {
            CapabilityResolution::Unique(key) => assert_eq!(key, ComponentKey::new("a")),
            _ => panic!("expected a unique binding"),
        }
    }

    #[test]
    fn resolve_capability_reports_missing_when_nothing_implements_it() {
        let descriptors: Vec<ComponentDescriptor> = Vec::new();
        assert!(matches!(resolve_capability(&descriptors, "Notifier"), CapabilityResolution::Missing));
    }

    #[test]
    fn resolve_capability_is_ambiguous_without_a_primary_marker() {
        let descriptors = vec![
            ComponentBuilder::with_key(ComponentKey::new("a"))
                .capability("Notifier")
                .build(|_| Ok(Box::new(()))),
            ComponentBuilder::with_key(ComponentKey::new("b"))
                .capability("Notifier")
                .build(|_| Ok(Box::new(()))),
        ];
        assert!(matches!(resolve_capability(&descriptors, "Notifier"), CapabilityResolution::Ambiguous));
    }

    #[test]
    fn resolve_capability_binds_the_primary_marked_candidate_when_ambiguous() {
        let descriptors = vec![
            ComponentBuilder::with_key(ComponentKey::new("a"))
                .capability("Notifier")
                .build(|_| Ok(Box::new(()))),
            ComponentBuilder::with_key(ComponentKey::new("b"))
                .capability("Notifier")
                .primary()
                .build(|_| Ok(Box::new(()))),
        ];
        match resolve_capability(&descriptors, "Notifier") {
            CapabilityResolution::Unique(key) => assert_eq!(key, ComponentKey::new("b")),
            _ => panic!("expected the primary-marked candidate to win"),
        }
    }
}
