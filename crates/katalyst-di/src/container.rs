//! Instantiates a validated manifest in dependency order and hands out
//! resolved components (spec §4.4).

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::descriptor::{
    resolve_capability, CapabilityResolution, ComponentDescriptor, ComponentKey, ComponentManifest,
    DIInstantiationError, DependencyKind,
};
use crate::graph::DependencyGraph;
use crate::validator::{ValidationError, Validator};

/// Capability name -> the single component key it was resolved to, computed
/// once after validation proves every capability-typed dependency in the
/// manifest is unambiguous (spec §4.4).
fn capability_bindings(descriptors: &[ComponentDescriptor]) -> HashMap<String, ComponentKey> {
    let mut bindings = HashMap::new();
    for descriptor in descriptors {
        for dep in &descriptor.dependencies {
            let DependencyKind::Capability(capability) = &dep.kind else {
                continue;
            };
            if bindings.contains_key(capability) {
                continue;
            }
            if let CapabilityResolution::Unique(key) = resolve_capability(descriptors, capability) {
                bindings.insert(capability.clone(), key);
            }
        }
    }
    bindings
}

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("manifest failed validation with {} problem(s): {}", .0.len(), format_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error(transparent)]
    Instantiation(#[from] DIInstantiationError),
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}

#[derive(Debug, Error)]
#[error("feature `{feature}` failed to come ready: {reason}")]
pub struct FeatureError {
    pub feature: String,
    pub reason: String,
}

/// View handed to a component's factory while the container is being built.
/// Only instances already constructed earlier in topological order are
/// visible, which is always every non-optional dependency by construction.
pub struct ResolutionContext<'a> {
    instances: &'a HashMap<ComponentKey, Arc<dyn Any + Send + Sync>>,
    capability_bindings: &'a HashMap<String, ComponentKey>,
}

impl<'a> ResolutionContext<'a> {
    fn new(
        instances: &'a HashMap<ComponentKey, Arc<dyn Any + Send + Sync>>,
        capability_bindings: &'a HashMap<String, ComponentKey>,
    ) -> Self {
        Self {
            instances,
            capability_bindings,
        }
    }

    /// Resolve a capability-typed dependency to the single component it was
    /// bound to at build time (spec §4.4). Only reachable here once
    /// validation has already proven the binding unambiguous.
    pub fn resolve_capability<T: Send + Sync + 'static>(
        &self,
        capability: &str,
    ) -> Result<Arc<T>, DIInstantiationError> {
        let key = self.capability_bindings.get(capability).ok_or_else(|| DIInstantiationError {
            key: ComponentKey::new(capability.to_string()),
            reason: format!("no component resolved for capability `{capability}`"),
        })?;
        self.resolve(key)
    }

    /// Resolve a required dependency by its component key, downcasting to
    /// the requested concrete type.
    pub fn resolve<T: Send + Sync + 'static>(&self, key: &ComponentKey) -> Result<Arc<T>, DIInstantiationError> {
        self.instances
            .get(key)
            .ok_or_else(|| DIInstantiationError {
                key: key.clone(),
                reason: "dependency was not instantiated before its dependent".into(),
            })?
            .clone()
            .downcast::<T>()
            .map_err(|_| DIInstantiationError {
                key: key.clone(),
                reason: "dependency instance has an unexpected concrete type".into(),
            })
    }

    /// Resolve an optional dependency; `None` if never registered or if the
    /// concrete type does not match.
    pub fn resolve_optional<T: Send + Sync + 'static>(&self, key: &ComponentKey) -> Option<Arc<T>> {
        self.instances.get(key)?.clone().downcast::<T>().ok()
    }
}

/// A unit of external wiring that can contribute components to the manifest
/// and observe the container once every component is live (spec §4.4
/// "Feature").
#[async_trait::async_trait]
pub trait Feature: Send + Sync {
    fn id(&self) -> &str;

    /// Additional component descriptors this feature contributes, merged
    /// into the manifest before the graph is built.
    fn provide_modules(&self) -> Vec<ComponentDescriptor> {
        Vec::new()
    }

    /// Called once, after every component in the container has been
    /// instantiated, in feature registration order. The single necessary
    /// `async` boundary in bootstrap: features that start background tasks
    /// (scheduler loops, recovery jobs) need somewhere to do so.
    async fn on_ready(&self, _container: &Container) -> Result<(), FeatureError> {
        Ok(())
    }
}

/// Instantiated components plus the order they came up in, so shutdown can
/// reverse it (spec §4.4).
pub struct Container {
    instances: HashMap<ComponentKey, Arc<dyn Any + Send + Sync>>,
    descriptors: HashMap<ComponentKey, ComponentDescriptor>,
    order: Vec<ComponentKey>,
}

impl Container {
    /// Builds a container from a scanned manifest plus whatever additional
    /// modules the registered features contribute. Validates the merged
    /// graph before instantiating anything.
    pub fn build(manifest: &ComponentManifest, features: &[Arc<dyn Feature>]) -> Result<Self, ContainerError> {
        let mut descriptors: Vec<ComponentDescriptor> = manifest.descriptors().to_vec();
        for feature in features {
            for mut module in feature.provide_modules() {
                module.insertion_index = descriptors.len();
                descriptors.push(module);
            }
        }

        let graph = DependencyGraph::build(&descriptors);
        let errors = Validator::validate(&descriptors, &graph);
        if !errors.is_empty() {
            return Err(ContainerError::Validation(errors));
        }

        let order = graph
            .topological_order()
            .expect("validator already proved the graph is acyclic");

        let capability_bindings = capability_bindings(&descriptors);

        let by_key: HashMap<ComponentKey, ComponentDescriptor> =
            descriptors.into_iter().map(|d| (d.key.clone(), d)).collect();

        let mut instances: HashMap<ComponentKey, Arc<dyn Any + Send + Sync>> = HashMap::new();
        for key in &order {
            let descriptor = &by_key[key];
            let ctx = ResolutionContext::new(&instances, &capability_bindings);
            debug!(component = %key, "instantiating component");
            let instance = (descriptor.factory)(&ctx).map_err(ContainerError::Instantiation)?;
            instances.insert(key.clone(), Arc::from(instance));
        }

        Ok(Self {
            instances,
            descriptors: by_key,
            order,
        })
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.resolve_by_key(&ComponentKey::of::<T>())
    }

    pub fn resolve_by_key<T: Send + Sync + 'static>(&self, key: &ComponentKey) -> Option<Arc<T>> {
        self.instances.get(key)?.clone().downcast::<T>().ok()
    }

    /// Resolve by the component's string name rather than its Rust type,
    /// for call sites that only know the key at runtime (spec §4.4
    /// `resolveByName`).
    pub fn resolve_by_name(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.instances.get(&ComponentKey::new(name)).cloned()
    }

    /// All instantiated components declaring the given capability, in
    /// instantiation order.
    pub fn get_all_by_capability(&self, capability: &str) -> Vec<Arc<dyn Any + Send + Sync>> {
        self.order
            .iter()
            .filter(|key| {
                self.descriptors
                    .get(*key)
                    .is_some_and(|d| d.has_capability(capability))
            })
            .filter_map(|key| self.instances.get(key).cloned())
            .collect()
    }

    pub fn contains(&self, key: &ComponentKey) -> bool {
        self.instances.contains_key(key)
    }

    pub fn component_count(&self) -> usize {
        self.instances.len()
    }

    /// Runs every feature's `on_ready` hook in registration order.
    pub async fn ready(&self, features: &[Arc<dyn Feature>]) -> Result<(), FeatureError> {
        for feature in features {
            feature.on_ready(self).await?;
        }
        Ok(())
    }

    /// Runs every component's close hook in reverse topological order
    /// (dependents before dependencies, so a service shuts down before the
    /// repository it depends on).
    pub fn shutdown(&self) {
        for key in self.order.iter().rev() {
            let Some(descriptor) = self.descriptors.get(key) else {
                continue;
            };
            let Some(close) = &descriptor.close else {
                continue;
            };
            let Some(instance) = self.instances.get(key) else {
                continue;
            };
            if let Err(err) = close(instance.as_ref()) {
                warn!(component = %key, error = %err, "component failed to close cleanly");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ComponentBuilder;

    struct Repo {
        name: &'static str,
    }

    struct Service {
        repo: Arc<Repo>,
    }

    fn manifest_with_service_and_repo() -> ComponentManifest {
        let mut manifest = ComponentManifest::new();
        manifest.register(
            ComponentBuilder::new::<Repo>()
                .capability("Repository")
                .build(|_ctx| Ok(Box::new(Repo { name: "repo" }))),
        );
        manifest.register(
            ComponentBuilder::new::<Service>()
                .depends_on("repo", ComponentKey::of::<Repo>())
                .build(|ctx| {
                    let repo = ctx.resolve::<Repo>(&ComponentKey::of::<Repo>())?;
                    Ok(Box::new(Service { repo }))
                }),
        );
        manifest
    }

    #[test]
    fn builds_and_resolves_dependent_components() {
        let manifest = manifest_with_service_and_repo();
        let container = Container::build(&manifest, &[]).expect("valid manifest builds");

        let service = container.get::<Service>().expect("service instantiated");
        assert_eq!(service.repo.name, "repo");
    }

    #[test]
    fn build_fails_closed_on_missing_dependency() {
        let mut manifest = ComponentManifest::new();
        manifest.register(
            ComponentBuilder::new::<Service>()
                .depends_on("repo", ComponentKey::of::<Repo>())
                .build(|ctx| {
                    let repo = ctx.resolve::<Repo>(&ComponentKey::of::<Repo>())?;
                    Ok(Box::new(Service { repo }))
                }),
        );

        let result = Container::build(&manifest, &[]);
        assert!(matches!(result, Err(ContainerError::Validation(_))));
    }

    #[test]
    fn shutdown_runs_close_hooks_in_reverse_order() {
        use std::sync::Mutex;

        let closed: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        let mut manifest = ComponentManifest::new();
        let closed_repo = closed.clone();
        manifest.register(
            ComponentBuilder::new::<Repo>()
                .on_close(move |_| {
                    closed_repo.lock().unwrap().push("repo");
                    Ok(())
                })
                .build(|_ctx| Ok(Box::new(Repo { name: "repo" }))),
        );
        let closed_service = closed.clone();
        manifest.register(
            ComponentBuilder::new::<Service>()
                .depends_on("repo", ComponentKey::of::<Repo>())
                .on_close(move |_| {
                    closed_service.lock().unwrap().push("service");
                    Ok(())
                })
                .build(|ctx| {
                    let repo = ctx.resolve::<Repo>(&ComponentKey::of::<Repo>())?;
                    Ok(Box::new(Service { repo }))
                }),
        );

        let container = Container::build(&manifest, &[]).unwrap();
        container.shutdown();

        assert_eq!(*closed.lock().unwrap(), vec!["service", "repo"]);
    }

    struct EmailNotifier;
    struct Dispatcher {
        notifier_key: &'static str,
    }

    #[test]
    fn capability_dependency_is_resolved_during_instantiation() {
        let mut manifest = ComponentManifest::new();
        manifest.register(
            ComponentBuilder::new::<EmailNotifier>()
                .capability("Notifier")
                .build(|_ctx| Ok(Box::new(EmailNotifier))),
        );
        manifest.register(
            ComponentBuilder::new::<Dispatcher>()
                .depends_on_capability("notifier", "Notifier")
                .build(|ctx| {
                    ctx.resolve_capability::<EmailNotifier>("Notifier")?;
                    Ok(Box::new(Dispatcher { notifier_key: "EmailNotifier" }))
                }),
        );

        let container = Container::build(&manifest, &[]).expect("unambiguous capability binding builds");
        assert_eq!(container.get::<Dispatcher>().unwrap().notifier_key, "EmailNotifier");
    }

    #[test]
    fn build_fails_closed_on_ambiguous_capability_dependency() {
        let mut manifest = ComponentManifest::new();
        manifest.register(
            ComponentBuilder::new::<EmailNotifier>()
                .capability("Notifier")
                .build(|_ctx| Ok(Box::new(EmailNotifier))),
        );
        manifest.register(
            ComponentBuilder::with_key(ComponentKey::new("SmsNotifier"))
                .capability("Notifier")
                .build(|_ctx| Ok(Box::new(()))),
        );
        manifest.register(
            ComponentBuilder::new::<Dispatcher>()
                .depends_on_capability("notifier", "Notifier")
                .build(|_ctx| Ok(Box::new(Dispatcher { notifier_key: "unused" }))),
        );

        let result = Container::build(&manifest, &[]);
        assert!(matches!(result, Err(ContainerError::Validation(_))));
    }
}
