//! Validates a component manifest against its dependency graph before any
//! instantiation is attempted (spec §4.3).

use thiserror::Error;

use crate::descriptor::{resolve_capability, CapabilityResolution, ComponentDescriptor, ComponentKey, DependencyKind};
use crate::graph::DependencyGraph;

/// One problem found while validating the manifest. `Vec<ValidationError>`
/// is the container's "fail fast, report everything" boundary: a single
/// pass over the graph collects every independent problem rather than
/// stopping at the first one.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{component} requires {required} via parameter `{parameter}`, but no component provides it")]
    MissingDependency {
        component: ComponentKey,
        parameter: String,
        required: ComponentKey,
    },

    #[error("circular dependency: {}", cycle_path(.0))]
    CircularDependency(Vec<ComponentKey>),

    #[error("{0} has no reachable constructor and cannot be instantiated")]
    Uninstantiable(ComponentKey),

    #[error("{component} requires capability `{capability}` via parameter `{parameter}`, but no single component implements it")]
    MissingSecondaryBinding {
        component: ComponentKey,
        parameter: String,
        capability: String,
    },

    #[error("feature `{feature}` was declared to provide `{provided_type}` but never registered a component for it")]
    MissingFeatureProvidedType { feature: String, provided_type: String },

    #[error("well-known property `{name}` was referenced but never set before container build")]
    WellKnownPropertyMissing { name: String },

    #[error("{component} failed during instantiation: {reason}")]
    InstantiationFailure { component: ComponentKey, reason: String },
}

fn cycle_path(cycle: &[ComponentKey]) -> String {
    let mut path: Vec<String> = cycle.iter().map(|k| k.to_string()).collect();
    if let Some(first) = cycle.first() {
        path.push(first.to_string());
    }
    path.join(" -> ")
}

/// Runs the manifest through the graph once and reports every independent
/// problem found, grouped by category in the order spec §4.3 mandates:
/// cycles first, then missing dependencies, then uninstantiable components,
/// then unresolved capability bindings, then well-known properties, then
/// feature-provided types.
pub struct Validator;

impl Validator {
    pub fn validate(descriptors: &[ComponentDescriptor], graph: &DependencyGraph) -> Vec<ValidationError> {
        let mut cycles = Vec::new();
        let mut missing_dependency = Vec::new();
        let mut uninstantiable = Vec::new();
        let mut secondary = Vec::new();
        let mut well_known = Vec::new();
        let mut feature_provided = Vec::new();

        for cycle in graph.detect_cycles() {
            cycles.push(ValidationError::CircularDependency(cycle));
        }

        for descriptor in descriptors {
            if !descriptor.constructible {
                uninstantiable.push(ValidationError::Uninstantiable(descriptor.key.clone()));
            }

            for dep in &descriptor.dependencies {
                if dep.optional {
                    continue;
                }

                match &dep.kind {
                    DependencyKind::Type(required) => {
                        if !descriptors.iter().any(|d| &d.key == required) {
                            missing_dependency.push(ValidationError::MissingDependency {
                                component: descriptor.key.clone(),
                                parameter: dep.parameter_name.clone(),
                                required: required.clone(),
                            });
                        }
                    }
                    DependencyKind::FeatureProvided { feature, required_type } => {
                        if !descriptors.iter().any(|d| &d.key == required_type) {
                            feature_provided.push(ValidationError::MissingFeatureProvidedType {
                                feature: feature.clone(),
                                provided_type: required_type.to_string(),
                            });
                        }
                    }
                    DependencyKind::WellKnownProperty(name) => {
                        let provided = descriptors.iter().any(|d| d.key == ComponentKey::new(name.clone()));
                        if !provided {
                            well_known.push(ValidationError::WellKnownPropertyMissing { name: name.clone() });
                        }
                    }
                    DependencyKind::Capability(capability) => {
                        if !matches!(resolve_capability(descriptors, capability), CapabilityResolution::Unique(_)) {
                            secondary.push(ValidationError::MissingSecondaryBinding {
                                component: descriptor.key.clone(),
                                parameter: dep.parameter_name.clone(),
                                capability: capability.clone(),
                            });
                        }
                    }
                }
            }
        }

        let mut errors = cycles;
        errors.extend(missing_dependency);
        errors.extend(uninstantiable);
        errors.extend(secondary);
        errors.extend(well_known);
        errors.extend(feature_provided);
        errors
    }
}
