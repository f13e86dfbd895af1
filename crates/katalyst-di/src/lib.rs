//! Component discovery, dependency graph, validation, and instantiation
//! for Katalyst applications.
//!
//! There is no class loader or runtime reflection to discover components
//! automatically, so bootstrap code builds an explicit [`descriptor::ComponentManifest`]
//! and hands it to a [`container::Container`]. The pipeline mirrors the original:
//! [`scanner::TypeScanner`] selects candidates, [`graph::DependencyGraph`] links them,
//! [`validator::Validator`] checks the result is buildable, and [`container::Container`]
//! instantiates it in dependency order.

pub mod container;
pub mod descriptor;
pub mod graph;
pub mod registry_manager;
pub mod scanner;
pub mod validator;

pub mod prelude {
    pub use crate::container::{Container, ContainerError, Feature, FeatureError, ResolutionContext};
    pub use crate::descriptor::{
        Capability, CloseHook, ComponentBuilder, ComponentDescriptor, ComponentFactory, ComponentKey,
        ComponentManifest, DIInstantiationError, Dependency, DependencyKind, Role,
    };
    pub use crate::graph::{DependencyEdge, DependencyGraph};
    pub use crate::registry_manager::RegistryManager;
    pub use crate::scanner::{
        And, HasAnnotation, HasMethodsWithAnnotation, HasNoArgsConstructor, ImplementsCapability,
        IsConcrete, IsNotInterface, IsNotTest, MatchesName, MatchesPackage, Not, Or, Predicate,
        TypeScanner,
    };
    pub use crate::validator::{ValidationError, Validator};
}
