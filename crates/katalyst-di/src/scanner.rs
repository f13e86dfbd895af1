//! Type Scanner: composable predicates over the component manifest (spec
//! §4.1).
//!
//! `regex` is the ambient crate used for `matchesName`, the same way the
//! rest of the workspace reaches for it wherever a pattern match is needed.

use regex::Regex;

use crate::descriptor::ComponentDescriptor;

/// A composable predicate over one component's metadata. Predicates are
/// pure functions - no predicate here mutates the manifest or the
/// descriptor it inspects.
pub trait Predicate: Send + Sync {
    fn test(&self, descriptor: &ComponentDescriptor) -> bool;

    fn and<P: Predicate + 'static>(self, other: P) -> And
    where
        Self: Sized + 'static,
    {
        And(Box::new(self), Box::new(other))
    }

    fn or<P: Predicate + 'static>(self, other: P) -> Or
    where
        Self: Sized + 'static,
    {
        Or(Box::new(self), Box::new(other))
    }

    fn negate(self) -> Not
    where
        Self: Sized + 'static,
    {
        Not(Box::new(self))
    }
}

impl Predicate for Box<dyn Predicate> {
    fn test(&self, descriptor: &ComponentDescriptor) -> bool {
        (**self).test(descriptor)
    }
}

pub struct And(Box<dyn Predicate>, Box<dyn Predicate>);
impl Predicate for And {
    fn test(&self, descriptor: &ComponentDescriptor) -> bool {
        self.0.test(descriptor) && self.1.test(descriptor)
    }
}

pub struct Or(Box<dyn Predicate>, Box<dyn Predicate>);
impl Predicate for Or {
    fn test(&self, descriptor: &ComponentDescriptor) -> bool {
        self.0.test(descriptor) || self.1.test(descriptor)
    }
}

pub struct Not(Box<dyn Predicate>);
impl Predicate for Not {
    fn test(&self, descriptor: &ComponentDescriptor) -> bool {
        !self.0.test(descriptor)
    }
}

pub struct All;
impl Predicate for All {
    fn test(&self, _descriptor: &ComponentDescriptor) -> bool {
        true
    }
}

pub struct None;
impl Predicate for None {
    fn test(&self, _descriptor: &ComponentDescriptor) -> bool {
        false
    }
}

/// Matches components whose key starts with the given package/module path.
pub struct MatchesPackage(pub String);
impl Predicate for MatchesPackage {
    fn test(&self, descriptor: &ComponentDescriptor) -> bool {
        descriptor.key.as_str().starts_with(&self.0)
    }
}

/// Matches components whose key matches a regex.
pub struct MatchesName(pub Regex);
impl MatchesName {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self(Regex::new(pattern)?))
    }
}
impl Predicate for MatchesName {
    fn test(&self, descriptor: &ComponentDescriptor) -> bool {
        self.0.is_match(descriptor.key.as_str())
    }
}

pub struct ImplementsCapability(pub String);
impl Predicate for ImplementsCapability {
    fn test(&self, descriptor: &ComponentDescriptor) -> bool {
        descriptor.has_capability(&self.0)
    }
}

pub struct HasAnnotation(pub String);
impl Predicate for HasAnnotation {
    fn test(&self, descriptor: &ComponentDescriptor) -> bool {
        descriptor.tags.iter().any(|t| t == &self.0)
    }
}

/// Alias kept distinct from `HasAnnotation` for readability at call sites;
/// both consult the same tag set (spec names them as separate predicates
/// even though a systems language realizes both via the same mechanism).
pub struct HasMethodsWithAnnotation(pub String);
impl Predicate for HasMethodsWithAnnotation {
    fn test(&self, descriptor: &ComponentDescriptor) -> bool {
        descriptor.tags.iter().any(|t| t == &self.0)
    }
}

pub struct HasNoArgsConstructor;
impl Predicate for HasNoArgsConstructor {
    fn test(&self, descriptor: &ComponentDescriptor) -> bool {
        descriptor.dependencies.is_empty()
    }
}

pub struct IsConcrete;
impl Predicate for IsConcrete {
    fn test(&self, descriptor: &ComponentDescriptor) -> bool {
        descriptor.constructible
    }
}

/// In this port every registered descriptor already denotes a concrete,
/// instantiable type (there is no interface/trait-object registration
/// path), so this predicate is equivalent to `IsConcrete`. It is kept as a
/// distinct type so scan predicates built against the original algebra
/// compose unchanged.
pub struct IsNotInterface;
impl Predicate for IsNotInterface {
    fn test(&self, descriptor: &ComponentDescriptor) -> bool {
        descriptor.constructible
    }
}

pub struct IsNotTest;
impl Predicate for IsNotTest {
    fn test(&self, descriptor: &ComponentDescriptor) -> bool {
        !descriptor.tags.iter().any(|t| t == "Test")
    }
}

/// A type discovered by the scanner, with the metadata the rest of the
/// pipeline needs (spec §4.1: "fully-qualified name, declared methods,
/// constructor parameters ..., declared interfaces/super-types").
pub struct DiscoveredType<'a> {
    pub descriptor: &'a ComponentDescriptor,
}

/// Runs the predicate algebra over a manifest.
///
/// Discovery is deterministic: the manifest already preserves insertion
/// order, and filtering never reorders its output (spec §4.1).
pub struct TypeScanner {
    predicate: Box<dyn Predicate>,
}

impl Default for TypeScanner {
    fn default() -> Self {
        Self {
            predicate: Box::new(All),
        }
    }
}

impl TypeScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_predicate(predicate: impl Predicate + 'static) -> Self {
        Self {
            predicate: Box::new(predicate),
        }
    }

    pub fn scan<'a>(&self, descriptors: &'a [ComponentDescriptor]) -> Vec<DiscoveredType<'a>> {
        descriptors
            .iter()
            .filter(|d| self.predicate.test(d))
            .map(|descriptor| DiscoveredType { descriptor })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ComponentBuilder;

    fn descriptor(key: &str, capability: Option<&str>) -> ComponentDescriptor {
        let mut builder = ComponentBuilder::with_key(crate::descriptor::ComponentKey::new(key));
        if let Some(c) = capability {
            builder = builder.capability(c);
        }
        builder.build(|_| Ok(Box::new(())))
    }

    #[test]
    fn scan_preserves_insertion_order() {
        let descriptors = vec![
            descriptor("app::b::Thing", None),
            descriptor("app::a::Other", None),
        ];
        let scanner = TypeScanner::new();
        let found: Vec<_> = scanner
            .scan(&descriptors)
            .iter()
            .map(|d| d.descriptor.key.to_string())
            .collect();
        assert_eq!(found, vec!["app::b::Thing", "app::a::Other"]);
    }

    #[test]
    fn matches_package_filters_by_prefix() {
        let descriptors = vec![
            descriptor("app::service::Foo", None),
            descriptor("app::repo::Bar", None),
        ];
        let scanner = TypeScanner::with_predicate(MatchesPackage("app::service".into()));
        assert_eq!(scanner.scan(&descriptors).len(), 1);
    }

    #[test]
    fn and_or_not_combinators_compose() {
        let descriptors = vec![
            descriptor("app::Foo", Some("EventHandler")),
            descriptor("app::Bar", Some("Repository")),
            descriptor("app::Baz", None),
        ];

        let predicate = ImplementsCapability("EventHandler".into())
            .or(ImplementsCapability("Repository".into()));
        let scanner = TypeScanner::with_predicate(predicate);
        assert_eq!(scanner.scan(&descriptors).len(), 2);

        let not_handler = ImplementsCapability("EventHandler".into()).negate();
        let scanner = TypeScanner::with_predicate(not_handler);
        assert_eq!(scanner.scan(&descriptors).len(), 2);
    }

    #[test]
    fn is_not_test_excludes_tagged_components() {
        let test_component = ComponentBuilder::with_key(crate::descriptor::ComponentKey::new("t"))
            .tag("Test")
            .build(|_| Ok(Box::new(())));
        let descriptors = vec![test_component, descriptor("app::Real", None)];

        let scanner = TypeScanner::with_predicate(IsNotTest);
        assert_eq!(scanner.scan(&descriptors).len(), 1);
    }
}
