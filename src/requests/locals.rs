use crate::DynSvc;
use std::{
    collections::HashMap,
    fmt::{Debug, Formatter},
};

/// Values that take priority over the injector when resolving the
/// dependencies of a single invocation.
///
/// A local always wins over the container, even if its value is undefined.
///
/// ```
/// use named_injector::{dyn_svc, Locals};
///
/// let locals = Locals::new()
///     .with("$delegate", dyn_svc(1i32))
///     .with_undefined("missing");
///
/// assert!(locals.contains("$delegate"));
/// assert!(matches!(locals.get("missing"), Some(None)));
/// assert!(locals.get("other").is_none());
/// ```
#[derive(Clone, Default)]
pub struct Locals {
    values: HashMap<String, Option<DynSvc>>,
}

impl Locals {
    /// Creates an empty set of locals.
    #[must_use]
    pub fn new() -> Self {
        Locals::default()
    }

    /// Adds a local value.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: DynSvc) -> Self {
        self.values.insert(name.into(), Some(value));
        self
    }

    /// Adds a local that is explicitly undefined.
    #[must_use]
    pub fn with_undefined(mut self, name: impl Into<String>) -> Self {
        self.values.insert(name.into(), None);
        self
    }

    /// Sets a local, returning the previous entry if there was one.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: Option<DynSvc>,
    ) -> Option<Option<DynSvc>> {
        self.values.insert(name.into(), value)
    }

    /// Gets a local. The outer `Option` tells whether the local is present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Option<DynSvc>> {
        self.values.get(name)
    }

    /// Whether a local with this name is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}

impl Debug for Locals {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}
