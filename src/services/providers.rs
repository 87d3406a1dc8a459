use crate::{
    expect_svc,
    sync::{Lock, LockEx},
    Annotated, DynSvc, Func, InjectResult, Service, Svc, Target,
};
use std::fmt::{Debug, Formatter};

/// A provider object. The injector calls its `$get` target once, the first
/// time the service it provides is requested, and caches the result.
///
/// A provider can also carry configuration state. Config blocks can inject
/// the provider itself under `<name>Provider` and adjust that state before
/// any instance is created.
///
/// ```
/// use named_injector::{dyn_svc, Func, Provider};
/// use std::sync::Mutex;
///
/// let provider = Provider::new(Func::value(dyn_svc(1i32)))
///     .with_state(Mutex::new(String::from("config")));
/// let state = provider.state::<Mutex<String>>().unwrap();
/// assert_eq!("config", state.lock().unwrap().as_str());
/// ```
pub struct Provider {
    getter: Lock<Option<Target>>,
    state: Option<DynSvc>,
}

impl Provider {
    /// Creates a provider from its `$get` target.
    #[must_use]
    pub fn new(getter: impl Into<Target>) -> Self {
        Provider {
            getter: Lock::new(Some(getter.into())),
            state: None,
        }
    }

    /// Attaches configuration state to this provider. Use a type with
    /// interior mutability if config blocks should be able to change it.
    #[must_use]
    pub fn with_state<T: Service>(mut self, state: T) -> Self {
        self.state = Some(Svc::new(state));
        self
    }

    /// Gets the configuration state of this provider.
    pub fn state<T: Service>(&self) -> InjectResult<Svc<T>> {
        expect_svc("$state", self.state.clone())
    }

    /// The current `$get` target.
    #[must_use]
    pub fn getter(&self) -> Option<Target> {
        self.getter.with_inner(Clone::clone)
    }

    /// Replaces the `$get` target. Instances that were already created are
    /// not affected.
    pub fn set_getter(&self, getter: impl Into<Target>) {
        let getter = getter.into();
        self.getter.with_inner_mut(|current| *current = Some(getter));
    }
}

/// Copies the current `$get` target. The configuration state is shared with
/// the original.
impl Clone for Provider {
    fn clone(&self) -> Self {
        Provider {
            getter: Lock::new(self.getter()),
            state: self.state.clone(),
        }
    }
}

impl Default for Provider {
    fn default() -> Self {
        Provider {
            getter: Lock::new(None),
            state: None,
        }
    }
}

impl Debug for Provider {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("getter", &self.getter())
            .field("has_state", &self.state.is_some())
            .finish()
    }
}

/// What a provider registration was given. Callables are instantiated
/// through the provider injector to produce the provider object.
#[derive(Clone, Debug)]
pub enum ProviderSource {
    /// A provider constructor.
    Callable(Func),
    /// A provider constructor with an inline dependency list.
    Annotated(Annotated),
    /// A ready provider object.
    Object(Svc<Provider>),
}

impl From<Func> for ProviderSource {
    fn from(func: Func) -> Self {
        ProviderSource::Callable(func)
    }
}

impl From<Annotated> for ProviderSource {
    fn from(annotated: Annotated) -> Self {
        ProviderSource::Annotated(annotated)
    }
}

impl From<Target> for ProviderSource {
    fn from(target: Target) -> Self {
        match target {
            Target::Func(func) => ProviderSource::Callable(func),
            Target::Annotated(annotated) => ProviderSource::Annotated(annotated),
        }
    }
}

impl From<Provider> for ProviderSource {
    fn from(provider: Provider) -> Self {
        ProviderSource::Object(Svc::new(provider))
    }
}

impl From<Svc<Provider>> for ProviderSource {
    fn from(provider: Svc<Provider>) -> Self {
        ProviderSource::Object(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dyn_svc, Func};

    #[test]
    fn getter_can_be_replaced() {
        let first = Func::value(dyn_svc(1i32));
        let second = Func::value(dyn_svc(2i32));
        let provider = Provider::new(first.clone());

        assert!(matches!(provider.getter(), Some(Target::Func(f)) if Func::ptr_eq(&f, &first)));
        provider.set_getter(second.clone());
        assert!(matches!(provider.getter(), Some(Target::Func(f)) if Func::ptr_eq(&f, &second)));
    }

    #[test]
    fn clones_keep_their_own_getter() {
        let first = Func::value(dyn_svc(1i32));
        let provider = Provider::new(first.clone()).with_state(3u8);
        let copy = provider.clone();

        copy.set_getter(Func::value(dyn_svc(2i32)));
        assert!(matches!(provider.getter(), Some(Target::Func(f)) if Func::ptr_eq(&f, &first)));
        assert!(Svc::ptr_eq(
            &provider.state::<u8>().unwrap(),
            &copy.state::<u8>().unwrap()
        ));
    }

    #[test]
    fn default_provider_has_no_getter() {
        assert!(Provider::default().getter().is_none());
    }

    #[test]
    fn state_must_match_type() {
        let provider = Provider::default().with_state(5u8);
        assert_eq!(5, *provider.state::<u8>().unwrap());
        assert!(provider.state::<u16>().is_err());
        assert!(Provider::default().state::<u8>().is_err());
    }
}
