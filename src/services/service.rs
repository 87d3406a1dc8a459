use derive_more::Display;
use downcast_rs::impl_downcast;
use std::{
    any::type_name,
    error::Error,
    fmt::{Debug, Formatter},
};

#[cfg(feature = "rc")]
macro_rules! feature_unique {
    ({ $($common:tt)* }, { $($rc:tt)* }, { $($_arc:tt)* }) => {
        $($common)*
        $($rc)*
    };
}

#[cfg(feature = "arc")]
macro_rules! feature_unique {
    ({ $($common:tt)* }, { $($_rc:tt)* }, { $($arc:tt)* }) => {
        $($common)*
        $($arc)*
    };
}

feature_unique!(
    {
        /// A reference-counted pointer holding a service. The pointer type is
        /// determined by the feature flags passed to this crate.
        ///
        /// - **rc**: Pointer type is [`Rc<T>`](std::rc::Rc) (default)
        /// - **arc**: Pointer type is [`Arc<T>`](std::sync::Arc)
    },
    {
        pub type Svc<T> = std::rc::Rc<T>;
    },
    {
        pub type Svc<T> = std::sync::Arc<T>;
    }
);

feature_unique!(
    {
        /// A non-owning pointer to a service. Used by the container to refer
        /// back to itself without keeping itself alive.
    },
    {
        pub type WeakSvc<T> = std::rc::Weak<T>;
    },
    {
        pub type WeakSvc<T> = std::sync::Weak<T>;
    }
);

feature_unique!(
    {
        /// Implemented automatically on types that are capable of being a
        /// service.
    },
    {
        pub trait Service: downcast_rs::Downcast {}
        impl<T: ?Sized + downcast_rs::Downcast> Service for T {}
    },
    {
        pub trait Service: downcast_rs::DowncastSync {}
        impl<T: ?Sized + downcast_rs::DowncastSync> Service for T {}
    }
);

#[cfg(feature = "arc")]
impl_downcast!(sync Service);

#[cfg(feature = "rc")]
impl_downcast!(Service);

/// A service pointer holding an instance of `dyn Service`. This is the type
/// of every value stored in an injector's caches.
pub type DynSvc = Svc<dyn Service>;

/// Wraps a value in a [`DynSvc`].
///
/// ```
/// use named_injector::{downcast_svc, dyn_svc};
///
/// let value = dyn_svc(12i32);
/// let value = downcast_svc::<i32>(value).ok().unwrap();
/// assert_eq!(12, *value);
/// ```
pub fn dyn_svc<T: Service>(value: T) -> DynSvc {
    Svc::new(value)
}

/// Attempts to downcast a [`DynSvc`] into a pointer to a concrete type. The
/// original pointer is returned if the types don't match.
pub fn downcast_svc<T: Service>(value: DynSvc) -> Result<Svc<T>, DynSvc> {
    #[cfg(feature = "arc")]
    return value.downcast_arc::<T>();

    #[cfg(feature = "rc")]
    return value.downcast_rc::<T>();
}

/// Downcasts a named value, reporting which service had the wrong type or was
/// undefined.
pub(crate) fn expect_svc<T: Service>(
    name: &str,
    value: Option<DynSvc>,
) -> InjectResult<Svc<T>> {
    let value = value.ok_or_else(|| InjectError::Undefined {
        name: name.to_owned(),
    })?;
    downcast_svc(value).map_err(|_| InjectError::WrongType {
        name: name.to_owned(),
        expected: type_name::<T>(),
    })
}

/// A result from attempting to inject dependencies into a service and
/// construct an instance of it.
pub type InjectResult<T> = Result<T, InjectError>;

/// An error that has occurred while registering, resolving or invoking
/// services.
#[derive(Display)]
#[non_exhaustive]
pub enum InjectError {
    /// The value given as an injection target is neither a callable nor an
    /// inline-annotated callable.
    #[display(fmt = "argument 'fn' is not a function, got {}", "found")]
    InvalidTarget {
        /// Description of what was received instead.
        found: String,
    },

    /// A callable with parameters has no explicit dependency list while the
    /// injector is in strict mode.
    #[display(
        fmt = "'{}' is not using explicit annotation and cannot be invoked in strict mode",
        "name"
    )]
    StrictModeViolation {
        /// The name (or rendered signature) of the callable.
        name: String,
    },

    /// A dependency list contains something other than a service name.
    #[display(
        fmt = "incorrect injection token, expected service name as string, got {}",
        "token"
    )]
    IncorrectInjectionToken {
        /// Description of the offending entry.
        token: String,
    },

    /// A registration used a reserved name.
    #[display(fmt = "'{}' is not a valid {} name", "name", "context")]
    ReservedName {
        /// The rejected name.
        name: String,
        /// What was being registered.
        context: &'static str,
    },

    /// A provider object has no `$get` factory.
    #[display(fmt = "provider '{}' must define $get factory method", "name")]
    MissingGetter {
        /// The service the provider was registered for.
        name: String,
    },

    /// A factory registered with return enforcement produced no value.
    #[display(
        fmt = "provider '{}' must return a value from $get factory method",
        "name"
    )]
    UndefinedProviderResult {
        /// The service whose factory produced nothing.
        name: String,
    },

    /// No provider is registered for a requested name.
    #[display(fmt = "unknown provider: {}", "fmt_path(path)")]
    UnknownProvider {
        /// The request path, most recent request first.
        path: Vec<String>,
    },

    /// A service was requested while it was already being constructed.
    #[display(fmt = "circular dependency found: {}", "fmt_path(path)")]
    CircularDependency {
        /// The request path, most recent request first.
        path: Vec<String>,
    },

    /// A module list entry is neither a name nor a callable.
    #[display(fmt = "argument 'module' is not a function, got {}", "found")]
    InvalidModule {
        /// Description of what was received instead.
        found: String,
    },

    /// Loading a module failed.
    #[display(
        fmt = "failed to instantiate module {} due to:\n{}",
        "module",
        "source"
    )]
    ModuleInstantiationFailure {
        /// The module name or the signature of the module callable.
        module: String,
        /// The error that aborted loading.
        source: Box<InjectError>,
    },

    /// A module name was never declared in the registry.
    #[display(
        fmt = "module '{}' is not available! You either misspelled the module name or forgot to load it. If registering a module ensure that you specify the dependencies as the second argument.",
        "name"
    )]
    ModuleNotFound {
        /// The requested module.
        name: String,
    },

    /// A value was found but has a different concrete type than requested.
    #[display(fmt = "'{}' is not of type {}", "name", "expected")]
    WrongType {
        /// The name (or argument position) of the value.
        name: String,
        /// The requested type.
        expected: &'static str,
    },

    /// A value was requested by type but is undefined.
    #[display(fmt = "'{}' is undefined", "name")]
    Undefined {
        /// The name (or argument position) of the value.
        name: String,
    },

    /// A callable used as a constructor did not produce an instance.
    #[display(fmt = "'{}' did not construct an instance", "name")]
    NotConstructible {
        /// The name (or rendered signature) of the callable.
        name: String,
    },

    /// A handle obtained from the container outlived the injector.
    #[display(fmt = "the injector this handle belongs to has been dropped")]
    InjectorDropped,

    /// A callable failed with its own error.
    #[display(fmt = "an error occurred during activation: {}", "inner")]
    ActivationFailed {
        /// The error raised by the callable.
        inner: Box<dyn Error + 'static>,
    },

    /// An unexpected error has occurred. This is usually caused by a bug in
    /// the library itself.
    #[display(fmt = "an unexpected error occurred: {}", _0)]
    InternalError(String),
}

impl InjectError {
    /// Wraps an arbitrary error raised by a callable.
    ///
    /// ```
    /// use named_injector::InjectError;
    ///
    /// let error = InjectError::activation("MyError");
    /// assert!(error.to_string().contains("MyError"));
    /// ```
    pub fn activation(inner: impl Into<Box<dyn Error + 'static>>) -> Self {
        InjectError::ActivationFailed {
            inner: inner.into(),
        }
    }
}

impl Debug for InjectError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "InjectError(\"{self}\")")
    }
}

impl Error for InjectError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            InjectError::ModuleInstantiationFailure { source, .. } => {
                Some(source.as_ref())
            }
            InjectError::ActivationFailed { inner } => Some(inner.as_ref()),
            _ => None,
        }
    }
}

fn fmt_path(path: &[String]) -> String {
    path.join(" <- ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dyn_svc_downcasts_to_original_type() {
        let value = dyn_svc(String::from("abc"));
        assert!(downcast_svc::<i32>(value.clone()).is_err());

        let value: Svc<String> = downcast_svc(value).ok().unwrap();
        assert_eq!("abc", value.as_str());
    }

    #[test]
    fn expect_svc_reports_undefined_and_wrong_type() {
        match expect_svc::<i32>("a", None) {
            Err(InjectError::Undefined { name }) if name == "a" => {}
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }

        match expect_svc::<i32>("b", Some(dyn_svc("text"))) {
            Err(InjectError::WrongType { name, .. }) if name == "b" => {}
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn paths_render_most_recent_first() {
        let error = InjectError::UnknownProvider {
            path: vec!["xProvider".into(), "x".into(), "a".into()],
        };
        assert_eq!("unknown provider: xProvider <- x <- a", error.to_string());
    }

    #[test]
    fn module_failure_exposes_source() {
        let error = InjectError::ModuleInstantiationFailure {
            module: "app".into(),
            source: Box::new(InjectError::ModuleNotFound {
                name: "core".into(),
            }),
        };
        assert!(error.to_string().starts_with(
            "failed to instantiate module app due to:\nmodule 'core'"
        ));
        assert!(error.source().is_some());
    }
}
