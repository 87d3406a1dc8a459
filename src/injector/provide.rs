use crate::{
    downcast_svc, Annotated, Args, Container, DynSvc, Func, InjectError,
    InjectResult, Injector, Layer, Locals, Provider, ProviderSource, Recipe,
    Svc, Target, PROVIDER_SUFFIX,
};
use std::fmt::{Debug, Formatter};
use tracing::trace;

const RESERVED_NAME: &str = "hasOwnProperty";

fn check_name(name: &str, context: &'static str) -> InjectResult<()> {
    if name == RESERVED_NAME {
        return Err(InjectError::ReservedName {
            name: name.to_owned(),
            context,
        });
    }
    Ok(())
}

/// The `$provide` service. Registers providers, factories, services, values,
/// constants and decorators with the injector it belongs to.
///
/// Config blocks can inject `$provide` to register services while modules
/// are loading.
///
/// ```
/// use named_injector::{dyn_svc, Annotated, Func, Injector, Provide};
///
/// let injector = Injector::builder().build().unwrap();
/// let config = Annotated::new(
///     ["$provide"],
///     Func::new(|args| {
///         let provide = args.get::<Provide>(0)?;
///         provide.value("answer", dyn_svc(42i32))?;
///         Ok(None)
///     }),
/// );
/// injector.load_new_modules([config]).unwrap();
///
/// assert_eq!(42, *injector.get::<i32>("answer").unwrap());
/// ```
#[derive(Clone)]
pub struct Provide {
    injector: Injector,
}

impl Provide {
    pub(crate) fn new(injector: Injector) -> Self {
        Provide { injector }
    }

    fn container(&self) -> InjectResult<Svc<Container>> {
        self.injector.container()
    }

    fn instance_injector(&self) -> Injector {
        self.injector.with_layer(Layer::Instance)
    }

    /// Registers a provider for `name`. Callable sources are instantiated
    /// through the provider layer, so they can depend on other providers and
    /// constants. The provider must have a `$get` target.
    pub fn provider(
        &self,
        name: &str,
        source: impl Into<ProviderSource>,
    ) -> InjectResult<Svc<Provider>> {
        check_name(name, "service")?;
        let container = self.container()?;

        let provider = match source.into() {
            ProviderSource::Object(provider) => Some(provider),
            ProviderSource::Callable(func) => {
                let target = Target::Func(func);
                let object =
                    container.instantiate(Layer::Provider, &target, None, None)?;
                downcast_svc::<Provider>(object).ok()
            }
            ProviderSource::Annotated(annotated) => {
                let target = Target::Annotated(annotated);
                let object =
                    container.instantiate(Layer::Provider, &target, None, None)?;
                downcast_svc::<Provider>(object).ok()
            }
        };
        let provider = provider
            .filter(|provider| provider.getter().is_some())
            .ok_or_else(|| InjectError::MissingGetter {
                name: name.to_owned(),
            })?;

        trace!(name, "registered provider");
        container.register_provider(name, provider.clone());
        Ok(provider)
    }

    /// Registers a factory for `name`. The factory must produce a value.
    pub fn factory(
        &self,
        name: &str,
        factory: impl Into<Target>,
    ) -> InjectResult<Svc<Provider>> {
        self.factory_with(name, factory, true)
    }

    /// Registers a factory for `name`. If `enforce` is set, a factory that
    /// produces nothing fails with
    /// [`InjectError::UndefinedProviderResult`].
    pub fn factory_with(
        &self,
        name: &str,
        factory: impl Into<Target>,
        enforce: bool,
    ) -> InjectResult<Svc<Provider>> {
        let factory = factory.into();
        if !enforce {
            return self.provider(name, Provider::new(factory));
        }

        let instance = self.instance_injector();
        let service_name = name.to_owned();
        let getter = Func::new(move |args: &Args| {
            instance
                .invoke(factory.clone(), args.this().cloned(), None, None)?
                .ok_or_else(|| InjectError::UndefinedProviderResult {
                    name: service_name.clone(),
                })
                .map(Some)
        });
        self.provider(name, Provider::new(getter))
    }

    /// Registers a service for `name`, created by instantiating `constructor`.
    pub fn service(
        &self,
        name: &str,
        constructor: impl Into<Target>,
    ) -> InjectResult<Svc<Provider>> {
        let constructor = constructor.into();
        let getter = Annotated::new(
            ["$injector"],
            Func::new(move |args: &Args| {
                let injector = args.get::<Injector>(0)?;
                injector
                    .instantiate(constructor.clone(), None, None)
                    .map(Some)
            }),
        );
        self.factory(name, getter)
    }

    /// Registers a fixed value for `name`.
    pub fn value(
        &self,
        name: &str,
        value: DynSvc,
    ) -> InjectResult<Svc<Provider>> {
        self.factory_with(name, Func::value(value), false)
    }

    /// Registers a constant. Constants are available to both layers right
    /// away, so config blocks can use them.
    pub fn constant(&self, name: &str, value: DynSvc) -> InjectResult<()> {
        check_name(name, "constant")?;
        trace!(name, "registered constant");
        self.container()?.constant(name, value);
        Ok(())
    }

    /// Decorates the service `name`. The decorator is invoked with the
    /// original instance available as the local `$delegate`, and its result
    /// replaces the instance. Later decorators wrap earlier ones.
    pub fn decorator(
        &self,
        name: &str,
        decorator: impl Into<Target>,
    ) -> InjectResult<()> {
        let container = self.container()?;
        let provider_name = format!("{name}{PROVIDER_SUFFIX}");
        let provider = container
            .resolve(Layer::Provider, &provider_name, None)?
            .and_then(|provider| downcast_svc::<Provider>(provider).ok())
            .ok_or_else(|| InjectError::MissingGetter {
                name: name.to_owned(),
            })?;
        let original = provider.getter().ok_or_else(|| {
            InjectError::MissingGetter {
                name: name.to_owned(),
            }
        })?;

        let instance = self.instance_injector();
        let decorator = decorator.into();
        provider.set_getter(Func::new(move |args: &Args| {
            let delegate = instance.invoke(
                original.clone(),
                args.this().cloned(),
                None,
                None,
            )?;
            let mut locals = Locals::new();
            locals.insert("$delegate", delegate);
            instance.invoke(decorator.clone(), None, Some(&locals), None)
        }));

        trace!(name, "registered decorator");
        Ok(())
    }

    /// Registers several providers in order.
    pub fn providers<I, S, P>(&self, entries: I) -> InjectResult<()>
    where
        I: IntoIterator<Item = (S, P)>,
        S: AsRef<str>,
        P: Into<ProviderSource>,
    {
        for (name, source) in entries {
            self.provider(name.as_ref(), source)?;
        }
        Ok(())
    }

    /// Registers several factories in order.
    pub fn factories<I, S, T>(&self, entries: I) -> InjectResult<()>
    where
        I: IntoIterator<Item = (S, T)>,
        S: AsRef<str>,
        T: Into<Target>,
    {
        for (name, factory) in entries {
            self.factory(name.as_ref(), factory)?;
        }
        Ok(())
    }

    /// Registers several services in order.
    pub fn services<I, S, T>(&self, entries: I) -> InjectResult<()>
    where
        I: IntoIterator<Item = (S, T)>,
        S: AsRef<str>,
        T: Into<Target>,
    {
        for (name, constructor) in entries {
            self.service(name.as_ref(), constructor)?;
        }
        Ok(())
    }

    /// Registers several values in order.
    pub fn values<I, S>(&self, entries: I) -> InjectResult<()>
    where
        I: IntoIterator<Item = (S, DynSvc)>,
        S: AsRef<str>,
    {
        for (name, value) in entries {
            self.value(name.as_ref(), value)?;
        }
        Ok(())
    }

    /// Registers several constants in order.
    pub fn constants<I, S>(&self, entries: I) -> InjectResult<()>
    where
        I: IntoIterator<Item = (S, DynSvc)>,
        S: AsRef<str>,
    {
        for (name, value) in entries {
            self.constant(name.as_ref(), value)?;
        }
        Ok(())
    }

    /// Replays a recorded registration.
    pub(crate) fn apply(&self, recipe: &Recipe) -> InjectResult<()> {
        match recipe {
            Recipe::Provider { name, source } => {
                // Each injector gets its own copy of a recorded object.
                let source = match source {
                    ProviderSource::Object(provider) => {
                        ProviderSource::from(Provider::clone(provider))
                    }
                    source => source.clone(),
                };
                self.provider(name, source).map(drop)
            }
            Recipe::Factory { name, target } => {
                self.factory(name, target.clone()).map(drop)
            }
            Recipe::Service { name, target } => {
                self.service(name, target.clone()).map(drop)
            }
            Recipe::Value { name, value } => {
                self.value(name, value.clone()).map(drop)
            }
            Recipe::Constant { name, value } => {
                self.constant(name, value.clone())
            }
            Recipe::Decorator { name, target } => {
                self.decorator(name, target.clone())
            }
            Recipe::Invoke { .. } => Err(InjectError::InternalError(
                format!("{} cannot be replayed by $provide", recipe.method()),
            )),
        }
    }
}

impl Debug for Provide {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provide").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dyn_svc, ModuleRegistry};

    fn setup() -> (Injector, Svc<Provide>) {
        let injector = Injector::create(false, ModuleRegistry::new());
        let provide = injector
            .with_layer(Layer::Provider)
            .get::<Provide>("$provide")
            .unwrap();
        (injector, provide)
    }

    #[test]
    fn reserved_names_are_rejected() {
        let (_injector, provide) = setup();
        let error = provide
            .value("hasOwnProperty", dyn_svc(1i32))
            .unwrap_err();
        assert_eq!("'hasOwnProperty' is not a valid service name", error.to_string());

        let error = provide
            .constant("hasOwnProperty", dyn_svc(1i32))
            .unwrap_err();
        assert_eq!("'hasOwnProperty' is not a valid constant name", error.to_string());
    }

    #[test]
    fn provider_without_getter_is_rejected() {
        let (_injector, provide) = setup();
        match provide.provider("empty", Provider::default()) {
            Err(InjectError::MissingGetter { name }) => assert_eq!("empty", name),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }

        let not_a_provider = Func::constructor(|_| Ok(dyn_svc(1i32)));
        assert!(provide.provider("number", not_a_provider).is_err());
    }

    #[test]
    fn enforced_factory_must_produce_a_value() {
        let (injector, provide) = setup();
        provide.factory("nothing", Func::new(|_| Ok(None))).unwrap();
        provide
            .factory_with("maybe", Func::new(|_| Ok(None)), false)
            .unwrap();

        match injector.get_dyn("nothing") {
            Err(InjectError::UndefinedProviderResult { name }) => {
                assert_eq!("nothing", name)
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
        assert!(injector.get_dyn("maybe").unwrap().is_none());
    }

    #[test]
    fn constants_are_visible_to_both_layers() {
        let (injector, provide) = setup();
        provide.constant("limit", dyn_svc(10u32)).unwrap();

        assert_eq!(10, *injector.get::<u32>("limit").unwrap());
        let provider_injector = injector.with_layer(Layer::Provider);
        assert_eq!(10, *provider_injector.get::<u32>("limit").unwrap());
    }

    #[test]
    fn decorating_an_unknown_service_fails() {
        let (_injector, provide) = setup();
        let error = provide
            .decorator("missing", Func::new(|args| Ok(args.raw(0).cloned())))
            .unwrap_err();
        assert_eq!("unknown provider: missingProvider", error.to_string());
    }

    #[test]
    fn plural_forms_register_in_order() {
        let (injector, provide) = setup();
        provide
            .values([("a", dyn_svc(1i32)), ("b", dyn_svc(2i32))])
            .unwrap();
        provide.constants([("c", dyn_svc(3i32))]).unwrap();

        assert_eq!(1, *injector.get::<i32>("a").unwrap());
        assert_eq!(2, *injector.get::<i32>("b").unwrap());
        assert_eq!(3, *injector.get::<i32>("c").unwrap());
    }
}
