use crate::{
    annotate, downcast_svc, dyn_svc, expect_svc,
    sync::{Lock, LockEx, ResolutionLock},
    Args, Cache, CacheEntry, DynSvc, Func, FuncKind, InjectError, InjectResult,
    InjectorBuilder, LoadedModules, Locals, Module, ModuleRef, ModuleRegistry,
    Provide, Provider, RequestPath, Service, Svc, Target, WeakSvc,
};
use std::{
    collections::HashMap,
    fmt::{Debug, Formatter},
};
use tracing::{debug, trace};

/// Suffix appended to a service name to get the name of its provider.
pub const PROVIDER_SUFFIX: &str = "Provider";

/// Which cache an injector handle resolves against.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum Layer {
    /// Resolves provider objects, constants and the `$provide` handle. Names
    /// missing from this layer are always unknown.
    Provider,

    /// Resolves service instances. Names missing from this layer are created
    /// by the `$get` target of `<name>Provider`.
    Instance,
}

/// The state shared by every handle to an injector. Resolution through a
/// container is serialized across threads, so in-progress markers and the
/// request path only ever belong to one thread.
pub(crate) struct Container {
    strict_di: bool,
    pub(crate) registry: ModuleRegistry,
    provider_cache: Cache,
    instance_cache: Cache,
    path: RequestPath,
    pub(crate) resolution: ResolutionLock,
    pub(crate) loaded: Lock<LoadedModules>,
    pub(crate) modules: Lock<HashMap<String, Module>>,
}

impl Container {
    fn cache(&self, layer: Layer) -> &Cache {
        match layer {
            Layer::Provider => &self.provider_cache,
            Layer::Instance => &self.instance_cache,
        }
    }

    pub(crate) fn constant(&self, name: &str, value: DynSvc) {
        self.provider_cache.insert(name, Some(value.clone()));
        self.instance_cache.insert(name, Some(value));
    }

    pub(crate) fn register_provider(&self, name: &str, provider: Svc<Provider>) {
        self.provider_cache
            .insert(format!("{name}{PROVIDER_SUFFIX}"), Some(provider as DynSvc));
    }

    pub(crate) fn resolve(
        &self,
        layer: Layer,
        name: &str,
        caller: Option<&str>,
    ) -> InjectResult<Option<DynSvc>> {
        let _resolving = self.resolution.enter();
        let cache = self.cache(layer);
        match cache.lookup(name) {
            Some(CacheEntry::InProgress) => {
                Err(InjectError::CircularDependency {
                    path: self.path.cycle(name),
                })
            }
            Some(CacheEntry::Ready(value)) => {
                trace!(name, ?layer, "cache hit");
                Ok(value)
            }
            None => {
                let _guard = self.path.enter(name);
                cache.begin(name);
                match self.create(layer, name, caller) {
                    Ok(value) => {
                        cache.insert(name, value.clone());
                        Ok(value)
                    }
                    Err(error) => {
                        cache.abandon(name);
                        Err(error)
                    }
                }
            }
        }
    }

    fn create(
        &self,
        layer: Layer,
        name: &str,
        caller: Option<&str>,
    ) -> InjectResult<Option<DynSvc>> {
        if layer == Layer::Provider {
            return Err(InjectError::UnknownProvider {
                path: self.path.unknown(caller),
            });
        }

        let provider_name = format!("{name}{PROVIDER_SUFFIX}");
        let provider = self
            .resolve(Layer::Provider, &provider_name, caller)?
            .and_then(|provider| downcast_svc::<Provider>(provider).ok())
            .ok_or_else(|| InjectError::MissingGetter {
                name: name.to_owned(),
            })?;
        let getter =
            provider.getter().ok_or_else(|| InjectError::MissingGetter {
                name: name.to_owned(),
            })?;

        debug!(name, "instantiating service");
        let this: DynSvc = provider;
        self.invoke(Layer::Instance, &getter, Some(this), None, Some(name))
    }

    fn args(
        &self,
        layer: Layer,
        target: &Target,
        this: Option<DynSvc>,
        locals: Option<&Locals>,
        caller: Option<&str>,
    ) -> InjectResult<Args> {
        let names = annotate(target, self.strict_di, caller)?;
        let values = names
            .iter()
            .map(|key| match locals.and_then(|locals| locals.get(key)) {
                Some(local) => Ok(local.clone()),
                None => self.resolve(layer, key, caller),
            })
            .collect::<InjectResult<Vec<_>>>()?;
        Ok(Args::new(names, values, this))
    }

    pub(crate) fn invoke(
        &self,
        layer: Layer,
        target: &Target,
        this: Option<DynSvc>,
        locals: Option<&Locals>,
        caller: Option<&str>,
    ) -> InjectResult<Option<DynSvc>> {
        let _resolving = self.resolution.enter();
        let func = target.func();
        trace!(callable = %func.signature(), ?layer, "invoking");
        match func.kind() {
            FuncKind::Factory => {
                let args = self.args(layer, target, this, locals, caller)?;
                func.call(&args)
            }
            FuncKind::Constructor => {
                let args = self.args(layer, target, None, locals, caller)?;
                func.construct(&args).map(Some)
            }
        }
    }

    pub(crate) fn instantiate(
        &self,
        layer: Layer,
        target: &Target,
        locals: Option<&Locals>,
        caller: Option<&str>,
    ) -> InjectResult<DynSvc> {
        let _resolving = self.resolution.enter();
        let func = target.func();
        trace!(callable = %func.signature(), ?layer, "instantiating");
        let args = self.args(layer, target, None, locals, caller)?;
        func.construct(&args)
    }

    fn has(&self, layer: Layer, name: &str) -> bool {
        self.provider_cache
            .contains(&format!("{name}{PROVIDER_SUFFIX}"))
            || self.cache(layer).contains(name)
    }
}

#[derive(Clone)]
enum StateRef {
    Owned(Svc<Container>),
    Borrowed(WeakSvc<Container>),
}

/// A handle to a name-keyed dependency injection container.
///
/// Every injector has two layers. The provider layer holds provider objects,
/// constants and the `$provide` handle, and is what module config blocks
/// see. The instance layer holds the services themselves, each created at
/// most once by its provider's `$get` target.
///
/// The handle returned by [`InjectorBuilder::build`] owns the container.
/// Handles obtained by injecting `$injector` refer back to it without
/// keeping it alive, and fail with [`InjectError::InjectorDropped`] once it
/// is gone.
///
/// ```
/// use named_injector::{dyn_svc, Func, Injector, ModuleRegistry};
///
/// let registry = ModuleRegistry::new();
/// registry
///     .declare("app", Vec::<String>::new())
///     .unwrap()
///     .value("greeting", dyn_svc(String::from("Hello")))
///     .factory(
///         "message",
///         Func::new(|args| {
///             let greeting = args.get::<String>(0)?;
///             Ok(Some(dyn_svc(format!("{greeting}, world!"))))
///         })
///         .inject(["greeting"]),
///     );
///
/// let mut builder = Injector::builder();
/// builder.registry(registry);
/// builder.module("app");
/// let injector = builder.build().unwrap();
///
/// let message: named_injector::Svc<String> = injector.get("message").unwrap();
/// assert_eq!("Hello, world!", message.as_str());
/// ```
#[derive(Clone)]
pub struct Injector {
    state: StateRef,
    layer: Layer,
    strict_di: bool,
}

impl Injector {
    /// Creates a builder for a new injector.
    #[must_use]
    pub fn builder() -> InjectorBuilder {
        InjectorBuilder::default()
    }

    /// Creates an empty container with its bootstrap entries and returns the
    /// owning instance-layer handle.
    pub(crate) fn create(strict_di: bool, registry: ModuleRegistry) -> Self {
        let container = Svc::new_cyclic(|weak: &WeakSvc<Container>| {
            let provider_injector = Injector {
                state: StateRef::Borrowed(weak.clone()),
                layer: Layer::Provider,
                strict_di,
            };
            let instance_injector = provider_injector.with_layer(Layer::Instance);

            let provider_cache = Cache::new();
            provider_cache.insert(
                "$provide",
                Some(dyn_svc(Provide::new(provider_injector.clone()))),
            );
            provider_cache.insert("$injector", Some(dyn_svc(provider_injector)));
            provider_cache.insert(
                format!("$injector{PROVIDER_SUFFIX}"),
                Some(dyn_svc(Provider::new(Func::value(dyn_svc(
                    instance_injector,
                ))))),
            );

            Container {
                strict_di,
                registry,
                provider_cache,
                instance_cache: Cache::new(),
                path: RequestPath::new(),
                resolution: ResolutionLock::new(),
                loaded: Lock::new(LoadedModules::default()),
                modules: Lock::new(HashMap::new()),
            }
        });

        Injector {
            state: StateRef::Owned(container),
            layer: Layer::Instance,
            strict_di,
        }
    }

    pub(crate) fn container(&self) -> InjectResult<Svc<Container>> {
        match &self.state {
            StateRef::Owned(container) => Ok(container.clone()),
            StateRef::Borrowed(weak) => {
                weak.upgrade().ok_or(InjectError::InjectorDropped)
            }
        }
    }

    fn container_ptr(&self) -> *const Container {
        match &self.state {
            StateRef::Owned(container) => Svc::as_ptr(container),
            StateRef::Borrowed(weak) => weak.as_ptr(),
        }
    }

    /// A non-owning handle to the same container and layer.
    #[must_use]
    pub(crate) fn downgrade(&self) -> Self {
        let state = match &self.state {
            StateRef::Owned(container) => {
                StateRef::Borrowed(Svc::downgrade(container))
            }
            StateRef::Borrowed(weak) => StateRef::Borrowed(weak.clone()),
        };
        Injector {
            state,
            layer: self.layer,
            strict_di: self.strict_di,
        }
    }

    /// A non-owning handle to another layer of the same container.
    #[must_use]
    pub(crate) fn with_layer(&self, layer: Layer) -> Self {
        Injector {
            layer,
            ..self.downgrade()
        }
    }

    /// The layer this handle resolves against.
    #[must_use]
    pub fn layer(&self) -> Layer {
        self.layer
    }

    /// Whether dependency lists must be explicit.
    #[must_use]
    pub fn strict_di(&self) -> bool {
        self.strict_di
    }

    /// Returns `true` if both handles resolve against the same layer of the
    /// same container.
    #[must_use]
    pub fn same(a: &Injector, b: &Injector) -> bool {
        a.layer == b.layer && std::ptr::eq(a.container_ptr(), b.container_ptr())
    }

    /// Resolves a name. The caller is only used to describe the request in
    /// diagnostics.
    pub fn resolve(
        &self,
        name: &str,
        caller: Option<&str>,
    ) -> InjectResult<Option<DynSvc>> {
        self.container()?.resolve(self.layer, name, caller)
    }

    /// Resolves a name without downcasting it.
    pub fn get_dyn(&self, name: &str) -> InjectResult<Option<DynSvc>> {
        self.resolve(name, None)
    }

    /// Resolves a name and downcasts it to a concrete type.
    pub fn get<T: Service>(&self, name: &str) -> InjectResult<Svc<T>> {
        expect_svc(name, self.get_dyn(name)?)
    }

    /// Invokes a target, resolving its dependencies through this layer.
    /// Locals take priority over the container. Constructors ignore `this`.
    pub fn invoke(
        &self,
        target: impl Into<Target>,
        this: Option<DynSvc>,
        locals: Option<&Locals>,
        caller: Option<&str>,
    ) -> InjectResult<Option<DynSvc>> {
        self.container()?
            .invoke(self.layer, &target.into(), this, locals, caller)
    }

    /// Invokes a target with no call context and no locals.
    pub fn call(&self, target: impl Into<Target>) -> InjectResult<Option<DynSvc>> {
        self.invoke(target, None, None, None)
    }

    /// Constructs a new instance from a target, resolving its dependencies
    /// through this layer.
    pub fn instantiate(
        &self,
        target: impl Into<Target>,
        locals: Option<&Locals>,
        caller: Option<&str>,
    ) -> InjectResult<DynSvc> {
        self.container()?
            .instantiate(self.layer, &target.into(), locals, caller)
    }

    /// Computes the dependency list of a target using this injector's
    /// strict mode setting.
    pub fn annotate(&self, target: &Target) -> InjectResult<Svc<[String]>> {
        annotate(target, self.strict_di, None)
    }

    /// Whether a name can be resolved without an unknown provider error,
    /// either because it has a provider or because it is already cached in
    /// this layer. A dropped container has nothing.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.container()
            .map_or(false, |container| container.has(self.layer, name))
    }

    /// Loads more modules into this injector. Modules that were already
    /// loaded are skipped. Run blocks of the new modules are invoked
    /// immediately.
    pub fn load_new_modules<I, M>(&self, modules: I) -> InjectResult<()>
    where
        I: IntoIterator<Item = M>,
        M: Into<ModuleRef>,
    {
        let modules: Vec<ModuleRef> = modules.into_iter().map(Into::into).collect();
        let container = self.container()?;
        let run_blocks = container.load_modules(&modules)?;
        container.run(run_blocks)
    }

    /// The modules loaded so far, by name.
    #[must_use]
    pub fn modules(&self) -> HashMap<String, Module> {
        self.container()
            .map(|container| container.modules.with_inner(Clone::clone))
            .unwrap_or_default()
    }

    /// A loaded module.
    #[must_use]
    pub fn module(&self, name: &str) -> Option<Module> {
        self.container().ok().and_then(|container| {
            container.modules.with_inner(|modules| modules.get(name).cloned())
        })
    }
}

impl Container {
    pub(crate) fn run(&self, run_blocks: Vec<Target>) -> InjectResult<()> {
        for block in run_blocks {
            self.invoke(Layer::Instance, &block, None, None, None)?;
        }
        Ok(())
    }
}

impl Debug for Injector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Injector")
            .field("layer", &self.layer)
            .field("strict_di", &self.strict_di)
            .field("owned", &matches!(self.state, StateRef::Owned(_)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Annotated, InjectError};
    use std::sync::Mutex;

    fn empty() -> Injector {
        Injector::create(false, ModuleRegistry::new())
    }

    #[test]
    fn bootstrap_entries_are_available() {
        let injector = empty();
        let provider_injector = injector.with_layer(Layer::Provider);

        assert!(provider_injector.get::<Provide>("$provide").is_ok());
        let provider_self = provider_injector.get::<Injector>("$injector").unwrap();
        assert!(Injector::same(&provider_injector, &provider_self));

        let instance_self = injector.get::<Injector>("$injector").unwrap();
        assert!(Injector::same(&injector, &instance_self));
        assert!(!Injector::same(&provider_self, &instance_self));
    }

    #[test]
    fn bootstrap_handles_do_not_keep_the_container_alive() {
        let injector = empty();
        let handle = injector.get::<Injector>("$injector").unwrap();
        drop(injector);

        match handle.get_dyn("$injector") {
            Err(InjectError::InjectorDropped) => {}
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
        assert!(!handle.has("$injector"));
    }

    #[test]
    fn unknown_provider_lists_the_caller() {
        let injector = empty();
        let error = injector.resolve("idontexist", Some("callerName")).err().unwrap();
        assert_eq!(
            "unknown provider: idontexistProvider <- idontexist <- callerName",
            error.to_string()
        );
    }

    #[test]
    fn failed_resolution_can_be_retried() {
        let injector = empty();
        for _ in 0..2 {
            match injector.get_dyn("idontexist") {
                Err(InjectError::UnknownProvider { path }) => {
                    assert_eq!(vec!["idontexistProvider", "idontexist"], path);
                }
                other => panic!("unexpected result: {:?}", other.map(|_| ())),
            }
        }
    }

    #[test]
    fn locals_take_priority_even_when_undefined() {
        let injector = empty();
        let seen = Svc::new(Mutex::new(None));
        let seen_in = seen.clone();
        let target = Annotated::new(
            ["$injector"],
            Func::new(move |args| {
                *seen_in.lock().unwrap() = Some(args.raw(0).is_some());
                Ok(None)
            }),
        );

        let locals = Locals::new().with_undefined("$injector");
        injector
            .invoke(target.clone(), None, Some(&locals), None)
            .unwrap();
        assert_eq!(Some(false), *seen.lock().unwrap());

        injector.call(target).unwrap();
        assert_eq!(Some(true), *seen.lock().unwrap());
    }

    #[test]
    fn constructors_ignore_call_context() {
        let injector = empty();
        let ctor = Func::constructor(|args| {
            Ok(dyn_svc(args.this().is_none()))
        });

        let result = injector
            .invoke(ctor, Some(dyn_svc(1i32)), None, None)
            .unwrap()
            .unwrap();
        assert!(*downcast_svc::<bool>(result).ok().unwrap());
    }

    #[test]
    fn factories_receive_call_context() {
        let injector = empty();
        let func = Func::new(|args| Ok(args.this().cloned()));

        let result = injector
            .invoke(func, Some(dyn_svc(7i32)), None, None)
            .unwrap()
            .unwrap();
        assert_eq!(7, *downcast_svc::<i32>(result).ok().unwrap());
    }

    #[test]
    fn instantiate_requires_an_instance() {
        let injector = empty();
        let func = Func::new(|_| Ok(None)).named("Nothing");
        match injector.instantiate(func, None, None) {
            Err(InjectError::NotConstructible { name }) => assert_eq!("Nothing", name),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn has_checks_providers_and_own_cache() {
        let injector = empty();
        assert!(injector.has("$injector"));
        assert!(!injector.has("$provide"));
        assert!(injector.with_layer(Layer::Provider).has("$provide"));
        assert!(!injector.has("xyz"));
    }
}
