use crate::{
    sync::{Lock, LockEx},
    DynSvc, InjectError, InjectResult, ProviderSource, Svc, Target,
};
use serde_json::{Map, Value};
use std::{
    collections::{HashMap, VecDeque},
    fmt::{Debug, Formatter},
};
use tracing::trace;

/// A registration recorded by a [`Module`], replayed when the module is
/// loaded into an injector.
#[derive(Clone)]
pub enum Recipe {
    /// `$provide.provider(name, source)`
    Provider {
        /// The service name.
        name: String,
        /// The provider object or its constructor.
        source: ProviderSource,
    },
    /// `$provide.factory(name, target)`
    Factory {
        /// The service name.
        name: String,
        /// The factory.
        target: Target,
    },
    /// `$provide.service(name, target)`
    Service {
        /// The service name.
        name: String,
        /// The constructor.
        target: Target,
    },
    /// `$provide.value(name, value)`
    Value {
        /// The service name.
        name: String,
        /// The value.
        value: DynSvc,
    },
    /// `$provide.constant(name, value)`
    Constant {
        /// The constant name.
        name: String,
        /// The value.
        value: DynSvc,
    },
    /// `$provide.decorator(name, target)`
    Decorator {
        /// The decorated service name.
        name: String,
        /// The decorator.
        target: Target,
    },
    /// `$injector.invoke(target)`, used for config blocks.
    Invoke {
        /// The config block.
        target: Target,
    },
}

impl Recipe {
    /// The name of the provider-layer service that replays this recipe.
    #[must_use]
    pub fn target_name(&self) -> &'static str {
        match self {
            Recipe::Invoke { .. } => "$injector",
            _ => "$provide",
        }
    }

    /// The method of the target service this recipe calls.
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            Recipe::Provider { .. } => "provider",
            Recipe::Factory { .. } => "factory",
            Recipe::Service { .. } => "service",
            Recipe::Value { .. } => "value",
            Recipe::Constant { .. } => "constant",
            Recipe::Decorator { .. } => "decorator",
            Recipe::Invoke { .. } => "invoke",
        }
    }

    /// The name this recipe registers, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Recipe::Provider { name, .. }
            | Recipe::Factory { name, .. }
            | Recipe::Service { name, .. }
            | Recipe::Value { name, .. }
            | Recipe::Constant { name, .. }
            | Recipe::Decorator { name, .. } => Some(name),
            Recipe::Invoke { .. } => None,
        }
    }
}

impl Debug for Recipe {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.target_name(), self.method())?;
        match self.name() {
            Some(name) => write!(f, "({name:?})"),
            None => f.write_str("(..)"),
        }
    }
}

struct ModuleInner {
    name: String,
    requires: Vec<String>,
    invoke_queue: Lock<VecDeque<Recipe>>,
    config_blocks: Lock<Vec<Recipe>>,
    run_blocks: Lock<Vec<Target>>,
    info: Lock<Map<String, Value>>,
}

/// A named group of registrations. Registrations are recorded in order and
/// only take effect when the module is loaded into an injector. Builder
/// methods return the same module so calls can be chained.
///
/// Constants are replayed before every other registration of the module.
/// Decorators and config blocks are replayed after all of them.
#[derive(Clone)]
pub struct Module {
    inner: Svc<ModuleInner>,
}

impl Module {
    fn new(name: String, requires: Vec<String>) -> Self {
        Module {
            inner: Svc::new(ModuleInner {
                name,
                requires,
                invoke_queue: Lock::new(VecDeque::new()),
                config_blocks: Lock::new(Vec::new()),
                run_blocks: Lock::new(Vec::new()),
                info: Lock::new(Map::new()),
            }),
        }
    }

    fn push(&self, recipe: Recipe) -> Self {
        trace!(module = %self.name(), ?recipe, "recorded registration");
        self.inner
            .invoke_queue
            .with_inner_mut(|queue| queue.push_back(recipe));
        self.clone()
    }

    fn push_config(&self, recipe: Recipe) -> Self {
        trace!(module = %self.name(), ?recipe, "recorded config block");
        self.inner
            .config_blocks
            .with_inner_mut(|queue| queue.push(recipe));
        self.clone()
    }

    /// The name of this module.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The modules that are loaded before this one.
    #[must_use]
    pub fn requires(&self) -> &[String] {
        &self.inner.requires
    }

    /// Records a provider registration. A provider object is copied into
    /// each injector that loads the module. Only its state is shared.
    pub fn provider(
        &self,
        name: impl Into<String>,
        source: impl Into<ProviderSource>,
    ) -> Self {
        self.push(Recipe::Provider {
            name: name.into(),
            source: source.into(),
        })
    }

    /// Records a factory registration.
    pub fn factory(
        &self,
        name: impl Into<String>,
        target: impl Into<Target>,
    ) -> Self {
        self.push(Recipe::Factory {
            name: name.into(),
            target: target.into(),
        })
    }

    /// Records a service registration.
    pub fn service(
        &self,
        name: impl Into<String>,
        target: impl Into<Target>,
    ) -> Self {
        self.push(Recipe::Service {
            name: name.into(),
            target: target.into(),
        })
    }

    /// Records a value registration.
    pub fn value(&self, name: impl Into<String>, value: DynSvc) -> Self {
        self.push(Recipe::Value {
            name: name.into(),
            value,
        })
    }

    /// Records a constant registration. Constants are registered before
    /// anything else in the module, most recently recorded first.
    pub fn constant(&self, name: impl Into<String>, value: DynSvc) -> Self {
        let recipe = Recipe::Constant {
            name: name.into(),
            value,
        };
        trace!(module = %self.name(), ?recipe, "recorded constant");
        self.inner
            .invoke_queue
            .with_inner_mut(|queue| queue.push_front(recipe));
        self.clone()
    }

    /// Records a decorator. Decorators run with the config blocks.
    pub fn decorator(
        &self,
        name: impl Into<String>,
        target: impl Into<Target>,
    ) -> Self {
        self.push_config(Recipe::Decorator {
            name: name.into(),
            target: target.into(),
        })
    }

    /// Records a config block. Config blocks are invoked through the
    /// provider layer while the module loads.
    pub fn config(&self, target: impl Into<Target>) -> Self {
        self.push_config(Recipe::Invoke {
            target: target.into(),
        })
    }

    /// Records a run block. Run blocks are invoked through the instance
    /// layer once every requested module has loaded.
    pub fn run(&self, target: impl Into<Target>) -> Self {
        let target = target.into();
        self.inner
            .run_blocks
            .with_inner_mut(|blocks| blocks.push(target));
        self.clone()
    }

    /// Custom information about this module.
    #[must_use]
    pub fn info(&self) -> Map<String, Value> {
        self.inner.info.with_inner(Clone::clone)
    }

    /// Replaces the custom information about this module.
    pub fn set_info(&self, info: Map<String, Value>) -> Self {
        self.inner.info.with_inner_mut(|current| *current = info);
        self.clone()
    }

    /// The registrations replayed through `$provide`, in replay order.
    #[must_use]
    pub fn invoke_queue(&self) -> Vec<Recipe> {
        self.inner
            .invoke_queue
            .with_inner(|queue| queue.iter().cloned().collect())
    }

    /// The decorators and config blocks, in replay order.
    #[must_use]
    pub fn config_blocks(&self) -> Vec<Recipe> {
        self.inner.config_blocks.with_inner(Clone::clone)
    }

    /// The run blocks, in invocation order.
    #[must_use]
    pub fn run_blocks(&self) -> Vec<Target> {
        self.inner.run_blocks.with_inner(Clone::clone)
    }

    /// Returns `true` if both handles refer to the same module record.
    #[must_use]
    pub fn ptr_eq(a: &Module, b: &Module) -> bool {
        Svc::ptr_eq(&a.inner, &b.inner)
    }
}

impl Debug for Module {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.inner.name)
            .field("requires", &self.inner.requires)
            .field("invoke_queue", &self.invoke_queue())
            .field("config_blocks", &self.config_blocks())
            .finish_non_exhaustive()
    }
}

/// The modules available to injectors. Cloning a registry shares it.
///
/// ```
/// use named_injector::{InjectError, ModuleRegistry};
///
/// let registry = ModuleRegistry::new();
/// registry.declare("core", Vec::<String>::new()).unwrap();
/// let app = registry.declare("app", ["core"]).unwrap();
///
/// assert_eq!(["core".to_string()], app.requires());
/// assert!(matches!(
///     registry.get("missing"),
///     Err(InjectError::ModuleNotFound { .. })
/// ));
/// ```
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    modules: Svc<Lock<HashMap<String, Module>>>,
}

impl ModuleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        ModuleRegistry::default()
    }

    /// Declares a module. Declaring a name again replaces the previous
    /// record.
    pub fn declare<I, S>(&self, name: &str, requires: I) -> InjectResult<Module>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if name == "hasOwnProperty" {
            return Err(InjectError::ReservedName {
                name: name.to_owned(),
                context: "module",
            });
        }

        let requires = requires.into_iter().map(Into::into).collect();
        let module = Module::new(name.to_owned(), requires);
        trace!(module = %name, "declared module");
        self.modules.with_inner_mut(|modules| {
            modules.insert(name.to_owned(), module.clone());
        });
        Ok(module)
    }

    /// Declares a module with an initial config block.
    pub fn declare_with_config<I, S>(
        &self,
        name: &str,
        requires: I,
        config: impl Into<Target>,
    ) -> InjectResult<Module>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(self.declare(name, requires)?.config(config))
    }

    /// Gets a declared module.
    pub fn get(&self, name: &str) -> InjectResult<Module> {
        self.modules
            .with_inner(|modules| modules.get(name).cloned())
            .ok_or_else(|| InjectError::ModuleNotFound {
                name: name.to_owned(),
            })
    }

    /// Whether a module has been declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.modules.with_inner(|modules| modules.contains_key(name))
    }

    /// Forgets every declared module.
    pub fn clear(&self) {
        self.modules.with_inner_mut(HashMap::clear);
    }
}

impl Debug for ModuleRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.modules.with_inner(|modules| {
            f.debug_set().entries(modules.keys()).finish()
        })
    }
}

/// Declares a module in a registry along with its registrations.
///
/// Each section maps names to targets or values and records them with the
/// matching [`Module`] method. `config` and `run` take lists of targets.
/// The result is the declared module, or the error from declaring it.
///
/// # Example
///
/// ```
/// use named_injector::{define_module, dyn_svc, Func, Injector, ModuleRegistry, Svc};
///
/// let registry = ModuleRegistry::new();
/// define_module!(
///     registry => "core",
///     requires = [],
///     constants = { "base" => dyn_svc(40i32) },
/// )
/// .unwrap();
/// define_module!(
///     registry => "app",
///     requires = ["core"],
///     factories = {
///         "answer" => Func::new(|args| {
///             let base = args.get::<i32>(0)?;
///             Ok(Some(dyn_svc(*base + 2)))
///         })
///         .inject(["base"]),
///     },
/// )
/// .unwrap();
///
/// let mut builder = Injector::builder();
/// builder.registry(registry);
/// builder.module("app");
/// let injector = builder.build().unwrap();
///
/// let answer: Svc<i32> = injector.get("answer").unwrap();
/// assert_eq!(42, *answer);
/// ```
#[macro_export]
macro_rules! define_module {
    {
        $registry:expr => $name:expr,
        requires = [$($require:expr),* $(,)?]
        $(, $key:ident = $value:tt)*
        $(,)?
    } => {
        match $registry.declare(
            $name,
            ::std::vec::Vec::<::std::string::String>::from([
                $(::std::string::String::from($require)),*
            ]),
        ) {
            ::std::result::Result::Ok(module) => {
                $($crate::define_module!(@record module, $key = $value);)*
                $crate::InjectResult::Ok(module)
            }
            ::std::result::Result::Err(error) => ::std::result::Result::Err(error),
        }
    };
    (@record $module:ident, providers = { $($n:expr => $v:expr),* $(,)? }) => {
        $($module.provider($n, $v);)*
    };
    (@record $module:ident, factories = { $($n:expr => $v:expr),* $(,)? }) => {
        $($module.factory($n, $v);)*
    };
    (@record $module:ident, services = { $($n:expr => $v:expr),* $(,)? }) => {
        $($module.service($n, $v);)*
    };
    (@record $module:ident, values = { $($n:expr => $v:expr),* $(,)? }) => {
        $($module.value($n, $v);)*
    };
    (@record $module:ident, constants = { $($n:expr => $v:expr),* $(,)? }) => {
        $($module.constant($n, $v);)*
    };
    (@record $module:ident, decorators = { $($n:expr => $v:expr),* $(,)? }) => {
        $($module.decorator($n, $v);)*
    };
    (@record $module:ident, config = [ $($v:expr),* $(,)? ]) => {
        $($module.config($v);)*
    };
    (@record $module:ident, run = [ $($v:expr),* $(,)? ]) => {
        $($module.run($v);)*
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dyn_svc, Func};
    use serde_json::json;

    #[test]
    fn constants_are_queued_first() {
        let registry = ModuleRegistry::new();
        let module = registry
            .declare("app", Vec::<String>::new())
            .unwrap()
            .value("a", dyn_svc(1i32))
            .constant("b", dyn_svc(2i32))
            .factory("c", Func::value(dyn_svc(3i32)))
            .constant("d", dyn_svc(4i32));

        let names: Vec<_> = module
            .invoke_queue()
            .iter()
            .map(|recipe| recipe.name().unwrap_or_default().to_owned())
            .collect();
        assert_eq!(vec!["d", "b", "a", "c"], names);
    }

    #[test]
    fn decorators_and_config_share_a_queue() {
        let registry = ModuleRegistry::new();
        let module = registry
            .declare_with_config("app", Vec::<String>::new(), Func::new(|_| Ok(None)))
            .unwrap()
            .decorator("a", Func::new(|_| Ok(None)))
            .config(Func::new(|_| Ok(None)));

        let methods: Vec<_> = module
            .config_blocks()
            .iter()
            .map(|recipe| (recipe.target_name(), recipe.method()))
            .collect();
        assert_eq!(
            vec![
                ("$injector", "invoke"),
                ("$provide", "decorator"),
                ("$injector", "invoke"),
            ],
            methods
        );
        assert!(module.invoke_queue().is_empty());
    }

    #[test]
    fn redeclaring_replaces_the_record() {
        let registry = ModuleRegistry::new();
        let first = registry
            .declare("app", Vec::<String>::new())
            .unwrap()
            .value("a", dyn_svc(1i32));
        let second = registry.declare("app", ["core"]).unwrap();

        let current = registry.get("app").unwrap();
        assert!(Module::ptr_eq(&second, &current));
        assert!(!Module::ptr_eq(&first, &current));
        assert!(current.invoke_queue().is_empty());
    }

    #[test]
    fn reserved_and_missing_names() {
        let registry = ModuleRegistry::new();
        let error = registry
            .declare("hasOwnProperty", Vec::<String>::new())
            .unwrap_err();
        assert_eq!("'hasOwnProperty' is not a valid module name", error.to_string());

        match registry.get("nope") {
            Err(InjectError::ModuleNotFound { name }) => assert_eq!("nope", name),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn registries_are_isolated_and_clearable() {
        let first = ModuleRegistry::new();
        let second = ModuleRegistry::new();
        first.declare("app", Vec::<String>::new()).unwrap();

        assert!(first.contains("app"));
        assert!(!second.contains("app"));
        assert!(first.clone().contains("app"));

        first.clear();
        assert!(!first.contains("app"));
    }

    #[test]
    fn info_is_stored() {
        let registry = ModuleRegistry::new();
        let module = registry.declare("app", Vec::<String>::new()).unwrap();
        assert!(module.info().is_empty());

        let info = json!({ "version": "1.0.0" });
        if let Value::Object(info) = info {
            module.set_info(info);
        }
        assert_eq!(Some(&json!("1.0.0")), module.info().get("version"));
    }

    #[test]
    fn define_module_records_sections() {
        let registry = ModuleRegistry::new();
        let module = define_module! {
            registry => "app",
            requires = ["core"],
            values = { "a" => dyn_svc(1i32) },
            constants = { "b" => dyn_svc(2i32) },
            decorators = { "a" => Func::new(|_| Ok(None)) },
            run = [Func::new(|_| Ok(None))],
        }
        .unwrap();

        assert_eq!(["core".to_string()], module.requires());
        assert_eq!(2, module.invoke_queue().len());
        assert_eq!(1, module.config_blocks().len());
        assert_eq!(1, module.run_blocks().len());
    }
}
