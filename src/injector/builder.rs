use crate::{InjectResult, Injector, ModuleRef, ModuleRegistry};
use tracing::debug;

/// A builder for an [`Injector`]. Collects the modules to load, the registry
/// to find named modules in, and whether dependency lists must be explicit.
#[derive(Debug, Default)]
pub struct InjectorBuilder {
    registry: ModuleRegistry,
    modules: Vec<ModuleRef>,
    strict_di: bool,
}

impl InjectorBuilder {
    /// Sets the registry named modules are looked up in.
    pub fn registry(&mut self, registry: ModuleRegistry) {
        self.registry = registry;
    }

    /// Adds a module to load. Modules are loaded in the order they were
    /// added.
    pub fn module(&mut self, module: impl Into<ModuleRef>) {
        self.modules.push(module.into());
    }

    /// Requires every invoked callable with parameters to declare its
    /// dependency list explicitly.
    pub fn strict_di(&mut self, strict_di: bool) {
        self.strict_di = strict_di;
    }

    /// Builds the injector. Every module is loaded and configured through
    /// the provider layer, then the collected run blocks are invoked through
    /// the instance layer.
    pub fn build(self) -> InjectResult<Injector> {
        debug!(
            modules = self.modules.len(),
            strict_di = self.strict_di,
            "building injector"
        );

        let injector = Injector::create(self.strict_di, self.registry);
        let container = injector.container()?;
        let run_blocks = container.load_modules(&self.modules)?;
        injector.get_dyn("$injector")?;
        container.run(run_blocks)?;
        Ok(injector)
    }
}

/// Creates an injector from a registry and a list of modules.
///
/// ```
/// use named_injector::{create_injector, ModuleRegistry};
///
/// let registry = ModuleRegistry::new();
/// let injector = create_injector(&registry, Vec::<String>::new(), true).unwrap();
/// assert!(injector.strict_di());
/// assert!(injector.has("$injector"));
/// ```
pub fn create_injector<I, M>(
    registry: &ModuleRegistry,
    modules: I,
    strict_di: bool,
) -> InjectResult<Injector>
where
    I: IntoIterator<Item = M>,
    M: Into<ModuleRef>,
{
    let mut builder = Injector::builder();
    builder.registry(registry.clone());
    builder.strict_di(strict_di);
    for module in modules {
        builder.module(module);
    }
    builder.build()
}
