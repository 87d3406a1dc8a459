use crate::{
    downcast_svc, expect_svc, sync::LockEx, Annotated, Container, DynSvc,
    Element, Func, InjectError, InjectResult, Injector, Layer, Provide,
    Recipe, Target,
};
use std::{collections::HashSet, convert::TryFrom};
use tracing::debug;

/// An entry in a list of modules to load.
#[derive(Clone, Debug)]
pub enum ModuleRef {
    /// A module declared in the injector's registry.
    Name(String),
    /// A module callable, invoked through the provider layer when loaded.
    /// If it returns a target, that target becomes a run block.
    Target(Target),
}

impl ModuleRef {
    /// Describes the module in diagnostics.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            ModuleRef::Name(name) => name.clone(),
            ModuleRef::Target(target) => target.signature(),
        }
    }
}

impl From<&str> for ModuleRef {
    fn from(name: &str) -> Self {
        ModuleRef::Name(name.to_owned())
    }
}

impl From<String> for ModuleRef {
    fn from(name: String) -> Self {
        ModuleRef::Name(name)
    }
}

impl From<&String> for ModuleRef {
    fn from(name: &String) -> Self {
        ModuleRef::Name(name.clone())
    }
}

impl From<Target> for ModuleRef {
    fn from(target: Target) -> Self {
        ModuleRef::Target(target)
    }
}

impl From<Func> for ModuleRef {
    fn from(func: Func) -> Self {
        ModuleRef::Target(Target::Func(func))
    }
}

impl From<Annotated> for ModuleRef {
    fn from(annotated: Annotated) -> Self {
        ModuleRef::Target(Target::Annotated(annotated))
    }
}

impl TryFrom<Element> for ModuleRef {
    type Error = InjectError;

    fn try_from(element: Element) -> Result<Self, Self::Error> {
        match element {
            Element::Name(name) => Ok(ModuleRef::Name(name)),
            Element::Func(func) => Ok(ModuleRef::Target(Target::Func(func))),
            list @ Element::List(_) => Target::try_from(list).map(ModuleRef::Target),
            other => Err(InjectError::InvalidModule {
                found: other.describe().to_owned(),
            }),
        }
    }
}

/// The modules an injector has already loaded. Named modules are tracked by
/// name and module callables by identity.
#[derive(Default)]
pub(crate) struct LoadedModules {
    names: HashSet<String>,
    targets: Vec<Target>,
}

impl LoadedModules {
    /// Marks a module as loaded. Returns `false` if it already was.
    pub fn insert(&mut self, module: &ModuleRef) -> bool {
        match module {
            ModuleRef::Name(name) => self.names.insert(name.clone()),
            ModuleRef::Target(target) => {
                if self
                    .targets
                    .iter()
                    .any(|loaded| Target::ptr_eq(loaded, target))
                {
                    return false;
                }
                self.targets.push(target.clone());
                true
            }
        }
    }
}

/// Converts the result of a module callable into a run block.
fn run_block(value: DynSvc) -> InjectResult<Target> {
    let value = match downcast_svc::<Target>(value) {
        Ok(target) => return Ok(Target::clone(&target)),
        Err(value) => value,
    };
    let value = match downcast_svc::<Func>(value) {
        Ok(func) => return Ok(Target::Func(Func::clone(&func))),
        Err(value) => value,
    };
    match downcast_svc::<Annotated>(value) {
        Ok(annotated) => Ok(Target::Annotated(Annotated::clone(&annotated))),
        Err(_) => Err(InjectError::InvalidTarget {
            found: "object".to_owned(),
        }),
    }
}

impl Container {
    /// Loads modules through the provider layer, returning the run blocks
    /// they collected in order.
    pub(crate) fn load_modules(
        &self,
        modules: &[ModuleRef],
    ) -> InjectResult<Vec<Target>> {
        let _loading = self.resolution.enter();
        let mut run_blocks = Vec::new();
        for module in modules {
            if !self.loaded.with_inner_mut(|loaded| loaded.insert(module)) {
                continue;
            }

            self.load_module(module, &mut run_blocks).map_err(|source| {
                InjectError::ModuleInstantiationFailure {
                    module: module.describe(),
                    source: Box::new(source),
                }
            })?;
        }
        Ok(run_blocks)
    }

    fn load_module(
        &self,
        module: &ModuleRef,
        run_blocks: &mut Vec<Target>,
    ) -> InjectResult<()> {
        match module {
            ModuleRef::Name(name) => {
                debug!(module = %name, "loading module");
                let record = self.registry.get(name)?;
                self.modules.with_inner_mut(|modules| {
                    modules.insert(name.clone(), record.clone());
                });

                let requires: Vec<ModuleRef> = record
                    .requires()
                    .iter()
                    .map(ModuleRef::from)
                    .collect();
                run_blocks.extend(self.load_modules(&requires)?);
                run_blocks.extend(record.run_blocks());

                for recipe in record.invoke_queue() {
                    self.replay(&recipe)?;
                }
                for recipe in record.config_blocks() {
                    self.replay(&recipe)?;
                }
            }
            ModuleRef::Target(target) => {
                debug!(module = %target.signature(), "loading module callable");
                let result =
                    self.invoke(Layer::Provider, target, None, None, None)?;
                if let Some(value) = result {
                    run_blocks.push(run_block(value)?);
                }
            }
        }
        Ok(())
    }

    fn replay(&self, recipe: &Recipe) -> InjectResult<()> {
        let name = recipe.target_name();
        let service = self.resolve(Layer::Provider, name, None)?;
        match recipe {
            Recipe::Invoke { target } => {
                let injector = expect_svc::<Injector>(name, service)?;
                injector.invoke(target.clone(), None, None, None).map(drop)
            }
            _ => expect_svc::<Provide>(name, service)?.apply(recipe),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dyn_svc;

    #[test]
    fn elements_convert_to_module_refs() {
        assert!(matches!(
            ModuleRef::try_from(Element::from("app")),
            Ok(ModuleRef::Name(name)) if name == "app"
        ));

        let list = Element::List(vec!["$provide".into(), Func::new(|_| Ok(None)).into()]);
        assert!(matches!(
            ModuleRef::try_from(list),
            Ok(ModuleRef::Target(Target::Annotated(_)))
        ));

        match ModuleRef::try_from(Element::Value(dyn_svc(1i32))) {
            Err(InjectError::InvalidModule { found }) => assert_eq!("object", found),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn loaded_modules_track_names_and_identity() {
        let mut loaded = LoadedModules::default();
        assert!(loaded.insert(&"app".into()));
        assert!(!loaded.insert(&"app".into()));

        let func = Func::new(|_| Ok(None));
        assert!(loaded.insert(&func.clone().into()));
        assert!(!loaded.insert(&func.into()));

        let annotated = Annotated::new(["a"], Func::new(|_| Ok(None)));
        let copy = Annotated::new(["a"], annotated.func().clone());
        assert!(loaded.insert(&annotated.clone().into()));
        assert!(!loaded.insert(&annotated.into()));
        assert!(loaded.insert(&copy.into()));
    }

    #[test]
    fn run_blocks_must_be_callable() {
        assert!(run_block(dyn_svc(Func::new(|_| Ok(None)))).is_ok());
        assert!(run_block(dyn_svc(Target::from(Func::new(|_| Ok(None))))).is_ok());
        assert!(run_block(dyn_svc(1i32)).is_err());
    }
}
