use crate::{DynSvc, Func, InjectError, Svc};
use std::{
    convert::TryFrom,
    fmt::{Debug, Formatter},
};

/// A callable paired with an inline dependency list, the equivalent of
/// `['a', 'b', fn]`.
#[derive(Clone)]
pub struct Annotated {
    inject: Svc<[String]>,
    func: Func,
}

impl Annotated {
    /// Pairs a callable with its dependency list.
    pub fn new<I, S>(names: I, func: Func) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        Annotated {
            inject: names.into(),
            func,
        }
    }

    /// The inline dependency list.
    #[must_use]
    pub fn inject(&self) -> &Svc<[String]> {
        &self.inject
    }

    /// The callable.
    #[must_use]
    pub fn func(&self) -> &Func {
        &self.func
    }
}

impl Debug for Annotated {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.inject.iter())
            .entry(&self.func)
            .finish()
    }
}

/// Anything the injector can invoke.
#[derive(Clone, Debug)]
pub enum Target {
    /// A bare callable. Its dependency list is explicit or inferred.
    Func(Func),
    /// A callable with an inline dependency list.
    Annotated(Annotated),
}

impl Target {
    /// The callable that will be invoked.
    #[must_use]
    pub fn func(&self) -> &Func {
        match self {
            Target::Func(func) => func,
            Target::Annotated(annotated) => annotated.func(),
        }
    }

    /// Renders the target for diagnostics.
    #[must_use]
    pub fn signature(&self) -> String {
        self.func().signature()
    }

    /// Returns `true` if both targets are the same registration. Annotated
    /// targets are identified by their dependency list.
    #[must_use]
    pub fn ptr_eq(a: &Target, b: &Target) -> bool {
        match (a, b) {
            (Target::Func(a), Target::Func(b)) => Func::ptr_eq(a, b),
            (Target::Annotated(a), Target::Annotated(b)) => {
                Svc::ptr_eq(&a.inject, &b.inject)
            }
            _ => false,
        }
    }
}

impl From<Func> for Target {
    fn from(func: Func) -> Self {
        Target::Func(func)
    }
}

impl From<Annotated> for Target {
    fn from(annotated: Annotated) -> Self {
        Target::Annotated(annotated)
    }
}

/// An untyped value as it may appear in a dependency list or a module list.
/// Converting an element into a [`Target`] validates its shape.
#[derive(Clone)]
pub enum Element {
    /// A service or module name.
    Name(String),
    /// A callable.
    Func(Func),
    /// A list, usually names followed by a callable.
    List(Vec<Element>),
    /// Any other value.
    Value(DynSvc),
}

impl Element {
    /// Describes the kind of this element for diagnostics.
    #[must_use]
    pub fn describe(&self) -> &'static str {
        match self {
            Element::Name(_) => "string",
            Element::Func(_) => "function",
            Element::List(_) => "array",
            Element::Value(_) => "object",
        }
    }
}

impl Debug for Element {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Element::Name(name) => Debug::fmt(name, f),
            Element::Func(func) => Debug::fmt(func, f),
            Element::List(list) => f.debug_list().entries(list).finish(),
            Element::Value(_) => f.write_str("[object]"),
        }
    }
}

impl From<&str> for Element {
    fn from(name: &str) -> Self {
        Element::Name(name.to_owned())
    }
}

impl From<String> for Element {
    fn from(name: String) -> Self {
        Element::Name(name)
    }
}

impl From<Func> for Element {
    fn from(func: Func) -> Self {
        Element::Func(func)
    }
}

impl From<Vec<Element>> for Element {
    fn from(list: Vec<Element>) -> Self {
        Element::List(list)
    }
}

impl From<Target> for Element {
    fn from(target: Target) -> Self {
        match target {
            Target::Func(func) => Element::Func(func),
            Target::Annotated(annotated) => {
                let mut list: Vec<Element> = annotated
                    .inject
                    .iter()
                    .cloned()
                    .map(Element::Name)
                    .collect();
                list.push(Element::Func(annotated.func));
                Element::List(list)
            }
        }
    }
}

impl TryFrom<Element> for Target {
    type Error = InjectError;

    fn try_from(element: Element) -> Result<Self, Self::Error> {
        match element {
            Element::Func(func) => Ok(Target::Func(func)),
            Element::List(mut list) => {
                let func = match list.pop() {
                    Some(Element::Func(func)) => func,
                    Some(other) => {
                        return Err(InjectError::InvalidTarget {
                            found: other.describe().to_owned(),
                        })
                    }
                    None => {
                        return Err(InjectError::InvalidTarget {
                            found: "undefined".to_owned(),
                        })
                    }
                };

                let names = list
                    .into_iter()
                    .map(|entry| match entry {
                        Element::Name(name) => Ok(name),
                        other => Err(InjectError::IncorrectInjectionToken {
                            token: other.describe().to_owned(),
                        }),
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(Target::Annotated(Annotated::new(names, func)))
            }
            other => Err(InjectError::InvalidTarget {
                found: other.describe().to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dyn_svc;

    fn noop() -> Func {
        Func::new(|_| Ok(None))
    }

    #[test]
    fn list_with_trailing_callable_is_annotated() {
        let element = Element::List(vec!["a".into(), "b".into(), noop().into()]);
        match Target::try_from(element) {
            Ok(Target::Annotated(annotated)) => {
                assert_eq!(["a".to_string(), "b".to_string()], **annotated.inject());
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn non_callable_is_rejected() {
        let error = Target::try_from(Element::from("a")).unwrap_err();
        assert_eq!(
            "argument 'fn' is not a function, got string",
            error.to_string()
        );

        let error = Target::try_from(Element::List(vec![
            "a".into(),
            Element::Value(dyn_svc(1i32)),
        ]))
        .unwrap_err();
        assert_eq!(
            "argument 'fn' is not a function, got object",
            error.to_string()
        );
    }

    #[test]
    fn non_name_token_is_rejected() {
        let element =
            Element::List(vec![Element::Value(dyn_svc(1i32)), noop().into()]);
        match Target::try_from(element) {
            Err(InjectError::IncorrectInjectionToken { token }) => {
                assert_eq!("object", token);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn annotated_identity_follows_the_dependency_list() {
        let annotated = Target::from(Annotated::new(["a"], noop()));
        let same = annotated.clone();
        let other = Target::from(Annotated::new(["a"], annotated.func().clone()));
        assert!(Target::ptr_eq(&annotated, &same));
        assert!(!Target::ptr_eq(&annotated, &other));
    }
}
