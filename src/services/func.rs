use crate::{
    annotate, expect_svc, sync::OnceCell, DynSvc, InjectError, InjectResult,
    Service, Svc,
};
use std::fmt::{Debug, Formatter};

/// How a callable is invoked by the injector.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum FuncKind {
    /// An ordinary call. The call context (`this`) is passed through and the
    /// callable may return nothing.
    Factory,

    /// A constructor call. The call context is ignored and the callable
    /// always produces a fresh instance.
    Constructor,
}

/// The body of a [`Func`]. This is implemented automatically for closures
/// with the right signature.
pub trait FuncBody:
    Service + Fn(&Args) -> InjectResult<Option<DynSvc>>
{
}

impl<F> FuncBody for F where
    F: Service + Fn(&Args) -> InjectResult<Option<DynSvc>>
{
}

#[derive(Clone)]
struct FuncInner {
    name: Option<String>,
    declaration: Option<String>,
    kind: FuncKind,
    inject: OnceCell<Svc<[String]>>,
    body: Svc<dyn FuncBody>,
}

/// A shared callable that can be invoked by an injector. Dependencies are
/// supplied positionally through [`Args`] in the order given by the
/// callable's dependency list.
///
/// The dependency list is either declared explicitly with [`Func::inject`],
/// or inferred once from declaration text given with [`Func::declared`].
///
/// ```
/// use named_injector::{annotate, dyn_svc, Func};
///
/// let greet = Func::new(|args| {
///     let name = args.get::<String>(0)?;
///     Ok(Some(dyn_svc(format!("Hello, {name}!"))))
/// })
/// .inject(["name"]);
///
/// let names = annotate(&greet.into(), false, None).unwrap();
/// assert_eq!(["name".to_string()], *names);
/// ```
#[derive(Clone)]
pub struct Func {
    inner: Svc<FuncInner>,
}

impl Func {
    /// Creates a new callable invoked as an ordinary call.
    pub fn new<F>(body: F) -> Self
    where
        F: Service + Fn(&Args) -> InjectResult<Option<DynSvc>>,
    {
        let body: Svc<dyn FuncBody> = Svc::new(body);
        Func {
            inner: Svc::new(FuncInner {
                name: None,
                declaration: None,
                kind: FuncKind::Factory,
                inject: OnceCell::new(),
                body,
            }),
        }
    }

    /// Creates a new callable invoked as a constructor. Constructors always
    /// produce an instance.
    pub fn constructor<F>(body: F) -> Self
    where
        F: Service + Fn(&Args) -> InjectResult<DynSvc>,
    {
        Func::new(move |args: &Args| body(args).map(Some))
            .with(|inner| inner.kind = FuncKind::Constructor)
    }

    /// Creates a callable with no dependencies that always returns the same
    /// value.
    pub fn value(value: DynSvc) -> Self {
        Func::new(move |_: &Args| Ok(Some(value.clone())))
    }

    /// Sets the explicit dependency list of this callable. An explicit list
    /// always takes precedence over inference.
    #[must_use]
    pub fn inject<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        self.with(move |inner| inner.inject = OnceCell::from(Svc::from(names)))
    }

    /// Attaches the declaration text of this callable, for example
    /// `"function (a, b) { ... }"` or `"(a, b) => ..."`. The parameter names
    /// are used to infer the dependency list when none is given explicitly,
    /// and declarations beginning with `class` mark the callable as a
    /// constructor.
    #[must_use]
    pub fn declared(self, declaration: impl Into<String>) -> Self {
        let declaration = declaration.into();
        let constructor = annotate::is_class(&declaration);
        self.with(move |inner| {
            if constructor {
                inner.kind = FuncKind::Constructor;
            }
            inner.declaration = Some(declaration);
        })
    }

    /// Names this callable. The name is used in diagnostics.
    #[must_use]
    pub fn named(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.with(move |inner| inner.name = Some(name))
    }

    fn with(self, f: impl FnOnce(&mut FuncInner)) -> Self {
        let mut inner = FuncInner::clone(&self.inner);
        f(&mut inner);
        Func {
            inner: Svc::new(inner),
        }
    }

    /// The name of this callable, if it has one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// The declaration text of this callable, if it has one.
    #[must_use]
    pub fn declaration(&self) -> Option<&str> {
        self.inner.declaration.as_deref()
    }

    /// How this callable is invoked.
    #[must_use]
    pub fn kind(&self) -> FuncKind {
        self.inner.kind
    }

    /// The number of formal parameters in the declaration text.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.declaration().map_or(0, annotate::count_params)
    }

    /// Renders this callable for diagnostics, for example
    /// `function myModule(xyzzy)`.
    #[must_use]
    pub fn signature(&self) -> String {
        let params = match self.declaration() {
            Some(declaration) => annotate::params_text(declaration),
            None => self
                .inner
                .inject
                .get()
                .map(|names| names.join(", "))
                .unwrap_or_default(),
        };
        match self.name() {
            Some(name) => format!("function {name}({params})"),
            None => format!("function({params})"),
        }
    }

    /// Returns `true` if both handles refer to the same callable.
    #[must_use]
    pub fn ptr_eq(a: &Func, b: &Func) -> bool {
        Svc::ptr_eq(&a.inner, &b.inner)
    }

    pub(crate) fn inject_cell(&self) -> &OnceCell<Svc<[String]>> {
        &self.inner.inject
    }

    pub(crate) fn call(&self, args: &Args) -> InjectResult<Option<DynSvc>> {
        (self.inner.body)(args)
    }

    pub(crate) fn construct(&self, args: &Args) -> InjectResult<DynSvc> {
        self.call(args)?
            .ok_or_else(|| InjectError::NotConstructible {
                name: self.name().map_or_else(|| self.signature(), str::to_owned),
            })
    }
}

impl Debug for Func {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Func")
            .field("name", &self.inner.name)
            .field("kind", &self.inner.kind)
            .field("inject", &self.inner.inject.get())
            .finish()
    }
}

/// The arguments passed to a [`Func`] when it is invoked.
pub struct Args {
    names: Svc<[String]>,
    values: Vec<Option<DynSvc>>,
    this: Option<DynSvc>,
}

impl Args {
    pub(crate) fn new(
        names: Svc<[String]>,
        values: Vec<Option<DynSvc>>,
        this: Option<DynSvc>,
    ) -> Self {
        Args {
            names,
            values,
            this,
        }
    }

    /// The call context, if the callable was invoked with one.
    #[must_use]
    pub fn this(&self) -> Option<&DynSvc> {
        self.this.as_ref()
    }

    /// Downcasts the call context.
    pub fn this_as<T: Service>(&self) -> InjectResult<Svc<T>> {
        expect_svc("this", self.this.clone())
    }

    /// The dependency names the arguments were resolved for.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// The number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no arguments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Gets an argument without downcasting it. Returns `None` if the
    /// argument is undefined or out of range.
    #[must_use]
    pub fn raw(&self, index: usize) -> Option<&DynSvc> {
        self.values.get(index).and_then(Option::as_ref)
    }

    /// Gets an argument as a pointer to a concrete type.
    pub fn get<T: Service>(&self, index: usize) -> InjectResult<Svc<T>> {
        let name = self
            .names
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("argument {index}"));
        expect_svc(&name, self.values.get(index).cloned().flatten())
    }
}

impl Debug for Args {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Args")
            .field("names", &self.names)
            .field("len", &self.values.len())
            .field("has_this", &self.this.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dyn_svc;

    #[test]
    fn declared_class_is_a_constructor() {
        let func = Func::new(|_| Ok(None)).declared("class Test {}");
        assert_eq!(FuncKind::Constructor, func.kind());

        let func = Func::new(|_| Ok(None)).declared("function Test() {}");
        assert_eq!(FuncKind::Factory, func.kind());
    }

    #[test]
    fn arity_counts_declared_parameters() {
        let func = Func::new(|_| Ok(None)).declared("function (a, b, c) {}");
        assert_eq!(3, func.arity());

        let func = Func::new(|_| Ok(None));
        assert_eq!(0, func.arity());
    }

    #[test]
    fn signature_renders_name_and_parameters() {
        let func = Func::new(|_| Ok(None))
            .named("myModule")
            .declared("function myModule(xyzzy) {}");
        assert_eq!("function myModule(xyzzy)", func.signature());

        let func = Func::new(|_| Ok(None)).inject(["a", "b"]);
        assert_eq!("function(a, b)", func.signature());
    }

    #[test]
    fn construct_requires_an_instance() {
        let func = Func::new(|_| Ok(None)).named("Empty");
        let args = Args::new(Svc::from(Vec::new()), Vec::new(), None);
        match func.construct(&args) {
            Err(InjectError::NotConstructible { name }) if name == "Empty" => {}
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn args_are_downcast_by_position() {
        let names: Svc<[String]> = Svc::from(vec!["a".to_string()]);
        let args = Args::new(names, vec![Some(dyn_svc(3i32))], None);
        assert_eq!(3, *args.get::<i32>(0).unwrap());
        assert!(args.get::<String>(0).is_err());
        assert!(args.get::<i32>(1).is_err());
        assert!(args.this().is_none());
    }
}
