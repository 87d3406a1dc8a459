//! Name-keyed dependency injection.
//!
//! Services are registered by name and created on demand, the first time
//! they are requested. Each service declares the names of the services it
//! depends on, and the injector resolves those names before invoking it.
//!
//! By default, services held by the `Injector` are not thread-safe. This is
//! because `Rc<T>` is used to hold them, which is not a thread-safe pointer
//! type. This can be changed by disabling default features and enabling the
//! "arc" feature:
//!
//! ```text
//! named_injector = {
//!     version = "*",
//!     default_features = false,
//!     features = ["arc"]
//! }
//! ```
//!
//! With "arc", an injector can be shared between threads. Only one thread
//! resolves through it at a time. A thread requesting a service that another
//! thread is still constructing waits for that construction to finish.
//!
//! # Modules
//!
//! Registrations are grouped into modules declared in a `ModuleRegistry`. A
//! module records its registrations and replays them when an injector loads
//! it, after first loading every module it requires. Each module is loaded at
//! most once per injector.
//!
//! # Providers and instances
//!
//! An injector has two layers. The provider layer holds provider objects,
//! each with a `$get` target that creates one service, along with constants
//! and the `$provide` service used to register more providers. Config blocks
//! run against this layer while modules load. The instance layer holds the
//! services themselves. A service missing from the instance layer is created
//! by invoking the `$get` target of `<name>Provider`, and is cached for every
//! later request.
//!
//! # Dependency lists
//!
//! A callable's dependencies are given explicitly with `Func::inject` or an
//! `Annotated` target. Callables that carry their declaration text can have
//! their dependency list inferred from it instead, unless the injector is in
//! strict mode.
//!
//! # Example
//!
//! ```
//! use named_injector::{dyn_svc, Annotated, Func, Injector, ModuleRegistry, Svc};
//!
//! struct Greeter {
//!     greeting: Svc<String>,
//! }
//!
//! impl Greeter {
//!     fn greet(&self, name: &str) -> String {
//!         format!("{}, {}!", self.greeting, name)
//!     }
//! }
//!
//! let registry = ModuleRegistry::new();
//! registry
//!     .declare("greetings", Vec::<String>::new())
//!     .unwrap()
//!     .value("greeting", dyn_svc(String::from("Hello")))
//!     .service(
//!         "greeter",
//!         Annotated::new(
//!             ["greeting"],
//!             Func::constructor(|args| {
//!                 let greeting = args.get::<String>(0)?;
//!                 Ok(dyn_svc(Greeter { greeting }))
//!             }),
//!         ),
//!     );
//! registry
//!     .declare("app", ["greetings"])
//!     .unwrap()
//!     .decorator(
//!         "greeting",
//!         Annotated::new(
//!             ["$delegate"],
//!             Func::new(|args| {
//!                 let greeting = args.get::<String>(0)?;
//!                 Ok(Some(dyn_svc(greeting.to_uppercase())))
//!             }),
//!         ),
//!     );
//!
//! let mut builder = Injector::builder();
//! builder.registry(registry);
//! builder.module("app");
//! let injector = builder.build().unwrap();
//!
//! let greeter: Svc<Greeter> = injector.get("greeter").unwrap();
//! assert_eq!("HELLO, world!", greeter.greet("world"));
//! ```

#![forbid(unsafe_code)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::needless_pass_by_value
)]

#[cfg(not(any(feature = "arc", feature = "rc")))]
compile_error!(
    "Either the 'arc' or 'rc' feature must be enabled (but not both)."
);

#[cfg(all(feature = "arc", feature = "rc"))]
compile_error!(
    "The 'arc' and 'rc' features are mutually exclusive and cannot be enabled together."
);

mod annotate;
mod injector;
mod module;
mod requests;
mod services;
mod sync;

pub use annotate::annotate;
pub use injector::*;
pub use module::*;
pub use requests::*;
pub use services::*;
