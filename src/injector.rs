#[allow(clippy::module_inception)]
mod injector;

mod builder;
mod cache;
mod loader;
mod provide;

pub use builder::*;
pub(crate) use cache::*;
pub use injector::*;
pub use loader::*;
pub use provide::*;
