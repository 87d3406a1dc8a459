mod func;
mod providers;
mod service;
mod target;

pub use func::*;
pub use providers::*;
pub use service::*;
pub use target::*;
