mod locals;
mod path;

pub use locals::*;
pub(crate) use path::*;
