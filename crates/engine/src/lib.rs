pub mod script;
pub mod timeline;

pub use script::*;
pub use timeline::*;
