pub mod api;
pub mod budget;
pub mod error;
pub mod flatten;
pub mod fold;
pub mod math;
pub mod mesh;
pub mod nesting;
pub mod pattern;

pub use error::{Result, SheetfoldError};
