pub mod common;
pub mod entity;
pub mod field;
pub mod filter;
pub mod value;
pub mod variant;

pub use common::*;
pub use entity::*;
pub use field::*;
pub use filter::*;
pub use value::*;
pub use variant::*;
