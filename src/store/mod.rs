pub mod collection;
pub mod events;
pub mod memory;
pub mod rest;
pub mod traits;

pub use collection::*;
pub use events::*;
pub use memory::*;
pub use rest::*;
pub use traits::*;
