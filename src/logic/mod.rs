pub mod bracket;
pub mod deep_equal;
pub mod predicate;
pub mod query;
pub mod transform;
pub mod validate;
pub mod variants;

pub use bracket::*;
pub use deep_equal::*;
pub use predicate::*;
pub use query::*;
pub use transform::*;
pub use validate::*;
pub use variants::*;
