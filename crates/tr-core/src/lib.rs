pub mod error;
pub mod mvars;
pub mod tag;
pub mod types;
pub mod value;

pub use error::TagRunError;
pub use tag::*;
pub use types::*;
pub use value::*;
