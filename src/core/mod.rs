pub mod error;
pub mod pair;
pub mod value;

pub use error::{RekeyError, Result};
pub use pair::IdentityPair;
pub use value::{Row, Value, row};
