pub mod error;
pub mod id_generator;
pub mod identifier;
pub mod result;

pub use error::*;
pub use id_generator::*;
pub use identifier::*;
pub use result::*;
