pub mod errors;
pub mod result;
pub mod value;

pub use errors::*;
pub use result::*;
pub use value::*;
