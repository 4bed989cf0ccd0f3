pub mod debugger;
pub mod error;
pub mod executor;
pub mod notify;
pub mod parser;

pub use error::{DebugError, Error, ParseError, RuntimeError};
