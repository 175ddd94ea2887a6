pub mod error;
pub mod ics;
pub mod parameters;

pub use error::*;
pub use ics::*;
pub use parameters::*;
