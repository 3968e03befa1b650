//! Runtime components for process management

mod executor;
mod process;

pub use executor::*;
pub use process::*;
