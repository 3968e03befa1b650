//! Launch settings

mod settings;

pub use settings::*;
