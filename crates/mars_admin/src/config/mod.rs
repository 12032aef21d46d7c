//! Launcher configuration: environment file, config values, resolved paths

mod env_file;
mod launcher;
mod values;

pub use env_file::*;
pub use launcher::*;
pub use values::*;
