//! Process launch and output supervision

pub mod output;
pub mod pid_file;
pub mod probe;
pub mod process;
pub mod tokenize;

pub use output::*;
pub use pid_file::*;
pub use probe::*;
pub use process::*;
pub use tokenize::*;
