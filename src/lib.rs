//! A minimal interactive shell that runs pipelines.
//!
//! A line like `cat < in.txt | sort | wc -l > out.txt` is split into stages,
//! every stage gets a process of its own, neighbouring stages are connected by
//! pipes and `<`/`>` redirect a stage's stdin or stdout to a file. The line is
//! done once every one of its processes has been reaped.
//!
//! Commands are either builtins implemented in Rust (see [`builtin`] and the
//! [`command::BuiltinCommand`] trait) or external programs found through
//! `PATH`. `cd` and `exit` change interpreter state, so on their own they run
//! inside the interpreter process instead of a child.
//!
//! The main entry point is [`Interpreter`].

pub mod builtin;
pub mod command;
pub mod config;
pub mod env;
pub mod error;
pub mod executor;
mod external;
pub mod interpreter;
pub mod lexer;
pub mod pipeline;
pub mod reaper;
pub mod redirect;

#[cfg(test)]
mod test_support;

pub use builtin::Registry;
pub use config::{Limits, Options};
pub use error::ShellError;
pub use interpreter::{Interpreter, Outcome};
pub use reaper::{PipelineStatus, StageStatus};
