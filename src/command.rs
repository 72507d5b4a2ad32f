use crate::env::Environment;
use anyhow::Result;
use argh::FromArgs;
use std::io::{Read, Write};

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// Status of a stage whose program could not be found on `PATH`.
pub const COMMAND_NOT_FOUND: ExitCode = 127;

/// Status of a stage whose program was found but could not be executed.
pub const CANNOT_EXECUTE: ExitCode = 126;

/// Where a builtin is allowed to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Needs the interpreter's own state (working directory, exit request).
    ///
    /// Runs without forking when it is the only stage of a line. Inside a
    /// pipeline it still runs in the stage's child, where its effects are
    /// lost when the child exits.
    InProcess,
    /// Runs in the stage's child process like an external program would.
    Forked,
}

/// Built-in commands known to the shell at compile time.
///
/// Arguments are parsed with [`argh`] (`FromArgs`); `argv[0]` is not part of
/// what the parser sees. Register new builtins with
/// [`Registry::register`](crate::builtin::Registry::register).
pub trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    fn scope() -> Scope {
        Scope::Forked
    }

    /// Executes the command using provided IO streams and environment.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode>;
}
