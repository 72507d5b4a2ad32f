//! Creating the process for one stage and running its command inside it.
//!
//! Inside the child, in this order:
//! 1. pipe wiring: stdin from the previous pipe, stdout into the stage's own pipe;
//! 2. file redirection, which replaces the pipe wiring for the same stream;
//! 3. every pipe descriptor of the pipeline is closed;
//! 4. dispatch: run a builtin and exit, or replace the image with the program.
//!
//! The child never returns into interpreter code: it always leaves through
//! `_exit`, with 127 when the program does not exist and 126 when it could
//! not be executed.

use crate::builtin::{Dispatch, Registry};
use crate::command::{CANNOT_EXECUTE, COMMAND_NOT_FOUND, ExitCode};
use crate::env::Environment;
use crate::error::ShellError;
use crate::external::find_command_path;
use crate::pipeline::{Pipe, Stage};
use nix::errno::Errno;
use nix::libc::{STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};
use nix::sys::signal::{SigHandler, Signal, signal};
use nix::unistd::{ForkResult, Pid, dup2, execve, fork};
use std::convert::Infallible;
use std::ffi::{CString, NulError, OsStr};
use std::fs::File;
use std::io::{self, Write};
use std::mem::ManuallyDrop;
use std::os::fd::{AsRawFd, FromRawFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Status of a stage whose redirections could not be set up.
pub const REDIRECTION_FAILED: ExitCode = 1;

/// Forks the process for `stage`.
///
/// `pipes` are all pipes of the pipeline still open in the parent; the child
/// closes its copies of every one of them. The parent's descriptors are left
/// alone, closing them is the caller's job. Only a failed `fork` is reported
/// back; everything that goes wrong later happens in the child and shows up
/// as its exit status.
pub fn spawn_stage(
    stage: &Stage,
    pipes: &mut [Option<Pipe>],
    registry: &Registry,
    env: &Environment,
) -> Result<Pid, ShellError> {
    // anything still buffered would otherwise be flushed by parent and child alike
    let _ = io::stdout().flush();

    // SAFETY: the child only uses memory it owns and always leaves through `_exit`.
    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => Ok(child),
        Ok(ForkResult::Child) => {
            let code = run_stage(stage, pipes, registry, env.clone());
            child_exit(code)
        }
        Err(errno) => Err(ShellError::SpawnFailure(errno)),
    }
}

/// Ends a forked child without running exit handlers or flushing buffers
/// inherited from the interpreter.
pub(crate) fn child_exit(code: ExitCode) -> ! {
    // SAFETY: `_exit` only terminates the calling process.
    unsafe { nix::libc::_exit(code) }
}

fn run_stage(
    stage: &Stage,
    pipes: &mut [Option<Pipe>],
    registry: &Registry,
    mut env: Environment,
) -> ExitCode {
    // the interpreter ignores SIGPIPE; a stage writing into a closed pipe must not
    // SAFETY: restoring the default disposition installs no handler code.
    let _ = unsafe { signal(Signal::SIGPIPE, SigHandler::SigDfl) };

    let mut stderr = raw_stream(STDERR_FILENO);
    if let Err(err) = wire_streams(stage, pipes) {
        let _ = writeln!(stderr, "minershell: {err}");
        return REDIRECTION_FAILED;
    }

    match registry.dispatch(stage.program()) {
        Dispatch::InProcess(builtin) | Dispatch::Forked(builtin) => {
            let mut stdin = raw_stream(STDIN_FILENO);
            let mut stdout = raw_stream(STDOUT_FILENO);
            builtin.run(&stage.argv, &mut *stdin, &mut *stdout, &mut *stderr, &mut env)
        }
        Dispatch::External => exec_external(&stage.argv, &env, &mut stderr),
    }
}

fn wire_streams(stage: &Stage, pipes: &mut [Option<Pipe>]) -> Result<(), ShellError> {
    let connected = connect_pipes(stage, pipes);
    for pipe in pipes.iter_mut() {
        pipe.take();
    }
    connected?;
    stage.redirects.apply()
}

fn connect_pipes(stage: &Stage, pipes: &[Option<Pipe>]) -> Result<(), ShellError> {
    if !stage.is_first {
        if let Some(pipe) = pipes.get(stage.index - 1).and_then(Option::as_ref) {
            dup2(pipe.read_end().as_raw_fd(), STDIN_FILENO).map_err(ShellError::PipeFailure)?;
        }
    }
    if !stage.is_last {
        if let Some(pipe) = pipes.get(stage.index).and_then(Option::as_ref) {
            dup2(pipe.write_end().as_raw_fd(), STDOUT_FILENO).map_err(ShellError::PipeFailure)?;
        }
    }
    Ok(())
}

/// A `File` over an inherited standard stream that is never closed by us.
///
/// std's `Stdout`/`Stderr` sit behind locks another thread may have held at
/// the moment of the fork, so the child writes to the descriptors directly.
fn raw_stream(fd: RawFd) -> ManuallyDrop<File> {
    // SAFETY: ManuallyDrop keeps the File from closing a descriptor it does not own.
    ManuallyDrop::new(unsafe { File::from_raw_fd(fd) })
}

fn exec_external(argv: &[String], env: &Environment, stderr: &mut File) -> ExitCode {
    let name = &argv[0];
    let search_paths = env.get_var("PATH").unwrap_or_default();
    let Some(program) = find_command_path(OsStr::new(&search_paths), Path::new(name)) else {
        let _ = writeln!(stderr, "minershell: {name}: command not found");
        return COMMAND_NOT_FOUND;
    };

    match replace_image(&program, argv, env) {
        Ok(never) => match never {},
        Err(err) => {
            let _ = writeln!(stderr, "minershell: {err}");
            CANNOT_EXECUTE
        }
    }
}

fn replace_image(program: &Path, argv: &[String], env: &Environment) -> Result<Infallible, ShellError> {
    let exec_failure = |source: Errno| ShellError::ExecFailure {
        program: argv[0].clone(),
        source,
    };
    let nul_byte = |_: NulError| exec_failure(Errno::EINVAL);

    let path = CString::new(program.as_os_str().as_bytes()).map_err(nul_byte)?;
    let args = argv
        .iter()
        .map(|arg| CString::new(arg.as_bytes()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(nul_byte)?;
    let envp = env
        .to_envp()
        .into_iter()
        .map(CString::new)
        .collect::<Result<Vec<_>, _>>()
        .map_err(nul_byte)?;

    execve(&path, &args, &envp).map_err(exec_failure)
}
