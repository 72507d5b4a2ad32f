//! File redirection for a single stage.
//!
//! A stage supports one redirection: the first `<` or `>` token ends the
//! argument list, the token after it names the file, and anything after the
//! file name is dropped with a warning. `sort < in > out` therefore only reads
//! from `in`; chaining several redirections is not supported.

use crate::error::ShellError;
use log::warn;
use nix::fcntl::{FcntlArg, fcntl};
use nix::libc::{STDIN_FILENO, STDOUT_FILENO};
use nix::unistd::dup2;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

const INPUT_OPERATOR: &str = "<";
const OUTPUT_OPERATOR: &str = ">";

/// Permission bits for files created by `>` (before umask).
pub const OUTPUT_MODE: u32 = 0o644;

/// Files a stage's standard input and output are redirected to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectionPlan {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

/// A stage's tokens after redirection operators were peeled off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStage {
    pub argv: Vec<String>,
    pub plan: RedirectionPlan,
}

/// Scans `tokens` left to right for the first `<` or `>` and splits the stage
/// into the argument vector before it and a redirection plan.
pub fn resolve(mut tokens: Vec<String>) -> Result<ResolvedStage, ShellError> {
    let Some(position) = tokens
        .iter()
        .position(|t| t == INPUT_OPERATOR || t == OUTPUT_OPERATOR)
    else {
        return Ok(ResolvedStage {
            argv: tokens,
            plan: RedirectionPlan::default(),
        });
    };

    let mut tail = tokens.split_off(position).into_iter();
    let operator = tail.next().unwrap_or_default();
    let target = tail
        .next()
        .ok_or_else(|| ShellError::MissingRedirectionTarget {
            operator: operator.clone(),
        })?;

    let ignored: Vec<String> = tail.collect();
    if !ignored.is_empty() {
        warn!(
            "only one redirection per stage is supported; ignoring `{}` after `{} {}`",
            ignored.join(" "),
            operator,
            target
        );
    }

    let mut plan = RedirectionPlan::default();
    if operator == INPUT_OPERATOR {
        plan.input = Some(PathBuf::from(target));
    } else {
        plan.output = Some(PathBuf::from(target));
    }
    Ok(ResolvedStage { argv: tokens, plan })
}

impl RedirectionPlan {
    pub fn is_empty(&self) -> bool {
        self.input.is_none() && self.output.is_none()
    }

    /// Opens the input file for reading, if there is one.
    pub fn open_input(&self) -> Result<Option<File>, ShellError> {
        self.input
            .as_deref()
            .map(|path| File::open(path).map_err(|source| open_error(path, source)))
            .transpose()
    }

    /// Opens the output file for writing, creating or truncating it.
    pub fn open_output(&self) -> Result<Option<File>, ShellError> {
        self.output
            .as_deref()
            .map(|path| {
                OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .mode(OUTPUT_MODE)
                    .open(path)
                    .map_err(|source| open_error(path, source))
            })
            .transpose()
    }

    /// Points this process's stdin/stdout at the planned files.
    ///
    /// Meant for a freshly forked stage: whatever the streams referred to
    /// before (terminal or pipe ends) is replaced, so file redirection always
    /// wins over pipe wiring. Both files are opened before either stream is
    /// touched.
    pub fn apply(&self) -> Result<(), ShellError> {
        let input = self.open_input()?;
        let output = self.open_output()?;
        if let (Some(file), Some(path)) = (input, self.input.as_deref()) {
            install(&file, STDIN_FILENO, path)?;
        }
        if let (Some(file), Some(path)) = (output, self.output.as_deref()) {
            install(&file, STDOUT_FILENO, path)?;
        }
        Ok(())
    }
}

fn open_error(path: &Path, source: io::Error) -> ShellError {
    ShellError::RedirectionOpen {
        path: path.to_path_buf(),
        source,
    }
}

fn install(file: &File, target: RawFd, path: &Path) -> Result<(), ShellError> {
    dup2(file.as_raw_fd(), target)
        .map(drop)
        .map_err(|errno| open_error(path, errno.into()))
}

/// Applies a redirection plan to the interpreter's own process and undoes it
/// when dropped.
///
/// Only builtins that must not be forked (`cd`, `exit`) need this; every other
/// stage gets redirected inside its own child.
#[derive(Debug)]
pub struct StreamGuard {
    saved_stdin: Option<OwnedFd>,
    saved_stdout: Option<OwnedFd>,
}

impl StreamGuard {
    pub fn apply(plan: &RedirectionPlan) -> Result<Self, ShellError> {
        let input = plan.open_input()?;
        let output = plan.open_output()?;
        let mut guard = StreamGuard {
            saved_stdin: None,
            saved_stdout: None,
        };

        if let (Some(file), Some(path)) = (input, plan.input.as_deref()) {
            guard.saved_stdin = Some(save(STDIN_FILENO, path)?);
            install(&file, STDIN_FILENO, path)?;
        }
        if let (Some(file), Some(path)) = (output, plan.output.as_deref()) {
            let _ = io::stdout().flush();
            guard.saved_stdout = Some(save(STDOUT_FILENO, path)?);
            install(&file, STDOUT_FILENO, path)?;
        }
        Ok(guard)
    }
}

fn save(fd: RawFd, path: &Path) -> Result<OwnedFd, ShellError> {
    let copy = fcntl(fd, FcntlArg::F_DUPFD_CLOEXEC(0)).map_err(|errno| open_error(path, errno.into()))?;
    // SAFETY: F_DUPFD_CLOEXEC returned a fresh descriptor nobody else owns.
    Ok(unsafe { OwnedFd::from_raw_fd(copy) })
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if let Some(saved) = self.saved_stdout.take() {
            let _ = io::stdout().flush();
            let _ = dup2(saved.as_raw_fd(), STDOUT_FILENO);
        }
        if let Some(saved) = self.saved_stdin.take() {
            let _ = dup2(saved.as_raw_fd(), STDIN_FILENO);
        }
    }
}
