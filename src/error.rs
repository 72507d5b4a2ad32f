use nix::errno::Errno;
use std::error;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Everything that can go wrong while planning, spawning or reaping a pipeline.
///
/// Planning errors (`TokenTooLong`, `EmptyPipelineStage`, `PipelineTooLong`,
/// `MissingRedirectionTarget`, `PipeFailure`) abort the whole line before any
/// process exists. `RedirectionOpen` and `ExecFailure` normally surface inside
/// a forked stage, which reports them on its own stderr and exits non-zero.
#[derive(Debug)]
pub enum ShellError {
    /// A token exceeded the configured maximum length.
    TokenTooLong { len: usize, max: usize },
    /// A `|`-separated segment had nothing to execute (e.g. `ls | | wc`).
    EmptyPipelineStage { index: usize },
    /// The line has more stages than the configured cap.
    PipelineTooLong { stages: usize, max: usize },
    /// `<` or `>` was the last token of its stage.
    MissingRedirectionTarget { operator: String },
    /// A redirection target could not be opened or installed.
    RedirectionOpen { path: PathBuf, source: io::Error },
    /// The OS refused to create a pipe.
    PipeFailure(Errno),
    /// The OS refused to create a process.
    SpawnFailure(Errno),
    /// Replacing the process image failed.
    ExecFailure { program: String, source: Errno },
    /// Waiting for a stage failed.
    WaitFailure(Errno),
}

impl fmt::Display for ShellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShellError::TokenTooLong { len, max } => {
                write!(f, "token of {len} bytes exceeds the limit of {max}")
            }
            ShellError::EmptyPipelineStage { index } => {
                write!(f, "syntax error: pipeline stage {} is empty", index + 1)
            }
            ShellError::PipelineTooLong { stages, max } => {
                write!(f, "pipeline has {stages} stages, at most {max} allowed")
            }
            ShellError::MissingRedirectionTarget { operator } => {
                write!(f, "syntax error: missing file name after `{operator}`")
            }
            ShellError::RedirectionOpen { path, source } => {
                write!(f, "{}: {}", path.display(), source)
            }
            ShellError::PipeFailure(errno) => write!(f, "pipe: {}", errno.desc()),
            ShellError::SpawnFailure(errno) => write!(f, "fork: {}", errno.desc()),
            ShellError::ExecFailure { program, source } => {
                write!(f, "{}: {}", program, source.desc())
            }
            ShellError::WaitFailure(errno) => write!(f, "wait: {}", errno.desc()),
        }
    }
}

impl error::Error for ShellError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            ShellError::RedirectionOpen { source, .. } => Some(source),
            ShellError::ExecFailure { source, .. } => Some(source),
            ShellError::PipeFailure(errno)
            | ShellError::SpawnFailure(errno)
            | ShellError::WaitFailure(errno) => Some(errno),
            _ => None,
        }
    }
}
