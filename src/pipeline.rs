//! Turning a raw line into an ordered list of stages and the pipes between them.

use crate::config::Limits;
use crate::error::ShellError;
use crate::lexer;
use crate::redirect::{self, RedirectionPlan, ResolvedStage};
use nix::fcntl::OFlag;
use nix::unistd::pipe2;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

const STAGE_SEPARATOR: char = '|';

/// One `|`-separated command of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    /// Program or builtin name followed by its arguments; never empty.
    pub argv: Vec<String>,
    pub redirects: RedirectionPlan,
    /// Zero-based position in the pipeline.
    pub index: usize,
    pub is_first: bool,
    pub is_last: bool,
}

impl Stage {
    pub fn program(&self) -> &str {
        &self.argv[0]
    }
}

/// The stages of one input line, in execution order. Always at least one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// A single stage with no pipes around it.
    pub fn is_simple(&self) -> bool {
        self.stages.len() == 1
    }

    /// Allocates every pipe the pipeline needs, `len() - 1` of them, before
    /// any stage is spawned. Pipe `i` connects stage `i` to stage `i + 1`.
    pub fn open_pipes(&self) -> Result<Vec<Pipe>, ShellError> {
        (1..self.stages.len()).map(|_| Pipe::new()).collect()
    }
}

/// Both ends of an OS pipe. Each end closes itself when dropped.
///
/// The descriptors are close-on-exec, so only the copies explicitly moved
/// onto a stage's stdin/stdout survive into an external program.
#[derive(Debug)]
pub struct Pipe {
    read: OwnedFd,
    write: OwnedFd,
}

impl Pipe {
    pub fn new() -> Result<Self, ShellError> {
        let (read, write) = pipe2(OFlag::O_CLOEXEC).map_err(ShellError::PipeFailure)?;
        Ok(Pipe { read, write })
    }

    pub fn read_end(&self) -> BorrowedFd<'_> {
        self.read.as_fd()
    }

    pub fn write_end(&self) -> BorrowedFd<'_> {
        self.write.as_fd()
    }
}

/// Parses `line` into a pipeline.
///
/// Returns `Ok(None)` for a blank line. Every segment between `|` characters
/// must name a command; `ls | | wc`, `| wc` and `ls |` are syntax errors.
pub fn plan(line: &str, limits: &Limits) -> Result<Option<Pipeline>, ShellError> {
    if lexer::is_blank(line) {
        return Ok(None);
    }

    let segments: Vec<&str> = line
        .split(STAGE_SEPARATOR)
        .map(|segment| segment.trim_matches(lexer::is_delimiter))
        .collect();
    if let Some(max) = limits.max_stages {
        if segments.len() > max {
            return Err(ShellError::PipelineTooLong {
                stages: segments.len(),
                max,
            });
        }
    }

    let last = segments.len() - 1;
    let mut stages = Vec::with_capacity(segments.len());
    for (index, segment) in segments.into_iter().enumerate() {
        let tokens = lexer::tokenize(segment, limits)?;
        if tokens.is_empty() {
            return Err(ShellError::EmptyPipelineStage { index });
        }
        let ResolvedStage { argv, plan } = redirect::resolve(tokens)?;
        // `< in.txt` alone has a file but no command
        if argv.is_empty() {
            return Err(ShellError::EmptyPipelineStage { index });
        }
        stages.push(Stage {
            argv,
            redirects: plan,
            index,
            is_first: index == 0,
            is_last: index == last,
        });
    }
    Ok(Some(Pipeline { stages }))
}
