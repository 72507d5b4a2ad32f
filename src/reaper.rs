//! Waiting for every process of a pipeline.

use crate::command::ExitCode;
use crate::error::ShellError;
use log::{debug, error, info};
use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::Pid;
use std::fmt;

/// How a stage's process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Exited(ExitCode),
    Signaled(Signal),
}

impl StageStatus {
    pub fn success(&self) -> bool {
        matches!(self, StageStatus::Exited(0))
    }

    /// Shell-style status: the exit code, or 128 + signal number.
    pub fn code(&self) -> ExitCode {
        match self {
            StageStatus::Exited(code) => *code,
            StageStatus::Signaled(signal) => 128 + *signal as i32,
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Exited(code) => write!(f, "exited with status {code}"),
            StageStatus::Signaled(signal) => write!(f, "terminated by {}", signal.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageOutcome {
    pub index: usize,
    pub pid: Pid,
    pub status: StageStatus,
}

/// Termination status of every stage of a finished pipeline, by stage index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStatus {
    stages: Vec<StageOutcome>,
}

impl PipelineStatus {
    pub fn stages(&self) -> &[StageOutcome] {
        &self.stages
    }

    pub fn success(&self) -> bool {
        self.stages.iter().all(|s| s.status.success())
    }

    /// Status of the rightmost stage, which is what a shell reports for a pipeline.
    pub fn last_code(&self) -> ExitCode {
        self.stages.last().map_or(0, |s| s.status.code())
    }

    pub fn failures(&self) -> impl Iterator<Item = &StageOutcome> {
        self.stages.iter().filter(|s| !s.status.success())
    }
}

/// Owns the processes spawned for one pipeline until they have terminated.
///
/// Dropping a `Reaper` that still tracks processes blocks until they are gone,
/// so a pipeline abandoned halfway through setup never leaves children behind.
#[derive(Debug, Default)]
pub struct Reaper {
    live: Vec<(usize, Pid)>,
}

impl Reaper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, index: usize, pid: Pid) {
        self.live.push((index, pid));
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Blocks until every tracked process has terminated.
    ///
    /// A failing `waitpid` for one process does not stop the others from
    /// being waited for; the first such failure is returned at the end.
    pub fn wait_all(&mut self) -> Result<PipelineStatus, ShellError> {
        let mut stages = Vec::with_capacity(self.live.len());
        let mut failure = None;

        for (index, pid) in self.live.drain(..) {
            match wait_for(pid) {
                Ok(status) => {
                    if status.success() {
                        debug!("stage {index} (pid {pid}) {status}");
                    } else {
                        info!("stage {index} (pid {pid}) {status}");
                    }
                    stages.push(StageOutcome { index, pid, status });
                }
                Err(err) => {
                    error!("could not reap stage {index} (pid {pid}): {err}");
                    failure.get_or_insert(err);
                }
            }
        }

        stages.sort_by_key(|s| s.index);
        match failure {
            Some(err) => Err(err),
            None => Ok(PipelineStatus { stages }),
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        for (_, pid) in self.live.drain(..) {
            let _ = wait_for(pid);
        }
    }
}

fn wait_for(pid: Pid) -> Result<StageStatus, ShellError> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(StageStatus::Exited(code)),
            Ok(WaitStatus::Signaled(_, signal, _)) => return Ok(StageStatus::Signaled(signal)),
            // stops and continues are not terminations; keep waiting
            Ok(_) | Err(Errno::EINTR) => continue,
            Err(errno) => return Err(ShellError::WaitFailure(errno)),
        }
    }
}
