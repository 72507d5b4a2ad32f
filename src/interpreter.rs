use crate::builtin::{Builtin, Dispatch, Registry};
use crate::command::ExitCode;
use crate::config::Limits;
use crate::env::Environment;
use crate::error::ShellError;
use crate::executor;
use crate::lexer;
use crate::pipeline::{self, Pipe, Pipeline, Stage};
use crate::reaper::{PipelineStatus, Reaper};
use crate::redirect::StreamGuard;
use log::{debug, error};
use nix::unistd::Pid;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io;

/// What executing one line amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The line was blank.
    Empty,
    /// A builtin ran inside the interpreter process.
    InProcess(ExitCode),
    /// One process per stage ran and every one of them has been reaped.
    Pipeline(PipelineStatus),
}

impl Outcome {
    pub fn code(&self) -> ExitCode {
        match self {
            Outcome::Empty => 0,
            Outcome::InProcess(code) => *code,
            Outcome::Pipeline(status) => status.last_code(),
        }
    }
}

/// A minimal shell that runs pipelines of builtins and external programs.
///
/// The interpreter owns the [`Environment`] builtins work on and the
/// [`Registry`] that decides which names are builtins.
///
/// Example
/// ```
/// use minershell::{Interpreter, Outcome};
/// let mut sh = Interpreter::default();
/// let outcome = sh.execute_line("echo hello | wc -c > /dev/null").unwrap();
/// assert!(matches!(outcome, Outcome::Pipeline(ref status) if status.success()));
/// ```
pub struct Interpreter {
    env: Environment,
    registry: Registry,
    limits: Limits,
}

impl Interpreter {
    pub fn new(registry: Registry, limits: Limits) -> Self {
        Self {
            env: Environment::new(),
            registry,
            limits,
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Set once the `exit` builtin has run in the interpreter process.
    pub fn should_exit(&self) -> bool {
        self.env.should_exit
    }

    pub fn exit_code(&self) -> ExitCode {
        self.env.exit_code
    }

    /// Parses and runs one line, returning once every process it started has
    /// terminated.
    ///
    /// A lone `cd` or `exit` runs right here so its effect outlives the line;
    /// every other command, and every stage of a real pipeline, gets a process
    /// of its own. Errors are planning or spawning failures; failing stages
    /// are reported through [`Outcome::Pipeline`] instead.
    pub fn execute_line(&mut self, line: &str) -> Result<Outcome, ShellError> {
        debug!("command entered: {line:?}");
        let Some(pipeline) = pipeline::plan(line, &self.limits)? else {
            return Ok(Outcome::Empty);
        };

        if pipeline.is_simple() {
            let stage = &pipeline.stages()[0];
            if let Dispatch::InProcess(builtin) = self.registry.dispatch(stage.program()) {
                return run_in_process(builtin, stage, &mut self.env).map(Outcome::InProcess);
            }
        }
        self.run_pipeline(&pipeline).map(Outcome::Pipeline)
    }

    fn run_pipeline(&self, pipeline: &Pipeline) -> Result<PipelineStatus, ShellError> {
        drive_pipeline(pipeline, |stage, pipes| {
            executor::spawn_stage(stage, pipes, &self.registry, &self.env)
        })
    }

    /// Reads lines with rustyline and executes them until `exit`, EOF or Ctrl-C.
    ///
    /// Failures of individual lines are printed and never end the loop.
    pub fn repl(&mut self, prompt: &str) -> rustyline::Result<()> {
        let mut rl = DefaultEditor::new()?;

        while !self.env.should_exit {
            match rl.readline(prompt) {
                Ok(line) => {
                    if !lexer::is_blank(&line) {
                        rl.add_history_entry(line.as_str())?;
                    }
                    if let Err(err) = self.execute_line(&line) {
                        eprintln!("minershell: {err}");
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }
}

impl Default for Interpreter {
    /// Default builtins, no limits.
    fn default() -> Self {
        Self::new(Registry::default(), Limits::default())
    }
}

/// Spawns every stage with `spawn`, then reaps whatever was started.
///
/// A failed spawn stops the remaining stages from starting; the ones already
/// running are still waited for before the error is returned.
fn drive_pipeline<F>(pipeline: &Pipeline, mut spawn: F) -> Result<PipelineStatus, ShellError>
where
    F: FnMut(&Stage, &mut [Option<Pipe>]) -> Result<Pid, ShellError>,
{
    let mut pipes: Vec<Option<Pipe>> = pipeline.open_pipes()?.into_iter().map(Some).collect();
    let mut reaper = Reaper::new();
    let mut spawn_error = None;

    for stage in pipeline.stages() {
        match spawn(stage, &mut pipes) {
            Ok(pid) => {
                debug!("stage {} (pid {pid}): {}", stage.index, stage.argv.join(" "));
                reaper.track(stage.index, pid);
            }
            Err(err) => {
                error!("stage {}: {err}; remaining stages not started", stage.index);
                spawn_error = Some(err);
                break;
            }
        }
        // stage i was the last process to need pipe i - 1
        if let Some(previous) = stage.index.checked_sub(1) {
            pipes[previous] = None;
        }
    }
    // readers only see EOF once the parent's copies are gone too
    drop(pipes);

    let status = reaper.wait_all();
    match spawn_error {
        Some(err) => Err(err),
        None => status,
    }
}

fn run_in_process(
    builtin: &Builtin,
    stage: &Stage,
    env: &mut Environment,
) -> Result<ExitCode, ShellError> {
    let _streams = StreamGuard::apply(&stage.redirects)?;
    let code = builtin.run(
        &stage.argv,
        &mut io::stdin().lock(),
        &mut io::stdout().lock(),
        &mut io::stderr().lock(),
        env,
    );
    Ok(code)
}
