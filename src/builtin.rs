use crate::command::{BuiltinCommand, ExitCode, Scope};
use crate::env::Environment;
use anyhow::{Context, Result};
use argh::{EarlyExit, FromArgs};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

type Handler = fn(&[String], &mut dyn Read, &mut dyn Write, &mut dyn Write, &mut Environment) -> ExitCode;

/// A registered builtin: its name, where it may run, and how to run it.
#[derive(Clone, Copy)]
pub struct Builtin {
    name: &'static str,
    scope: Scope,
    handler: Handler,
}

impl std::fmt::Debug for Builtin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builtin")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .finish()
    }
}

impl Builtin {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Parses `argv[1..]` and executes the command.
    ///
    /// Usage and runtime errors are written to `stderr` and turned into
    /// exit code 1. `stdout` is flushed before returning.
    pub fn run(
        &self,
        argv: &[String],
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> ExitCode {
        let code = (self.handler)(argv, stdin, stdout, stderr, env);
        let _ = stdout.flush();
        code
    }
}

/// How a command name is going to be executed.
#[derive(Debug, Clone, Copy)]
pub enum Dispatch<'a> {
    InProcess(&'a Builtin),
    Forked(&'a Builtin),
    /// Not a builtin: replace the stage's process image with a program from `PATH`.
    External,
}

/// Mapping from command name to builtin.
///
/// Names that are not registered are executed as external programs, so
/// commands such as `ls`, `cat`, `ps`, `wc` and `sort` need no entry here.
#[derive(Debug, Clone)]
pub struct Registry {
    builtins: HashMap<&'static str, Builtin>,
}

impl Registry {
    /// A registry without any builtins; everything runs as an external program.
    pub fn empty() -> Self {
        Self {
            builtins: HashMap::new(),
        }
    }

    /// Adds `T`, replacing any builtin previously registered under the same name.
    pub fn register<T: BuiltinCommand>(&mut self) -> &mut Self {
        self.builtins.insert(
            T::name(),
            Builtin {
                name: T::name(),
                scope: T::scope(),
                handler: run_parsed::<T>,
            },
        );
        self
    }

    pub fn get(&self, name: &str) -> Option<&Builtin> {
        self.builtins.get(name)
    }

    pub fn dispatch(&self, name: &str) -> Dispatch<'_> {
        match self.builtins.get(name) {
            Some(builtin) if builtin.scope == Scope::InProcess => Dispatch::InProcess(builtin),
            Some(builtin) => Dispatch::Forked(builtin),
            None => Dispatch::External,
        }
    }
}

impl Default for Registry {
    /// `cd`, `pwd`, `echo`, `exit`, `sleep`, and the `top` / `grep` placeholders.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register::<Cd>()
            .register::<Pwd>()
            .register::<Echo>()
            .register::<Exit>()
            .register::<Sleep>()
            .register::<Top>()
            .register::<Grep>();
        registry
    }
}

fn run_parsed<T: BuiltinCommand>(
    argv: &[String],
    stdin: &mut dyn Read,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
    env: &mut Environment,
) -> ExitCode {
    let args: Vec<&str> = argv.iter().skip(1).map(String::as_str).collect();
    match T::from_args(&[T::name()], &args) {
        Ok(cmd) => match cmd.execute(stdin, stdout, env) {
            Ok(code) => code,
            Err(e) => {
                let _ = writeln!(stderr, "{}: {:#}", T::name(), e);
                1
            }
        },
        Err(EarlyExit { output, status }) => match status {
            Ok(()) => {
                write_block(stdout, &output);
                0
            }
            Err(()) => {
                write_block(stderr, &output);
                1
            }
        },
    }
}

fn write_block(out: &mut dyn Write, text: &str) {
    let _ = out.write_all(text.as_bytes());
    if !text.ends_with('\n') {
        let _ = out.write_all(b"\n");
    }
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{}", env.current_dir.to_string_lossy())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Change the interpreter's working directory ($HOME when no directory is given).
pub struct Cd {
    #[argh(positional)]
    /// target directory, relative paths start from the current one
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn scope() -> Scope {
        Scope::InProcess
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let target = match &self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => match env.get_var("HOME") {
                Some(home) => PathBuf::from(home),
                None => return Err(anyhow::anyhow!("no target and HOME not set")),
            },
        };

        let new_dir = if target.is_absolute() {
            target
        } else {
            env.current_dir.join(target)
        };

        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("can't resolve {}", new_dir.display()))?;

        env::set_current_dir(&canonical)
            .with_context(|| format!("can't chdir to {}", canonical.display()))?;
        env.set_var("PWD", canonical.to_string_lossy());
        env.current_dir = canonical;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Exit the shell.
pub struct Exit {
    #[argh(positional)]
    /// status to exit with, 0 when omitted
    pub code: Option<ExitCode>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn scope() -> Scope {
        Scope::InProcess
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let code = self.code.unwrap_or(0);
        env.should_exit = true;
        env.exit_code = code;
        Ok(code)
    }
}

/// Write the arguments, separated by single spaces and followed by a newline.
///
/// Every word is printed as given; only a leading `-n` is an option.
pub struct Echo {
    /// omit the trailing newline
    pub no_newline: bool,
    pub args: Vec<String>,
}

impl FromArgs for Echo {
    fn from_args(_command_name: &[&str], args: &[&str]) -> Result<Self, EarlyExit> {
        let (no_newline, words) = match args.split_first() {
            Some((&"-n", rest)) => (true, rest),
            _ => (false, args),
        };
        Ok(Echo {
            no_newline,
            args: words.iter().map(|w| w.to_string()).collect(),
        })
    }
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        let mut line = self.args.join(" ");
        if !self.no_newline {
            line.push('\n');
        }
        stdout.write_all(line.as_bytes())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Suspend the stage for a number of seconds.
pub struct Sleep {
    #[argh(positional)]
    /// how long to sleep, in whole seconds
    pub seconds: u64,
}

impl BuiltinCommand for Sleep {
    fn name() -> &'static str {
        "sleep"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        thread::sleep(Duration::from_secs(self.seconds));
        Ok(0)
    }
}

/// Display running processes. Not implemented: accepts any arguments and does nothing.
pub struct Top;

impl FromArgs for Top {
    fn from_args(_command_name: &[&str], _args: &[&str]) -> Result<Self, EarlyExit> {
        Ok(Top)
    }
}

impl BuiltinCommand for Top {
    fn name() -> &'static str {
        "top"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        Ok(0)
    }
}

/// Print lines matching a pattern. Not implemented: accepts any arguments and does nothing.
pub struct Grep;

impl FromArgs for Grep {
    fn from_args(_command_name: &[&str], _args: &[&str]) -> Result<Self, EarlyExit> {
        Ok(Grep)
    }
}

impl BuiltinCommand for Grep {
    fn name() -> &'static str {
        "grep"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        Ok(0)
    }
}
