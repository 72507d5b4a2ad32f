use crate::command::ExitCode;
use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;

/// Interpreter-owned view of the process state builtins may read or change.
///
/// The environment contains:
/// - `vars`: environment variables handed to executed programs.
/// - `current_dir`: the working directory, kept in step with the process's.
/// - `should_exit` / `exit_code`: set by the `exit` builtin, checked by the REPL.
///
/// A forked stage works on its own copy, which is why `cd` and `exit` only
/// have an effect when they run in the interpreter process itself.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME).
    pub vars: HashMap<String, String>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
    /// When set to true, the interactive loop stops after the current line.
    pub should_exit: bool,
    /// Status the interpreter should terminate with once `should_exit` is set.
    pub exit_code: ExitCode,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    pub fn new() -> Self {
        let vars = stdenv::vars().collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            vars,
            current_dir,
            should_exit: false,
            exit_code: 0,
        }
    }

    /// Get the value of an environment variable.
    ///
    /// Looks up the key in `self.vars` first, falling back to `std::env::var`.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| stdenv::var(key).ok())
    }

    /// Set or override an environment variable in `self.vars`.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Renders `vars` as `KEY=value` pairs, sorted by key.
    pub fn to_envp(&self) -> Vec<String> {
        let mut pairs: Vec<String> = self.vars.iter().map(|(k, v)| format!("{k}={v}")).collect();
        pairs.sort();
        pairs
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
