use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;

/// Read access to shell variables, as needed by the expander.
pub trait VarLookup {
    /// Value of `name`, or `None` when it is unset.
    fn var(&self, name: &str) -> Option<String>;
}

impl VarLookup for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Live view of the process environment used by the interpreter.
///
/// Unlike a snapshot, every lookup goes to the process environment, so a
/// change made by `cd` (which rewrites `PWD`) is visible to the very next
/// expansion. Children inherit the same environment unchanged through exec.
#[derive(Debug, Default, Clone, Copy)]
pub struct Environment;

impl Environment {
    pub fn new() -> Self {
        Self
    }

    /// Get the value of an environment variable.
    ///
    /// Values that are not valid UTF-8 are converted lossily.
    pub fn get_var(&self, key: &str) -> Option<String> {
        if key.is_empty() || key.contains('=') || key.contains('\0') {
            return None;
        }
        stdenv::var_os(key).map(|v| v.to_string_lossy().into_owned())
    }

    /// Set or override an environment variable of the shell process.
    pub fn set_var(&mut self, key: &str, val: &str) {
        // SAFETY: the shell mutates its environment only from the single
        // control-flow thread, and the SIGCHLD handler never reads it.
        unsafe { stdenv::set_var(key, val) }
    }

    /// The current working directory, falling back to `.` when it is gone.
    pub fn current_dir(&self) -> PathBuf {
        stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }
}

impl VarLookup for Environment {
    fn var(&self, name: &str) -> Option<String> {
        self.get_var(name)
    }
}
