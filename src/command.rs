use nix::sys::wait::WaitStatus;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells.
pub type ExitCode = i32;

/// Status reported when the target program could not be executed.
pub const EXEC_FAILURE: ExitCode = 127;

/// Status a forked child exits with when one of its redirections fails.
pub const REDIRECT_FAILURE: ExitCode = 1;

/// Exit/signal status of the most recently awaited foreground operation.
///
/// Only blocking waits issued by the control-flow thread write it; background
/// completions never do. Read by the `$?` expansion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LastStatus(ExitCode);

impl LastStatus {
    pub fn get(&self) -> ExitCode {
        self.0
    }

    pub fn set(&mut self, code: ExitCode) {
        self.0 = code;
    }
}

/// Translates a terminal wait status into a shell exit code.
///
/// Normal exit yields the exit value, death by signal yields `128 + signo`.
/// Stops, continues and "still alive" are not terminal and yield `None`.
pub fn terminal_code(status: WaitStatus) -> Option<ExitCode> {
    match status {
        WaitStatus::Exited(_, code) => Some(code),
        WaitStatus::Signaled(_, signal, _) => Some(128 + signal as i32),
        _ => None,
    }
}
