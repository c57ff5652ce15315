//! Process creation: a single command, or two commands joined by a pipe.
//!
//! Everything that can fail on bad input (redirection syntax, NUL bytes) is
//! checked in the parent by [`Stage::prepare`] before any process exists.
//! After `fork` the child only rebinds descriptors, resets its signal state
//! and execs; when that fails it reports on its own stderr and `_exit`s.

use crate::command::{terminal_code, ExitCode, EXEC_FAILURE, REDIRECT_FAILURE};
use crate::error::ShellError;
use crate::jobs::JobTable;
use crate::redirect::{take_redirections, Redirection};
use crate::signals::{self, ChildEventsBlocked};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::waitpid;
use nix::unistd::{dup2, execvp, fork, pipe, ForkResult, Pid};
use std::ffi::CString;
use std::io::{self, Write};
use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd, RawFd};

const STDIN: RawFd = 0;
const STDOUT: RawFd = 1;

/// One program invocation, ready to be exec'd.
#[derive(Debug)]
pub struct Stage {
    argv: Vec<CString>,
    redirections: Vec<Redirection>,
}

impl Stage {
    /// Strips redirection clauses from `argv` and converts the rest for exec.
    pub fn prepare(mut argv: Vec<String>) -> Result<Self, ShellError> {
        let redirections = take_redirections(&mut argv)?;
        let argv = argv
            .into_iter()
            .map(|arg| CString::new(arg).map_err(|_| ShellError::NulInArgument))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { argv, redirections })
    }

    pub fn program(&self) -> Option<&str> {
        self.argv.first().and_then(|p| p.to_str().ok())
    }

    pub fn redirections(&self) -> &[Redirection] {
        &self.redirections
    }

    /// Turns the calling (child) process into this stage's program.
    fn exec(&self) -> ! {
        signals::reset_for_exec();
        for redirection in &self.redirections {
            if let Err(err) = redirection.apply() {
                child_fail(&err.to_string(), REDIRECT_FAILURE);
            }
        }
        // Only redirections: the files were opened for their side effect.
        let Some(program) = self.argv.first() else {
            _exit(0);
        };
        let err = match execvp(program, &self.argv) {
            Ok(never) => match never {},
            Err(err) => err,
        };
        child_fail(
            &format!("exec failed: {}: {}", program.to_string_lossy(), err.desc()),
            EXEC_FAILURE,
        )
    }
}

/// What a single command turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Registered as a background job.
    Background { id: u32, pid: Pid },
    /// Waited for in the foreground; `None` when no status could be collected.
    Foreground(Option<ExitCode>),
}

/// Runs one command.
///
/// In the background the child is registered in `jobs` under `command_text`
/// and the call returns at once. In the foreground the call blocks until the
/// child terminates.
pub fn run_single(
    stage: &Stage,
    background: bool,
    jobs: &mut JobTable,
    command_text: &str,
) -> Result<Outcome, ShellError> {
    if !background {
        let pid = spawn(stage)?;
        log::debug!("waiting for foreground pid {pid}");
        return Ok(Outcome::Foreground(wait_for(pid)));
    }

    if jobs.is_full() {
        return Err(ShellError::JobTableFull);
    }
    // Held until the job is registered so the reaper cannot miss an early exit.
    let _blocked = ChildEventsBlocked::new();
    let pid = spawn(stage)?;
    match jobs.register(pid, command_text) {
        Ok(id) => Ok(Outcome::Background { id, pid }),
        Err(err) => {
            abandon(pid);
            Err(err)
        }
    }
}

/// Runs `left | right` and waits for both.
///
/// The two waits happen in order, left first; the status of whichever is
/// collected last is returned.
pub fn run_pipe(left: &Stage, right: &Stage) -> Result<Option<ExitCode>, ShellError> {
    let (read_end, write_end) = pipe().map_err(ShellError::Pipe)?;

    // SAFETY (both forks): see `spawn`.
    let left_pid = match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            drop(read_end);
            bind(write_end, STDOUT);
            left.exec()
        }
        Ok(ForkResult::Parent { child }) => child,
        Err(err) => return Err(ShellError::Fork(err)),
    };

    let right_pid = match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            drop(write_end);
            bind(read_end, STDIN);
            right.exec()
        }
        Ok(ForkResult::Parent { child }) => child,
        Err(err) => {
            drop(read_end);
            drop(write_end);
            abandon(left_pid);
            return Err(ShellError::Fork(err));
        }
    };

    // The parent is not a data participant.
    drop(read_end);
    drop(write_end);
    log::debug!("pipeline {left_pid} | {right_pid}");

    let mut last = None;
    for pid in [left_pid, right_pid] {
        if let Some(code) = wait_for(pid) {
            last = Some(code);
        }
    }
    Ok(last)
}

/// Forks a child that execs `stage`; returns the child's pid in the parent.
fn spawn(stage: &Stage) -> Result<Pid, ShellError> {
    // SAFETY: the child only touches descriptors and signal state before
    // exec or `_exit`.
    match unsafe { fork() } {
        Ok(ForkResult::Child) => stage.exec(),
        Ok(ForkResult::Parent { child }) => {
            log::debug!("spawned pid {child} for {:?}", stage.program());
            Ok(child)
        }
        Err(err) => Err(ShellError::Fork(err)),
    }
}

/// Blocks until `pid` terminates and returns its shell status.
///
/// A pid that is no longer waitable yields `None` rather than an error.
pub fn wait_for(pid: Pid) -> Option<ExitCode> {
    loop {
        match waitpid(pid, None) {
            Ok(status) => {
                if let Some(code) = terminal_code(status) {
                    return Some(code);
                }
            }
            Err(Errno::EINTR) => continue,
            Err(err) => {
                log::debug!("waitpid {pid}: {err}");
                return None;
            }
        }
    }
}

/// Kills and collects a child that must not be left running.
fn abandon(pid: Pid) {
    log::debug!("terminating pid {pid}");
    let _ = kill(pid, Signal::SIGKILL);
    let _ = wait_for(pid);
}

/// Child side: makes `fd` the descriptor `target` and closes the original.
fn bind(fd: OwnedFd, target: RawFd) {
    if fd.as_raw_fd() == target {
        let _ = fd.into_raw_fd();
        return;
    }
    if let Err(err) = dup2(fd.as_raw_fd(), target) {
        child_fail(&format!("dup2: {}", err.desc()), 1);
    }
}

/// Child side: reports `message` and exits without running destructors or
/// flushing buffers inherited from the shell.
fn child_fail(message: &str, code: ExitCode) -> ! {
    let _ = writeln!(io::stderr(), "jsh: {message}");
    _exit(code)
}

/// Child side: terminates immediately with `code`.
fn _exit(code: ExitCode) -> ! {
    // SAFETY: `_exit` only ends the process; nothing inherited from the
    // shell is flushed or dropped.
    unsafe { nix::libc::_exit(code) }
}
