use crate::error::ShellError;
use nix::libc::c_int;
use nix::sys::signal::{
    sigaction, sigprocmask, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal,
};

/// Makes the shell itself survive Ctrl-C.
pub fn ignore_interrupt() -> Result<(), ShellError> {
    let action = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    // SAFETY: installing SIG_IGN has no handler code to be unsafe about.
    unsafe { sigaction(Signal::SIGINT, &action) }
        .map(drop)
        .map_err(ShellError::Signal)
}

/// Installs `handler` for SIGCHLD.
///
/// Stop and continue events are delivered too, so the job table sees
/// `Stopped` and `Running` transitions.
pub fn on_child_event(handler: extern "C" fn(c_int)) -> Result<(), ShellError> {
    let action = SigAction::new(
        SigHandler::Handler(handler),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    // SAFETY: the handler only performs non-blocking waitpid calls and
    // atomic stores; it never allocates, locks or prints.
    unsafe { sigaction(Signal::SIGCHLD, &action) }
        .map(drop)
        .map_err(ShellError::Signal)
}

/// Restores the dispositions and mask a program expects to start with.
///
/// Called in a freshly forked child right before exec, so errors are
/// ignored: there is nobody left to report them to.
pub fn reset_for_exec() {
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    for signal in [Signal::SIGINT, Signal::SIGQUIT, Signal::SIGCHLD] {
        // SAFETY: resetting to SIG_DFL.
        let _ = unsafe { sigaction(signal, &default) };
    }
    let _ = sigprocmask(SigmaskHow::SIG_SETMASK, Some(&SigSet::empty()), None);
}

/// Keeps SIGCHLD blocked for as long as it is alive.
///
/// The control-flow thread holds one of these around every structural
/// change of the job table, so the reaper never observes a half-made change.
/// Dropping it restores the previous mask, at which point a pending SIGCHLD
/// is delivered.
pub struct ChildEventsBlocked {
    previous: SigSet,
}

impl ChildEventsBlocked {
    pub fn new() -> Self {
        let mut block = SigSet::empty();
        block.add(Signal::SIGCHLD);
        let mut previous = SigSet::empty();
        if let Err(err) = sigprocmask(SigmaskHow::SIG_BLOCK, Some(&block), Some(&mut previous)) {
            log::warn!("cannot block SIGCHLD: {err}");
        }
        Self { previous }
    }
}

impl Drop for ChildEventsBlocked {
    fn drop(&mut self) {
        let _ = sigprocmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None);
    }
}
