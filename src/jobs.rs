//! Background job table and the SIGCHLD-driven reaper.
//!
//! The table is split in two. [`JobSlots`] is a fixed array of atomic slots
//! (pid, state, exit code) that the signal handler may touch at any moment.
//! [`JobTable`] wraps it with the parts only the control-flow thread uses:
//! job ids, command text, and the id counter.
//!
//! The handler only ever waits for pids registered here, never for `-1`, so
//! foreground children are left to the blocking wait that spawned them.

use crate::command::{terminal_code, ExitCode};
use crate::error::ShellError;
use crate::signals::{self, ChildEventsBlocked};
use nix::errno::Errno;
use nix::libc::c_int;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicI32, AtomicPtr, AtomicU8, Ordering};
use std::sync::Arc;

/// Capacity of the job table.
pub const MAX_JOBS: usize = 64;

/// Pid value marking a free slot.
const FREE: i32 = 0;

/// Exit code value meaning "terminated, but the status was lost".
const UNKNOWN: i32 = i32::MIN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Stopped,
    Done,
}

impl JobStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => JobStatus::Stopped,
            2 => JobStatus::Done,
            _ => JobStatus::Running,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            JobStatus::Running => 0,
            JobStatus::Stopped => 1,
            JobStatus::Done => 2,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobStatus::Running => "Running",
            JobStatus::Stopped => "Stopped",
            JobStatus::Done => "Done",
        })
    }
}

struct Slot {
    pid: AtomicI32,
    state: AtomicU8,
    code: AtomicI32,
}

impl Slot {
    fn new() -> Self {
        Self {
            pid: AtomicI32::new(FREE),
            state: AtomicU8::new(JobStatus::Running.as_u8()),
            code: AtomicI32::new(UNKNOWN),
        }
    }

    fn status(&self) -> JobStatus {
        JobStatus::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_status(&self, status: JobStatus) {
        self.state.store(status.as_u8(), Ordering::Release);
    }

    fn code(&self) -> Option<ExitCode> {
        match self.code.load(Ordering::Acquire) {
            UNKNOWN => None,
            code => Some(code),
        }
    }

    fn finish(&self, code: Option<ExitCode>) {
        self.code.store(code.unwrap_or(UNKNOWN), Ordering::Release);
        self.set_status(JobStatus::Done);
    }
}

/// The part of the job table shared with the SIGCHLD handler.
///
/// Every method is async-signal-safe: no allocation, no locks, no output.
pub struct JobSlots {
    slots: [Slot; MAX_JOBS],
}

impl JobSlots {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Slot::new()),
        }
    }

    fn find_pid(&self, pid: Pid) -> Option<&Slot> {
        let raw = pid.as_raw();
        if raw == FREE {
            return None;
        }
        self.slots
            .iter()
            .find(|slot| slot.pid.load(Ordering::Acquire) == raw)
    }

    /// Applies one state change reported for `pid`.
    ///
    /// A pid that is not registered is ignored.
    pub fn on_child_event(&self, pid: Pid, status: WaitStatus) {
        let Some(slot) = self.find_pid(pid) else {
            return;
        };
        match status {
            WaitStatus::Exited(..) | WaitStatus::Signaled(..) => slot.finish(terminal_code(status)),
            WaitStatus::Stopped(..) => slot.set_status(JobStatus::Stopped),
            WaitStatus::Continued(..) => slot.set_status(JobStatus::Running),
            _ => {}
        }
    }

    /// Polls every registered, unfinished job without blocking.
    pub fn reap(&self) {
        let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
        for slot in &self.slots {
            let raw = slot.pid.load(Ordering::Acquire);
            if raw == FREE {
                continue;
            }
            let pid = Pid::from_raw(raw);
            while slot.status() != JobStatus::Done {
                match waitpid(pid, Some(flags)) {
                    Ok(WaitStatus::StillAlive) => break,
                    Ok(status) => self.on_child_event(pid, status),
                    Err(Errno::EINTR) => continue,
                    // Somebody else already collected it.
                    Err(_) => slot.finish(None),
                }
            }
        }
    }
}

impl Default for JobSlots {
    fn default() -> Self {
        Self::new()
    }
}

/// Slots the installed SIGCHLD handler reaps.
static REAPER: AtomicPtr<JobSlots> = AtomicPtr::new(ptr::null_mut());

extern "C" fn handle_sigchld(_signal: c_int) {
    let saved = errno::errno();
    let slots = REAPER.load(Ordering::Acquire);
    if !slots.is_null() {
        // SAFETY: the pointer comes from `Arc::into_raw` in `install_reaper`
        // and that reference is never released.
        unsafe { &*slots }.reap();
    }
    errno::set_errno(saved);
}

/// Routes SIGCHLD to `slots`.
///
/// The handler keeps its own reference to the slots for the rest of the
/// process lifetime.
pub fn install_reaper(slots: Arc<JobSlots>) -> Result<(), ShellError> {
    let raw = Arc::into_raw(slots).cast_mut();
    REAPER.store(raw, Ordering::Release);
    signals::on_child_event(handle_sigchld)
}

/// Snapshot of one job, for presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    pub id: u32,
    pub pid: Pid,
    pub status: JobStatus,
    pub command: String,
}

impl fmt::Display for JobInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}", self.id, self.status, self.command)
    }
}

struct JobMeta {
    id: u32,
    command: String,
}

/// Fixed-capacity registry of background jobs.
pub struct JobTable {
    slots: Arc<JobSlots>,
    meta: Vec<Option<JobMeta>>,
    next_id: u32,
}

impl JobTable {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(JobSlots::new()),
            meta: (0..MAX_JOBS).map(|_| None).collect(),
            next_id: 1,
        }
    }

    /// The slots to hand to [`install_reaper`].
    pub fn shared(&self) -> Arc<JobSlots> {
        Arc::clone(&self.slots)
    }

    pub fn len(&self) -> usize {
        self.meta.iter().filter(|m| m.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.meta.iter().all(|m| m.is_some())
    }

    /// Records a freshly spawned background process and returns its job id.
    ///
    /// When every slot is taken nothing is registered and the caller gets
    /// [`ShellError::JobTableFull`].
    pub fn register(&mut self, pid: Pid, command: &str) -> Result<u32, ShellError> {
        let _blocked = ChildEventsBlocked::new();
        let index = self
            .meta
            .iter()
            .position(|m| m.is_none())
            .ok_or(ShellError::JobTableFull)?;

        let id = self.next_id;
        self.next_id += 1;
        self.meta[index] = Some(JobMeta {
            id,
            command: command.to_string(),
        });
        let slot = &self.slots.slots[index];
        slot.code.store(UNKNOWN, Ordering::Release);
        slot.set_status(JobStatus::Running);
        // Publishing the pid last makes the slot visible to the reaper.
        slot.pid.store(pid.as_raw(), Ordering::Release);
        log::debug!("registered job [{id}] pid {pid}");
        Ok(id)
    }

    /// All live jobs in slot order.
    pub fn list(&self) -> Vec<JobInfo> {
        let _blocked = ChildEventsBlocked::new();
        (0..MAX_JOBS).filter_map(|i| self.info(i)).collect()
    }

    /// Applies a state change reported for `pid`; see [`JobSlots::on_child_event`].
    #[cfg(test)]
    pub(crate) fn on_child_event(&self, pid: Pid, status: WaitStatus) {
        self.slots.on_child_event(pid, status);
    }

    /// Resumes job `id`, waits for it to terminate and removes it.
    ///
    /// Returns the final status, or `None` when the process was collected
    /// elsewhere and its status is unknown.
    pub fn foreground(&mut self, id: u32) -> Result<Option<ExitCode>, ShellError> {
        let _blocked = ChildEventsBlocked::new();
        let index = self.index_of(id).ok_or(ShellError::NoSuchJob(id))?;
        let slot = &self.slots.slots[index];
        let pid = Pid::from_raw(slot.pid.load(Ordering::Acquire));

        if slot.status() != JobStatus::Done {
            if let Err(err) = kill(pid, Signal::SIGCONT) {
                log::debug!("SIGCONT to {pid}: {err}");
            }
            loop {
                match waitpid(pid, None) {
                    Ok(status) => {
                        if let Some(code) = terminal_code(status) {
                            slot.finish(Some(code));
                            break;
                        }
                    }
                    Err(Errno::EINTR) => continue,
                    Err(err) => {
                        log::debug!("waitpid {pid}: {err}");
                        if slot.status() != JobStatus::Done {
                            slot.finish(None);
                        }
                        break;
                    }
                }
            }
        }

        let code = slot.code();
        self.reclaim(index);
        Ok(code)
    }

    /// Resumes job `id` without waiting for it.
    pub fn background(&mut self, id: u32) -> Result<(), ShellError> {
        let _blocked = ChildEventsBlocked::new();
        let index = self.index_of(id).ok_or(ShellError::NoSuchJob(id))?;
        let slot = &self.slots.slots[index];
        let pid = Pid::from_raw(slot.pid.load(Ordering::Acquire));
        if let Err(err) = kill(pid, Signal::SIGCONT) {
            log::debug!("SIGCONT to {pid}: {err}");
        }
        if slot.status() != JobStatus::Done {
            slot.set_status(JobStatus::Running);
        }
        Ok(())
    }

    /// Polls for finished jobs, then removes and returns every `Done` job.
    pub fn sweep(&mut self) -> Vec<JobInfo> {
        let _blocked = ChildEventsBlocked::new();
        self.slots.reap();
        let mut finished = Vec::new();
        for index in 0..MAX_JOBS {
            if let Some(info) = self.info(index) {
                if info.status == JobStatus::Done {
                    self.reclaim(index);
                    finished.push(info);
                }
            }
        }
        finished
    }

    fn index_of(&self, id: u32) -> Option<usize> {
        self.meta
            .iter()
            .position(|m| m.as_ref().is_some_and(|m| m.id == id))
    }

    fn info(&self, index: usize) -> Option<JobInfo> {
        let meta = self.meta[index].as_ref()?;
        let slot = &self.slots.slots[index];
        Some(JobInfo {
            id: meta.id,
            pid: Pid::from_raw(slot.pid.load(Ordering::Acquire)),
            status: slot.status(),
            command: meta.command.clone(),
        })
    }

    fn reclaim(&mut self, index: usize) {
        self.slots.slots[index].pid.store(FREE, Ordering::Release);
        if let Some(meta) = self.meta[index].take() {
            log::debug!("reclaimed job [{}]", meta.id);
        }
        // Ids only need to be unique among live jobs.
        if self.is_empty() {
            self.next_id = 1;
        }
    }
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use std::time::{Duration, Instant};

    // Pids used only for bookkeeping; nothing ever signals or waits for them.
    fn fake_pid(n: usize) -> Pid {
        Pid::from_raw(4_000_000 + n as i32)
    }

    fn wait_for_status(table: &JobTable, id: u32, want: JobStatus) {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            table.slots.reap();
            let status = table.list().into_iter().find(|j| j.id == id).map(|j| j.status);
            if status == Some(want) {
                return;
            }
            assert!(Instant::now() < deadline, "job {id} never became {want}");
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn register_assigns_increasing_ids() {
        let mut table = JobTable::new();
        let a = table.register(fake_pid(1), "sleep 1 &").unwrap();
        let b = table.register(fake_pid(2), "sleep 2 &").unwrap();
        assert_eq!((a, b), (1, 2));

        let listed = table.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].to_string(), "[1] Running sleep 1 &");
        assert_eq!(listed[1].pid, fake_pid(2));
    }

    #[test]
    fn capacity_is_enforced_without_eviction() {
        let mut table = JobTable::new();
        for n in 0..MAX_JOBS {
            table.register(fake_pid(n), &format!("job {n}")).unwrap();
        }
        assert!(table.is_full());
        let err = table.register(fake_pid(MAX_JOBS), "one too many").unwrap_err();
        assert!(matches!(err, ShellError::JobTableFull));
        assert_eq!(table.len(), MAX_JOBS);
        assert!(table.list().iter().all(|j| j.command != "one too many"));
        assert_eq!(table.list()[0].command, "job 0");
    }

    #[test]
    fn child_events_drive_the_state_machine() {
        let mut table = JobTable::new();
        let pid = fake_pid(7);
        let id = table.register(pid, "worker").unwrap();
        let status = |t: &JobTable| t.list().into_iter().find(|j| j.id == id).unwrap().status;

        table.on_child_event(pid, WaitStatus::Stopped(pid, Signal::SIGTSTP));
        assert_eq!(status(&table), JobStatus::Stopped);
        table.on_child_event(pid, WaitStatus::Continued(pid));
        assert_eq!(status(&table), JobStatus::Running);
        table.on_child_event(pid, WaitStatus::Exited(pid, 4));
        assert_eq!(status(&table), JobStatus::Done);
    }

    #[test]
    fn events_for_unknown_pids_are_ignored() {
        let mut table = JobTable::new();
        table.register(fake_pid(1), "a").unwrap();
        table.on_child_event(fake_pid(99), WaitStatus::Exited(fake_pid(99), 0));
        assert_eq!(table.list()[0].status, JobStatus::Running);
    }

    #[test]
    fn sweep_reclaims_done_jobs_and_restarts_ids() {
        let mut table = JobTable::new();
        let pid = fake_pid(3);
        table.register(pid, "short").unwrap();
        table.on_child_event(pid, WaitStatus::Exited(pid, 0));

        let finished = table.sweep();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].to_string(), "[1] Done short");
        assert!(table.is_empty());
        assert_eq!(table.register(fake_pid(4), "next").unwrap(), 1);
    }

    #[test]
    fn foreground_of_finished_job_returns_recorded_status() {
        let mut table = JobTable::new();
        let pid = fake_pid(5);
        let id = table.register(pid, "done already").unwrap();
        table.on_child_event(pid, WaitStatus::Signaled(pid, Signal::SIGKILL, false));
        assert_eq!(table.foreground(id).unwrap(), Some(137));
        assert!(table.is_empty());
    }

    #[test]
    fn unknown_job_ids_are_reported() {
        let mut table = JobTable::new();
        assert!(matches!(table.foreground(9), Err(ShellError::NoSuchJob(9))));
        assert!(matches!(table.background(9), Err(ShellError::NoSuchJob(9))));
    }

    #[test]
    fn reap_collects_a_real_child() {
        let mut table = JobTable::new();
        let child = Command::new("sh").args(["-c", "exit 0"]).spawn().unwrap();
        let id = table.register(Pid::from_raw(child.id() as i32), "sh -c 'exit 0'").unwrap();
        wait_for_status(&table, id, JobStatus::Done);
        assert_eq!(table.foreground(id).unwrap(), Some(0));
    }

    #[test]
    fn foreground_waits_for_a_running_child() {
        let mut table = JobTable::new();
        let child = Command::new("sh").args(["-c", "sleep 0.2; exit 3"]).spawn().unwrap();
        let id = table.register(Pid::from_raw(child.id() as i32), "sleeper").unwrap();
        assert_eq!(table.foreground(id).unwrap(), Some(3));
        assert!(table.is_empty());
    }

    #[test]
    fn background_resumes_a_stopped_child() {
        let mut table = JobTable::new();
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = Pid::from_raw(child.id() as i32);
        let id = table.register(pid, "sleep 30").unwrap();

        kill(pid, Signal::SIGSTOP).unwrap();
        wait_for_status(&table, id, JobStatus::Stopped);
        table.background(id).unwrap();
        assert_eq!(table.list()[0].status, JobStatus::Running);

        kill(pid, Signal::SIGKILL).unwrap();
        wait_for_status(&table, id, JobStatus::Done);
        assert_eq!(table.sweep().len(), 1);
        let _ = child.try_wait();
    }
}
