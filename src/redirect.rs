//! Stream redirection: `< file`, `> file` and `>> file`.
//!
//! Resolution happens in two halves around `fork`. The parent calls
//! [`take_redirections`] to strip the operators from the argument vector and
//! reject malformed clauses before any process exists; the child then calls
//! [`Redirection::apply`] on each clause to open the file and rebind its own
//! standard stream. The parent's streams are never touched.

use crate::error::ShellError;
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::unistd::{close, dup2};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{IntoRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;

/// Permission bits for files created by `>` and `>>`.
pub const CREATE_MODE: u32 = 0o644;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// `<`: read-only, the file must exist.
    Input,
    /// `>`: create or truncate.
    Output,
    /// `>>`: create or append.
    Append,
}

impl RedirectKind {
    pub fn from_operator(token: &str) -> Option<Self> {
        match token {
            "<" => Some(RedirectKind::Input),
            ">" => Some(RedirectKind::Output),
            ">>" => Some(RedirectKind::Append),
            _ => None,
        }
    }

    pub fn operator(self) -> &'static str {
        match self {
            RedirectKind::Input => "<",
            RedirectKind::Output => ">",
            RedirectKind::Append => ">>",
        }
    }

    /// The standard stream this kind of redirection rebinds.
    pub fn target_fd(self) -> RawFd {
        match self {
            RedirectKind::Input => 0,
            RedirectKind::Output | RedirectKind::Append => 1,
        }
    }
}

/// One operator together with its filename operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirection {
    pub kind: RedirectKind,
    pub path: PathBuf,
}

impl Redirection {
    /// Opens the target file with the flags the operator calls for.
    pub fn open(&self) -> Result<File, ShellError> {
        let mut options = OpenOptions::new();
        match self.kind {
            RedirectKind::Input => {
                options.read(true);
            }
            RedirectKind::Output => {
                options.write(true).create(true).truncate(true).mode(CREATE_MODE);
            }
            RedirectKind::Append => {
                options.append(true).create(true).mode(CREATE_MODE);
            }
        }
        options.open(&self.path).map_err(|source| ShellError::Open {
            path: self.path.clone(),
            source,
        })
    }

    /// Opens the file and makes it the calling process's stdin or stdout.
    ///
    /// Meant to run in a freshly forked child.
    pub fn apply(&self) -> Result<(), ShellError> {
        let target = self.kind.target_fd();
        let fd = self.open()?.into_raw_fd();
        // The standard stream was closed, so the file landed on it directly.
        let bound = if fd == target {
            keep_across_exec(fd)
        } else {
            let bound = dup2(fd, target).map(drop);
            let _ = close(fd);
            bound
        };
        bound.map_err(|errno| ShellError::Open {
            path: self.path.clone(),
            source: io::Error::from(errno),
        })
    }
}

/// Clears `FD_CLOEXEC`, which `std::fs` sets on every descriptor it opens.
fn keep_across_exec(fd: RawFd) -> nix::Result<()> {
    fcntl(fd, FcntlArg::F_SETFD(FdFlag::empty())).map(drop)
}

/// Removes every redirection clause from `argv`, left to right.
///
/// Each operator consumes itself and the following token, whatever that
/// token is, and later arguments shift left. An operator with no following
/// token is a parse error and leaves the vector in an unspecified state.
pub fn take_redirections(argv: &mut Vec<String>) -> Result<Vec<Redirection>, ShellError> {
    let mut found = Vec::new();
    let mut i = 0;
    while i < argv.len() {
        let Some(kind) = RedirectKind::from_operator(&argv[i]) else {
            i += 1;
            continue;
        };
        if i + 1 >= argv.len() {
            return Err(ShellError::MissingRedirectTarget(kind.operator().to_string()));
        }
        argv.remove(i);
        let path = PathBuf::from(argv.remove(i));
        found.push(Redirection { kind, path });
    }
    Ok(found)
}

/// True when any token is a redirection operator.
pub fn has_operator(argv: &[String]) -> bool {
    argv.iter().any(|t| RedirectKind::from_operator(t).is_some())
}
