use std::io;
use std::path::PathBuf;

/// Everything that can abort a single command line.
///
/// None of these are fatal to the shell: the dispatcher prints the error,
/// adjusts the last status where appropriate and moves on to the next line.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    /// A `<`, `>` or `>>` operator was the last token of its command.
    #[error("missing filename for redirection '{0}'")]
    MissingRedirectTarget(String),

    #[error("open '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("pipe: {0}")]
    Pipe(#[source] nix::Error),

    #[error("fork: {0}")]
    Fork(#[source] nix::Error),

    #[error("signal setup: {0}")]
    Signal(#[source] nix::Error),

    #[error("job table full")]
    JobTableFull,

    #[error("no such job {0}")]
    NoSuchJob(u32),

    #[error("{0}")]
    Usage(String),

    #[error("{0}")]
    InvalidPipeline(&'static str),

    #[error("argument contains a NUL byte")]
    NulInArgument,
}

impl ShellError {
    /// Last-status convention applied when the parent aborts a command.
    ///
    /// Malformed input maps to 2, everything else to 1.
    pub fn status(&self) -> i32 {
        match self {
            ShellError::MissingRedirectTarget(_)
            | ShellError::InvalidPipeline(_)
            | ShellError::NulInArgument
            | ShellError::Usage(_) => 2,
            _ => 1,
        }
    }
}
