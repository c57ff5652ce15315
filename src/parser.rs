//! Classification of a finalized token sequence into something runnable.

use crate::error::ShellError;
use crate::redirect;

/// Commands handled inside the shell process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Exit,
    Cd,
    Jobs,
    Fg,
    Bg,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "exit" => Some(Builtin::Exit),
            "cd" => Some(Builtin::Cd),
            "jobs" => Some(Builtin::Jobs),
            "fg" => Some(Builtin::Fg),
            "bg" => Some(Builtin::Bg),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Exit => "exit",
            Builtin::Cd => "cd",
            Builtin::Jobs => "jobs",
            Builtin::Fg => "fg",
            Builtin::Bg => "bg",
        }
    }
}

/// What one input line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// Nothing to run.
    Empty,
    /// A builtin with its arguments (the name itself excluded).
    Builtin { builtin: Builtin, args: Vec<String> },
    /// `left | right`
    Pipe { left: Vec<String>, right: Vec<String> },
    /// A single program, optionally sent to the background with a trailing `&`.
    Simple { argv: Vec<String>, background: bool },
}

/// Routes `tokens` to a builtin, a two-stage pipe or a single command.
///
/// Builtins are matched on the exact first token before anything else is
/// looked at. A leading empty token (a line holding a lone quote) means
/// there is nothing to run.
pub fn classify(mut tokens: Vec<String>) -> Result<CommandLine, ShellError> {
    match tokens.first() {
        None => return Ok(CommandLine::Empty),
        Some(first) if first.is_empty() => return Ok(CommandLine::Empty),
        Some(first) => {
            if let Some(builtin) = Builtin::from_name(first) {
                let args = tokens.split_off(1);
                return Ok(CommandLine::Builtin { builtin, args });
            }
        }
    }

    if let Some(bar) = tokens.iter().position(|t| t == "|") {
        let right = tokens.split_off(bar + 1);
        tokens.pop();
        let left = tokens;
        return pipe(left, right);
    }

    let background = tokens.last().is_some_and(|t| t == "&");
    if background {
        tokens.pop();
    }
    if tokens.is_empty() {
        return Ok(CommandLine::Empty);
    }
    Ok(CommandLine::Simple {
        argv: tokens,
        background,
    })
}

fn pipe(left: Vec<String>, right: Vec<String>) -> Result<CommandLine, ShellError> {
    if left.is_empty() {
        return Err(ShellError::InvalidPipeline("missing command before '|'"));
    }
    if right.is_empty() {
        return Err(ShellError::InvalidPipeline("missing command after '|'"));
    }
    if right.iter().any(|t| t == "|") {
        return Err(ShellError::InvalidPipeline(
            "pipelines longer than two commands are not supported",
        ));
    }
    if right.last().is_some_and(|t| t == "&") {
        return Err(ShellError::InvalidPipeline(
            "background pipelines are not supported",
        ));
    }
    if redirect::has_operator(&left) || redirect::has_operator(&right) {
        return Err(ShellError::InvalidPipeline(
            "redirection inside a pipeline is not supported",
        ));
    }
    Ok(CommandLine::Pipe { left, right })
}
