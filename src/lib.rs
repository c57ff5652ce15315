//! A small job-control shell for POSIX systems.
//!
//! Each input line goes through variable expansion ([`expand`]), tokenizing
//! ([`lexer`]) and classification ([`parser`]) before it is dispatched to a
//! builtin, a single program or a two-command pipe. Programs may be started in
//! the background with a trailing `&`; they are tracked in a bounded job table
//! ([`jobs`]) whose entries are updated asynchronously by a SIGCHLD handler.
//!
//! The main entry point is [`Interpreter`], which owns the shell state and
//! runs lines either interactively or from any buffered reader.

mod builtin;
pub mod command;
pub mod env;
pub mod error;
pub mod expand;
mod interpreter;
pub mod jobs;
pub mod lexer;
pub mod parser;
pub mod pipeline;
pub mod redirect;
pub mod signals;

/// Just a convenient re-export of the shell driver.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::Interpreter;
