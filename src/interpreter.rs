use crate::builtin;
use crate::command::{ExitCode, LastStatus};
use crate::env::Environment;
use crate::error::ShellError;
use crate::expand::Expander;
use crate::jobs::{self, JobTable};
use crate::lexer;
use crate::parser::{self, CommandLine};
use crate::pipeline::{self, Outcome, Stage};
use crate::signals;
use anyhow::Context;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::{BufRead, Write};

/// A small job-control shell: expansion, tokenizing, builtins, pipes,
/// redirection and background jobs.
///
/// The interpreter owns all process-wide shell state: the environment view,
/// the job table and the last status. Only the job table's atomic slots are
/// shared, with the SIGCHLD handler installed by
/// [`Interpreter::install_signal_handlers`].
///
/// Example
/// ```no_run
/// use job_shell::Interpreter;
/// let mut sh = Interpreter::new();
/// sh.install_signal_handlers().unwrap();
/// sh.execute_line("echo hello > /tmp/greeting", &mut std::io::stdout());
/// assert_eq!(sh.last_status(), 0);
/// ```
pub struct Interpreter {
    pub(crate) env: Environment,
    pub(crate) jobs: JobTable,
    pub(crate) last_status: LastStatus,
    pid: u32,
    exit_code: Option<ExitCode>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            env: Environment::new(),
            jobs: JobTable::new(),
            last_status: LastStatus::default(),
            pid: std::process::id(),
            exit_code: None,
        }
    }

    /// Ignores SIGINT in the shell and starts reaping background jobs on SIGCHLD.
    pub fn install_signal_handlers(&self) -> Result<(), ShellError> {
        signals::ignore_interrupt()?;
        jobs::install_reaper(self.jobs.shared())
    }

    pub fn last_status(&self) -> ExitCode {
        self.last_status.get()
    }

    /// The code passed to `exit`, once the `exit` builtin has run.
    pub fn exit_requested(&self) -> Option<ExitCode> {
        self.exit_code
    }

    pub(crate) fn request_exit(&mut self, code: ExitCode) {
        self.exit_code = Some(code);
    }

    /// Expands, tokenizes and strips quotes, producing the final argument list.
    pub fn split_line(&self, line: &str) -> Vec<String> {
        let expanded = Expander::new(&self.env, self.pid, self.last_status.get()).expand(line);
        let mut tokens = lexer::split_into_tokens(&expanded);
        lexer::strip_quotes(&mut tokens);
        tokens
    }

    /// Reclaims finished background jobs and announces them on `out`.
    pub fn report_finished_jobs(&mut self, out: &mut dyn Write) {
        for job in self.jobs.sweep() {
            let _ = writeln!(out, "{job}");
        }
    }

    /// Runs one input line. Errors are reported on stderr; none escape.
    pub fn execute_line(&mut self, line: &str, out: &mut dyn Write) {
        self.report_finished_jobs(out);

        let line = line.strip_suffix('\n').unwrap_or(line);
        if line.trim_matches([' ', '\t']).is_empty() {
            return;
        }

        let command = match parser::classify(self.split_line(line)) {
            Ok(command) => command,
            Err(err) => return self.abort(err),
        };
        log::debug!("dispatching {command:?}");

        match command {
            CommandLine::Empty => {}
            CommandLine::Builtin { builtin, args } => {
                if let Err(err) = builtin::dispatch(builtin, self, &args, out) {
                    eprintln!("{err:#}");
                }
            }
            CommandLine::Pipe { left, right } => {
                if let Err(err) = self.run_pipe(left, right) {
                    self.abort(err);
                }
            }
            CommandLine::Simple { argv, background } => {
                if let Err(err) = self.run_single(argv, background, line, out) {
                    self.abort(err);
                }
            }
        }
        let _ = out.flush();
    }

    fn run_pipe(&mut self, left: Vec<String>, right: Vec<String>) -> Result<(), ShellError> {
        let left = Stage::prepare(left)?;
        let right = Stage::prepare(right)?;
        if let Some(code) = pipeline::run_pipe(&left, &right)? {
            self.last_status.set(code);
        }
        Ok(())
    }

    fn run_single(
        &mut self,
        argv: Vec<String>,
        background: bool,
        line: &str,
        out: &mut dyn Write,
    ) -> Result<(), ShellError> {
        let stage = Stage::prepare(argv)?;
        let _ = out.flush();
        match pipeline::run_single(&stage, background, &mut self.jobs, line.trim())? {
            Outcome::Background { id, pid } => {
                let _ = writeln!(out, "[{id}] {pid}");
            }
            Outcome::Foreground(Some(code)) => self.last_status.set(code),
            Outcome::Foreground(None) => {}
        }
        Ok(())
    }

    fn abort(&mut self, err: ShellError) {
        eprintln!("jsh: {err}");
        self.last_status.set(err.status());
    }

    /// Interactive loop with line editing, prompting with the working directory.
    ///
    /// Returns the exit code the shell should terminate with.
    pub fn repl(&mut self) -> anyhow::Result<ExitCode> {
        let mut rl = DefaultEditor::new().context("cannot initialise line editor")?;
        let mut stdout = std::io::stdout();

        while self.exit_code.is_none() {
            self.report_finished_jobs(&mut stdout);
            let prompt = format!("{} $ ", self.env.current_dir().display());
            match rl.readline(&prompt) {
                Ok(line) => {
                    let _ = rl.add_history_entry(line.as_str());
                    self.execute_line(&line, &mut stdout);
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(err) => return Err(err).context("reading input"),
            }
        }
        Ok(self.exit_code.unwrap_or(0))
    }

    /// Reads commands from `input` until EOF or `exit`, without a prompt.
    pub fn run_batch(
        &mut self,
        mut input: impl BufRead,
        out: &mut dyn Write,
    ) -> anyhow::Result<ExitCode> {
        let mut buf = Vec::new();
        while self.exit_code.is_none() {
            buf.clear();
            if input.read_until(b'\n', &mut buf).context("reading input")? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            self.execute_line(&line, out);
        }
        Ok(self.exit_code.unwrap_or(0))
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
