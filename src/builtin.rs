use crate::interpreter::Interpreter;
use crate::parser::Builtin;
use anyhow::{anyhow, Context, Result};
use argh::{EarlyExit, FromArgs};
use std::io::Write;
use std::path::PathBuf;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed
/// directly in the shell process without spawning a child.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "fg" or "cd".
    fn name() -> &'static str;

    /// Executes the command against the shell state.
    ///
    /// Errors are reported by the caller; their text should start with the
    /// command name.
    fn execute(self, shell: &mut Interpreter, stdout: &mut dyn Write) -> Result<()>;
}

/// Parses `args` for `T` and runs it.
///
/// `--help` output goes to `stdout`, argument errors come back as `Err`.
fn run<T: BuiltinCommand>(
    shell: &mut Interpreter,
    args: &[String],
    stdout: &mut dyn Write,
) -> Result<()> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match T::from_args(&[T::name()], &args) {
        Ok(cmd) => cmd.execute(shell, stdout),
        Err(EarlyExit { output, status }) => match status {
            Ok(()) => {
                write!(stdout, "{output}")?;
                Ok(())
            }
            Err(()) => Err(anyhow!("{}", output.trim_end())),
        },
    }
}

/// Runs `builtin` with `args` against `shell`.
pub(crate) fn dispatch(
    builtin: Builtin,
    shell: &mut Interpreter,
    args: &[String],
    stdout: &mut dyn Write,
) -> Result<()> {
    match builtin {
        Builtin::Exit => run::<Exit>(shell, args, stdout),
        Builtin::Cd => run::<Cd>(shell, args, stdout),
        Builtin::Jobs => run::<Jobs>(shell, args, stdout),
        Builtin::Fg => run::<Fg>(shell, args, stdout),
        Builtin::Bg => run::<Bg>(shell, args, stdout),
    }
}

/// Accepts `N` or `%N`.
fn parse_job_id(command: &str, raw: Option<&str>) -> Result<u32> {
    let raw = raw.ok_or_else(|| anyhow!("{command}: usage: {command} %jid"))?;
    let digits = raw.strip_prefix('%').unwrap_or(raw);
    digits
        .parse()
        .map_err(|_| anyhow!("{command}: invalid job id '{raw}'"))
}

#[derive(FromArgs)]
/// Leave the shell.
pub struct Exit {
    #[argh(positional)]
    /// exit status of the shell process, 0 when omitted.
    pub code: Option<i32>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        Builtin::Exit.name()
    }

    fn execute(self, shell: &mut Interpreter, _stdout: &mut dyn Write) -> Result<()> {
        shell.request_exit(self.code.unwrap_or(0));
        Ok(())
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to, absolute or relative; $HOME when omitted.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        Builtin::Cd.name()
    }

    fn execute(self, shell: &mut Interpreter, _stdout: &mut dyn Write) -> Result<()> {
        let target = match self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => shell
                .env
                .get_var("HOME")
                .map(PathBuf::from)
                .ok_or_else(|| anyhow!("cd: HOME not set"))?,
        };

        std::env::set_current_dir(&target)
            .with_context(|| format!("cd: {}", target.display()))?;
        let cwd = shell.env.current_dir();
        shell.env.set_var("PWD", &cwd.to_string_lossy());
        Ok(())
    }
}

#[derive(FromArgs)]
/// List background jobs with their state.
pub struct Jobs {}

impl BuiltinCommand for Jobs {
    fn name() -> &'static str {
        Builtin::Jobs.name()
    }

    fn execute(self, shell: &mut Interpreter, stdout: &mut dyn Write) -> Result<()> {
        for job in shell.jobs.list() {
            writeln!(stdout, "{job}")?;
        }
        Ok(())
    }
}

#[derive(FromArgs)]
/// Resume a job and wait for it to finish.
pub struct Fg {
    #[argh(positional)]
    /// job id, optionally written as %N.
    pub job: Option<String>,
}

impl BuiltinCommand for Fg {
    fn name() -> &'static str {
        Builtin::Fg.name()
    }

    fn execute(self, shell: &mut Interpreter, _stdout: &mut dyn Write) -> Result<()> {
        let id = parse_job_id(Self::name(), self.job.as_deref())?;
        let code = shell
            .jobs
            .foreground(id)
            .map_err(|err| anyhow!("fg: {err}"))?;
        if let Some(code) = code {
            shell.last_status.set(code);
        }
        Ok(())
    }
}

#[derive(FromArgs)]
/// Resume a stopped job in the background.
pub struct Bg {
    #[argh(positional)]
    /// job id, optionally written as %N.
    pub job: Option<String>,
}

impl BuiltinCommand for Bg {
    fn name() -> &'static str {
        Builtin::Bg.name()
    }

    fn execute(self, shell: &mut Interpreter, _stdout: &mut dyn Write) -> Result<()> {
        let id = parse_job_id(Self::name(), self.job.as_deref())?;
        shell
            .jobs
            .background(id)
            .map_err(|err| anyhow!("bg: {err}"))
    }
}
