use anyhow::Context;
use argh::FromArgs;
use job_shell::Interpreter;
use std::io::IsTerminal;

#[derive(FromArgs)]
/// A small job-control shell. Reads commands from the terminal, from stdin
/// or from a single -c argument.
struct Options {
    /// run this command line and exit with its status
    #[argh(option, short = 'c')]
    command: Option<String>,

    /// log dispatch and process events to stderr
    #[argh(switch, short = 'v')]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let options: Options = argh::from_env();

    let default_level = if options.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();

    let mut shell = Interpreter::new();
    shell
        .install_signal_handlers()
        .context("installing signal handlers")?;

    let code = if let Some(line) = options.command {
        let mut stdout = std::io::stdout();
        shell.execute_line(&line, &mut stdout);
        shell.exit_requested().unwrap_or_else(|| shell.last_status())
    } else if std::io::stdin().is_terminal() {
        shell.repl()?
    } else {
        let stdin = std::io::stdin();
        shell.run_batch(stdin.lock(), &mut std::io::stdout())?
    };
    log::debug!("exiting with {code}");
    std::process::exit(code)
}
