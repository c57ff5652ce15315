//! End-to-end runs of the `jsh` binary with scripts fed on stdin.

use std::io::Write;
use std::process::{Command, Output, Stdio};

fn jsh() -> Command {
    Command::new(env!("CARGO_BIN_EXE_jsh"))
}

fn run_script_with(mut cmd: Command, script: &str) -> Output {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(script.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

fn run_script(script: &str) -> Output {
    run_script_with(jsh(), script)
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn output_redirection_then_input_redirection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.txt");
    let script = format!("echo hi > {p}\ncat < {p}\n", p = path.display());

    let output = run_script(&script);
    assert_eq!(stdout_of(&output), "hi\n");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "hi\n");
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn append_keeps_existing_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("log.txt");
    let script = format!(
        "echo one > {p}\necho two >> {p}\necho three >> {p}\n",
        p = path.display()
    );

    run_script(&script);
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "one\ntwo\nthree\n"
    );
}

#[test]
fn missing_input_file_fails_the_command_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.txt");
    let script = format!("cat < {}\necho $?\n", path.display());

    let output = run_script(&script);
    assert_eq!(stdout_of(&output), "1\n");
    assert!(stderr_of(&output).contains("absent.txt"));
}

#[test]
fn last_status_follows_foreground_commands() {
    let output = run_script("sh -c 'exit 3'\necho $?\necho $?\n");
    assert_eq!(stdout_of(&output), "3\n0\n");
}

#[test]
fn death_by_signal_is_offset_by_128() {
    let output = run_script("sh -c 'kill -9 $$'\necho $?\n");
    assert_eq!(stdout_of(&output), "137\n");
}

#[test]
fn unknown_program_reports_127() {
    let output = run_script("jsh-surely-not-a-real-program\necho $?\n");
    assert_eq!(stdout_of(&output), "127\n");
    assert!(stderr_of(&output).contains("exec failed: jsh-surely-not-a-real-program"));
}

#[test]
fn pipe_connects_two_programs() {
    let output = run_script("echo hello | tr a-z A-Z\n");
    assert_eq!(stdout_of(&output), "HELLO\n");
}

#[test]
fn pipe_status_comes_from_the_last_waited_child() {
    let output = run_script("false | true\necho $?\ntrue | false\necho $?\n");
    assert_eq!(stdout_of(&output), "0\n1\n");
}

#[test]
fn parse_errors_set_status_two() {
    let output = run_script("echo hi >\necho $?\nls | wc | cat\necho $?\n");
    assert_eq!(stdout_of(&output), "2\n2\n");
    assert!(stderr_of(&output).contains("missing filename"));
}

#[test]
fn variables_and_defaults_expand() {
    let mut cmd = jsh();
    cmd.env("JSH_GREETING", "hello").env_remove("JSH_MISSING");
    let script = "echo $JSH_GREETING \"${JSH_GREETING} world\" '$JSH_GREETING'\n\
                  echo ${JSH_MISSING:-fallback} [$JSH_MISSING]\n";

    let output = run_script_with(cmd, script);
    assert_eq!(
        stdout_of(&output),
        "hello hello world $JSH_GREETING\nfallback []\n"
    );
}

#[test]
fn pid_expansion_matches_the_shell() {
    let mut child = jsh()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    let pid = child.id();
    child.stdin.take().unwrap().write_all(b"echo $$\n").unwrap();
    let output = child.wait_with_output().unwrap();
    assert_eq!(stdout_of(&output), format!("{pid}\n"));
}

#[test]
fn background_job_is_listed_then_reported_done() {
    let output = run_script("sh -c 'sleep 0.3' &\njobs\nsleep 1\necho after\n");
    let stdout = stdout_of(&output);
    let lines: Vec<&str> = stdout.lines().collect();

    assert_eq!(lines.len(), 4, "{stdout}");
    assert!(lines[0].starts_with("[1] "), "{stdout}");
    assert!(lines[0][4..].parse::<u32>().is_ok(), "{stdout}");
    assert_eq!(lines[1], "[1] Running sh -c 'sleep 0.3' &");
    assert_eq!(lines[2], "[1] Done sh -c 'sleep 0.3' &");
    assert_eq!(lines[3], "after");
}

#[test]
fn background_job_does_not_change_last_status() {
    let output = run_script("sh -c 'exit 9' &\nsleep 0.3\necho $?\n");
    let stdout = stdout_of(&output);
    assert!(stdout.ends_with("\n0\n"), "{stdout}");
}

#[test]
fn fg_waits_and_collects_status() {
    let output = run_script("sh -c 'sleep 0.2; exit 6' &\nfg %1\necho $?\njobs\n");
    let stdout = stdout_of(&output);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2, "{stdout}");
    assert_eq!(lines[1], "6");
}

#[test]
fn fg_without_job_prints_usage() {
    let output = run_script("fg\nfg %4\n");
    let stderr = stderr_of(&output);
    assert!(stderr.contains("fg: usage: fg %jid"), "{stderr}");
    assert!(stderr.contains("fg: no such job 4"), "{stderr}");
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn cd_changes_where_programs_run() {
    let dir = tempfile::tempdir().unwrap();
    let script = format!("cd {}\necho inside > here.txt\n", dir.path().display());

    run_script(&script);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("here.txt")).unwrap(),
        "inside\n"
    );
}

#[test]
fn exit_uses_given_code_and_stops_reading() {
    let output = run_script("exit 5\necho unreachable\n");
    assert_eq!(output.status.code(), Some(5));
    assert_eq!(stdout_of(&output), "");
}

#[test]
fn end_of_input_exits_zero() {
    let output = run_script("sh -c 'exit 4'\n");
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn command_option_runs_one_line() {
    let output = jsh().args(["-c", "sh -c 'exit 4'"]).output().unwrap();
    assert_eq!(output.status.code(), Some(4));

    let output = jsh().args(["-c", "echo one two"]).output().unwrap();
    assert_eq!(stdout_of(&output), "one two\n");
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn full_job_table_refuses_new_background_jobs() {
    let mut script = "sleep 3 &\n".repeat(65);
    script.push_str("echo $?\njobs\n");

    let output = run_script(&script);
    let stdout = stdout_of(&output);
    let lines: Vec<&str> = stdout.lines().collect();

    assert!(stderr_of(&output).contains("jsh: job table full"));
    assert_eq!(lines.len(), 64 + 1 + 64, "{stdout}");
    assert!(lines[..64].iter().all(|l| l.starts_with('[')), "{stdout}");
    assert_eq!(lines[64], "1");
    assert_eq!(lines[65], "[1] Running sleep 3 &");
    assert_eq!(lines[128], "[64] Running sleep 3 &");
}

#[test]
fn fg_resumes_a_stopped_job() {
    let script = "sh -c 'kill -STOP $$; exit 5' &\nsleep 0.3\njobs\nfg %1\necho $?\njobs\n";

    let output = run_script(script);
    let stdout = stdout_of(&output);
    let lines: Vec<&str> = stdout.lines().collect();

    assert_eq!(lines.len(), 3, "{stdout}");
    assert_eq!(lines[1], "[1] Stopped sh -c 'kill -STOP $$; exit 5' &");
    assert_eq!(lines[2], "5");
}
