//! End-to-end tests against the `moxy` binary.
//!
//! Each test points `HOME` at a temp dir, launches the binary, and plays the
//! controller: it writes to the instance's FIFOs and inspects the files the
//! instance publishes.

use std::fs;
use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use moxy::core::exit_token::format_exit_token;
use moxy::core::layout::{CONFIG_FILE, InstancePaths};
use moxy::exit_codes;
use moxy::io::context::load_context;
use moxy::test_support::{TestHome, send_when_listening, wait_for_log_line, wait_for_path};
use wait_timeout::ChildExt;

const STEP_TIMEOUT: Duration = Duration::from_secs(10);

fn spawn_moxy(home: &TestHome, args: &[&str]) -> Child {
    Command::new(env!("CARGO_BIN_EXE_moxy"))
        .env("HOME", home.path())
        .env("MOXY_TEST_MARKER", "1")
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn moxy")
}

fn wait_exit(child: &mut Child) -> ExitStatus {
    match child.wait_timeout(STEP_TIMEOUT).expect("wait moxy") {
        Some(status) => status,
        None => {
            child.kill().expect("kill moxy");
            panic!("moxy did not exit within {STEP_TIMEOUT:?}");
        }
    }
}

fn read_all(stream: Option<impl Read>) -> Vec<u8> {
    let mut buf = Vec::new();
    stream
        .expect("piped stream")
        .read_to_end(&mut buf)
        .expect("read stream");
    buf
}

fn instance_paths(home: &TestHome, child: &Child) -> InstancePaths {
    home.instance_paths("moxy", child.id())
}

/// Drives a full instance lifetime.
///
/// 1. Feed real stdin, then close it.
/// 2. Write to the `stdout` and `stderr` channels.
/// 3. Send `"5 reason-text\n"` to `mox_exit`.
///
/// Expects exit code 5, relayed bytes on the real streams, captured stdin,
/// and a context snapshot that matches the launched process.
#[test]
fn controller_drives_streams_and_exit_code() {
    let home = TestHome::new().expect("home");
    let mut child = spawn_moxy(&home, &["alpha", "--beta"]);
    let paths = instance_paths(&home, &child);

    let mut stdin = child.stdin.take().expect("stdin");
    stdin.write_all(b"typed input\n").expect("write stdin");
    drop(stdin);

    send_when_listening(&paths.stdout_channel, b"relayed out\n", STEP_TIMEOUT)
        .expect("send stdout");
    send_when_listening(&paths.stderr_channel, b"relayed err\n", STEP_TIMEOUT)
        .expect("send stderr");
    let token = format_exit_token(5, Some("reason-text"));
    send_when_listening(&paths.exit_channel, token.as_bytes(), STEP_TIMEOUT).expect("send exit");

    let status = wait_exit(&mut child);
    assert_eq!(status.code(), Some(5));
    assert_eq!(read_all(child.stdout.take()), b"relayed out\n");
    assert_eq!(read_all(child.stderr.take()), b"relayed err\n");

    assert_eq!(
        fs::read(&paths.stdin_path).expect("read stdin capture"),
        b"typed input\n"
    );

    let record = load_context(&paths.context_path).expect("load context");
    assert_eq!(record.pid, child.id());
    assert_eq!(record.ppid, std::process::id());
    assert_eq!(&record.args[1..], ["alpha", "--beta"]);
    assert!(record.env.iter().any(|pair| pair == "MOXY_TEST_MARKER=1"));

    let log = fs::read_to_string(&paths.log_path).expect("read log");
    assert!(log.contains("waiting for exit"));
    assert!(log.contains("received exit token, exiting with code 5"));
}

#[test]
fn zero_token_exits_cleanly() {
    let home = TestHome::new().expect("home");
    let mut child = spawn_moxy(&home, &[]);
    let paths = instance_paths(&home, &child);

    send_when_listening(&paths.exit_channel, b"0\n", STEP_TIMEOUT).expect("send exit");

    assert_eq!(wait_exit(&mut child).code(), Some(0));
}

/// A non-numeric token is logged; the instance keeps waiting for a valid one.
#[test]
fn malformed_token_is_logged_then_valid_token_exits() {
    let home = TestHome::new().expect("home");
    let mut child = spawn_moxy(&home, &[]);
    let paths = instance_paths(&home, &child);

    send_when_listening(&paths.exit_channel, b"later please\n", STEP_TIMEOUT)
        .expect("send malformed");
    wait_for_log_line(&paths.log_path, "ignoring exit token", STEP_TIMEOUT)
        .expect("malformed token logged");
    assert!(child.try_wait().expect("try_wait").is_none());

    send_when_listening(&paths.exit_channel, b"3\n", STEP_TIMEOUT).expect("send exit");
    assert_eq!(wait_exit(&mut child).code(), Some(3));
}

/// A parent that never reads stdout must not keep the token from ending the
/// instance: the stuck relay is logged and left behind.
#[test]
fn unread_stdout_does_not_block_exit() {
    let home = TestHome::new().expect("home");
    fs::create_dir_all(home.base_dir()).expect("base dir");
    fs::write(home.base_dir().join(CONFIG_FILE), "shutdown_grace_ms = 300\n").expect("config");
    let mut child = spawn_moxy(&home, &[]);
    let paths = instance_paths(&home, &child);

    let flood = vec![b'x'; 96 * 1024];
    send_when_listening(&paths.stdout_channel, &flood, STEP_TIMEOUT).expect("send stdout");
    send_when_listening(&paths.exit_channel, b"7\n", STEP_TIMEOUT).expect("send exit");

    assert_eq!(wait_exit(&mut child).code(), Some(7));
    let log = fs::read_to_string(&paths.log_path).expect("read log");
    assert!(log.contains("stdout relay still busy at exit"), "log: {log}");
}

#[test]
fn unusable_home_fails_startup() {
    let home = TestHome::new().expect("home");
    let not_a_dir = home.path().join("home-file");
    fs::write(&not_a_dir, "").expect("write file");

    let mut child = Command::new(env!("CARGO_BIN_EXE_moxy"))
        .env("HOME", &not_a_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn moxy");

    let status = wait_exit(&mut child);
    assert_eq!(status.code(), Some(exit_codes::STARTUP_FAILURE));
    let stderr = String::from_utf8(read_all(child.stderr.take())).expect("utf8");
    assert!(stderr.contains("create instance dir"), "stderr: {stderr}");
}

#[test]
fn invalid_config_fails_startup() {
    let home = TestHome::new().expect("home");
    fs::create_dir_all(home.base_dir()).expect("base dir");
    fs::write(home.base_dir().join(CONFIG_FILE), "poll_interval_ms = 0\n").expect("config");

    let mut child = spawn_moxy(&home, &[]);
    let status = wait_exit(&mut child);
    assert_eq!(status.code(), Some(exit_codes::STARTUP_FAILURE));
    let stderr = String::from_utf8(read_all(child.stderr.take())).expect("utf8");
    assert!(stderr.contains("poll_interval_ms"), "stderr: {stderr}");
}

#[test]
fn instance_directory_exists_before_channels() {
    let home = TestHome::new().expect("home");
    let mut child = spawn_moxy(&home, &[]);
    let paths = instance_paths(&home, &child);

    wait_for_path(&paths.exit_channel, STEP_TIMEOUT).expect("exit channel");
    assert!(paths.dir.is_dir());
    assert!(paths.log_path.is_file());
    assert!(paths.context_path.is_file());

    send_when_listening(&paths.exit_channel, b"9\n", STEP_TIMEOUT).expect("send exit");
    assert_eq!(wait_exit(&mut child).code(), Some(9));
}
