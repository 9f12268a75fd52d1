#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use filetime::{FileTime, set_file_times};

pub const HOUR: Duration = Duration::from_secs(3600);

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

pub fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_logwarden") {
        return PathBuf::from(path);
    }

    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join("logwarden"));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve logwarden binary path for integration test"),
    }
}

/// Base command with the activity log disabled and env overrides cleared.
pub fn base_command() -> Command {
    let mut cmd = Command::new(resolve_bin_path());
    cmd.env("LOGWARDEN_ACTIVITY_LOG", "")
        .env_remove("LOGWARDEN_LOW_WATER_PCT")
        .env_remove("LOGWARDEN_HIGH_WATER_PCT")
        .env_remove("LOGWARDEN_MIN_FILE_AGE_SECS")
        .env_remove("LOGWARDEN_RELOAD_INTERVAL_SECS")
        .env_remove("LOGWARDEN_CHECK_INTERVAL_SECS")
        .env("RUST_BACKTRACE", "1");
    cmd
}

/// Run the binary to completion and keep a transcript under the temp dir.
pub fn run_cli_case(case_name: &str, args: &[&str], envs: &[(&str, &str)]) -> CmdResult {
    let mut cmd = base_command();
    cmd.args(args);
    for (key, value) in envs {
        cmd.env(key, value);
    }
    let output = cmd.output().expect("execute logwarden");
    record(case_name, args, output.status, &output.stdout, &output.stderr)
}

fn record(case_name: &str, args: &[&str], status: ExitStatus, stdout: &[u8], stderr: &[u8]) -> CmdResult {
    let root = std::env::temp_dir().join("logwarden-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");
    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));

    let stdout = String::from_utf8_lossy(stdout).to_string();
    let stderr = String::from_utf8_lossy(stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={status}\n"));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push_str("\n----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status,
        stdout,
        stderr,
        log_path,
    }
}

/// Wait for `child` to exit, killing it after `timeout`.
pub fn wait_with_timeout(case_name: &str, mut child: Child, timeout: Duration) -> CmdResult {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if child.try_wait().expect("poll child").is_some() {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    if child.try_wait().expect("poll child").is_none() {
        let _ = child.kill();
    }
    let output = child.wait_with_output().expect("collect child output");
    record(case_name, &[], output.status, &output.stdout, &output.stderr)
}

/// Spawn the binary with captured output.
pub fn spawn_daemon(args: &[&str], envs: &[(&str, &str)]) -> Child {
    let mut cmd = base_command();
    cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
    for (key, value) in envs {
        cmd.env(key, value);
    }
    cmd.spawn().expect("spawn logwarden")
}

/// Poll until `path` contains `needle` or `timeout` passes.
pub fn wait_for_contents(path: &Path, needle: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if fs::read_to_string(path).is_ok_and(|contents| contents.contains(needle)) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    false
}

/// Write a small file whose mtime and atime are both `age` in the past.
pub fn write_aged(path: &Path, age: Duration) {
    write_aged_split(path, age, age);
}

pub fn write_aged_split(path: &Path, mtime_age: Duration, atime_age: Duration) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, b"2024-01-01 INFO request served\n").expect("write log file");
    let now = SystemTime::now();
    set_file_times(
        path,
        FileTime::from_system_time(now - atime_age),
        FileTime::from_system_time(now - mtime_age),
    )
    .expect("set file times");
}

/// Mount-table text with a root device plus one device per extra mount point.
pub fn mount_table(extra: &[&Path]) -> String {
    let mut out = String::from("/dev/sda1 / ext4 rw,relatime 0 0\nproc /proc proc rw 0 0\n");
    for (i, mount) in extra.iter().enumerate() {
        out.push_str(&format!("/dev/sd{} {} ext4 rw 0 0\n", (b'b' + i as u8) as char, mount.display()));
    }
    out
}

/// Create `<proc_root>/<pid>/fd/<n>` symlinks pointing at `targets`.
pub fn fake_process(proc_root: &Path, pid: u32, targets: &[&Path]) {
    let fd_dir = proc_root.join(pid.to_string()).join("fd");
    fs::create_dir_all(&fd_dir).expect("create fake fd dir");
    for (n, target) in targets.iter().enumerate() {
        std::os::unix::fs::symlink(target, fd_dir.join((n + 3).to_string()))
            .expect("create fake fd link");
    }
}
