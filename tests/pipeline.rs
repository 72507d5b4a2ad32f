use minershell::{Interpreter, Outcome, PipelineStatus, ShellError, StageStatus};
use nix::sys::signal::Signal;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

// Every test forks, and some change the working directory.
fn lock_process() -> MutexGuard<'static, ()> {
    static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
    MUTEX
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn make_unique_temp_dir(tag: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("minershell_it_{}_{}_{}", tag, std::process::id(), nanos));
    fs::create_dir_all(&dir).expect("failed to create temp dir");
    dir
}

fn open_pipe_descriptors() -> usize {
    fs::read_dir("/proc/self/fd")
        .unwrap()
        .filter_map(|entry| fs::read_link(entry.ok()?.path()).ok())
        .filter(|target| target.to_string_lossy().starts_with("pipe:"))
        .count()
}

fn pipeline_status(outcome: Outcome) -> PipelineStatus {
    match outcome {
        Outcome::Pipeline(status) => status,
        other => panic!("expected a pipeline, got {other:?}"),
    }
}

fn codes(status: &PipelineStatus) -> Vec<i32> {
    status.stages().iter().map(|s| s.status.code()).collect()
}

#[test]
fn data_flows_through_every_stage() {
    let _lock = lock_process();
    let dir = make_unique_temp_dir("flow");
    let out = dir.join("count.txt");

    let mut sh = Interpreter::default();
    let status = pipeline_status(sh.execute_line(&format!("echo abc | wc -c > {}", out.display())).unwrap());
    assert!(status.success());
    assert_eq!(status.stages().len(), 2);
    assert_eq!(fs::read_to_string(&out).unwrap().trim(), "4");
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn large_input_survives_two_pipes() {
    let _lock = lock_process();
    let dir = make_unique_temp_dir("large");
    let input = dir.join("big.txt");
    let out = dir.join("copy.txt");
    let data: String = (0..50_000).map(|i| format!("line {i}\n")).collect();
    fs::write(&input, &data).unwrap();

    let mut sh = Interpreter::default();
    let line = format!("cat < {} | cat | cat > {}", input.display(), out.display());
    let status = pipeline_status(sh.execute_line(&line).unwrap());
    assert!(status.success());
    assert_eq!(fs::read_to_string(&out).unwrap(), data);
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn binary_data_passes_unchanged() {
    let _lock = lock_process();
    let dir = make_unique_temp_dir("binary");
    let input = dir.join("in.bin");
    let out = dir.join("out.bin");
    let mut data: Vec<u8> = (0..=255u8).cycle().take(256 * 1024).collect();
    data.extend_from_slice(&[0, 0, 0xff, 0xfe, 0xc3, 0x28, b'\n', 0x80]);
    fs::write(&input, &data).unwrap();

    let mut sh = Interpreter::default();
    let line = format!("cat < {} | cat > {}", input.display(), out.display());
    let status = pipeline_status(sh.execute_line(&line).unwrap());
    assert!(status.success());
    assert_eq!(fs::read(&out).unwrap(), data);
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn file_redirection_replaces_the_pipe() {
    let _lock = lock_process();
    let dir = make_unique_temp_dir("precedence");
    let input = dir.join("in.txt");
    let mid = dir.join("mid.txt");
    let out = dir.join("out.txt");
    fs::write(&input, "from file\n").unwrap();

    let mut sh = Interpreter::default();
    let line = format!("echo from pipe | cat < {} | cat > {}", input.display(), out.display());
    pipeline_status(sh.execute_line(&line).unwrap());
    assert_eq!(fs::read_to_string(&out).unwrap(), "from file\n");

    let line = format!("echo hi > {} | cat > {}", mid.display(), out.display());
    let status = pipeline_status(sh.execute_line(&line).unwrap());
    assert!(status.success());
    assert_eq!(fs::read_to_string(&mid).unwrap(), "hi\n");
    assert_eq!(fs::read_to_string(&out).unwrap(), "");
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn output_file_is_truncated() {
    let _lock = lock_process();
    let dir = make_unique_temp_dir("truncate");
    let out = dir.join("out.txt");
    fs::write(&out, "a much longer previous content\n").unwrap();

    let mut sh = Interpreter::default();
    sh.execute_line(&format!("echo short > {}", out.display())).unwrap();
    assert_eq!(fs::read_to_string(&out).unwrap(), "short\n");
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn no_pipe_descriptor_outlives_its_line() {
    let _lock = lock_process();
    let dir = make_unique_temp_dir("fds");
    let out = dir.join("out.txt");
    let before = open_pipe_descriptors();

    let mut sh = Interpreter::default();
    let line = format!("echo one two three | cat | sort | wc -w > {}", out.display());
    let status = pipeline_status(sh.execute_line(&line).unwrap());
    assert!(status.success());
    assert_eq!(status.stages().len(), 4);
    assert_eq!(fs::read_to_string(&out).unwrap().trim(), "3");

    assert_eq!(open_pipe_descriptors(), before);
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn failing_stage_does_not_take_the_pipeline_down() {
    let _lock = lock_process();
    let dir = make_unique_temp_dir("isolation");
    let out = dir.join("out.txt");
    let after = dir.join("after.txt");

    let mut sh = Interpreter::default();
    let line = format!("echo a | no-such-program-anywhere | wc -c > {}", out.display());
    let status = pipeline_status(sh.execute_line(&line).unwrap());
    let stage_codes = codes(&status);
    assert_eq!(stage_codes.len(), 3);
    assert_eq!(stage_codes[1], 127);
    assert_eq!(stage_codes[2], 0);
    assert_eq!(fs::read_to_string(&out).unwrap().trim(), "0");

    sh.execute_line(&format!("echo still here > {}", after.display())).unwrap();
    assert_eq!(fs::read_to_string(&after).unwrap(), "still here\n");
    assert!(!sh.should_exit());
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn writer_into_a_closed_pipe_dies_of_sigpipe() {
    let _lock = lock_process();
    let dir = make_unique_temp_dir("sigpipe");
    let out = dir.join("first.txt");

    let mut sh = Interpreter::default();
    let status = pipeline_status(sh.execute_line(&format!("yes | head -n 1 > {}", out.display())).unwrap());
    assert_eq!(status.stages()[0].status, StageStatus::Signaled(Signal::SIGPIPE));
    assert_eq!(status.last_code(), 0);
    assert_eq!(fs::read_to_string(&out).unwrap(), "y\n");
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn line_waits_for_slow_stages() {
    let _lock = lock_process();
    let mut sh = Interpreter::default();
    let started = std::time::Instant::now();
    let status = pipeline_status(sh.execute_line("sleep 1 | true").unwrap());
    assert!(started.elapsed() >= std::time::Duration::from_secs(1));
    assert_eq!(codes(&status), vec![0, 0]);
}

#[test]
fn same_line_twice_gives_the_same_result() {
    let _lock = lock_process();
    let dir = make_unique_temp_dir("idempotent");
    let input = dir.join("in.txt");
    let out = dir.join("out.txt");
    fs::write(&input, "b\nc\na\n").unwrap();

    let mut sh = Interpreter::default();
    let line = format!("sort < {} | cat > {}", input.display(), out.display());
    let first = pipeline_status(sh.execute_line(&line).unwrap());
    let first_output = fs::read_to_string(&out).unwrap();
    let second = pipeline_status(sh.execute_line(&line).unwrap());
    let second_output = fs::read_to_string(&out).unwrap();

    assert_eq!(codes(&first), codes(&second));
    assert_eq!(first_output, "a\nb\nc\n");
    assert_eq!(first_output, second_output);
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn cd_is_visible_to_later_lines() {
    let _lock = lock_process();
    let orig = std::env::current_dir().unwrap();
    let target = make_unique_temp_dir("cd_target");
    let canonical = fs::canonicalize(&target).unwrap();
    let out = target.join("pwd.txt");

    let mut sh = Interpreter::default();
    assert_eq!(
        sh.execute_line(&format!("cd {}", target.display())).unwrap(),
        Outcome::InProcess(0)
    );
    sh.execute_line("pwd > pwd.txt").unwrap();
    let printed = fs::read_to_string(&out);
    sh.execute_line("env > env.txt").unwrap();
    let environment = fs::read_to_string(target.join("env.txt"));

    std::env::set_current_dir(orig).unwrap();
    assert_eq!(printed.unwrap().trim_end(), canonical.to_string_lossy());
    let expected_pwd = format!("PWD={}", canonical.to_string_lossy());
    assert!(environment.unwrap().lines().any(|l| l == expected_pwd));
    let _ = fs::remove_dir_all(target);
}

#[test]
fn cd_to_missing_directory_fails_without_moving() {
    let _lock = lock_process();
    let orig = std::env::current_dir().unwrap();

    let mut sh = Interpreter::default();
    assert_eq!(
        sh.execute_line("cd /definitely/not/a/dir").unwrap(),
        Outcome::InProcess(1)
    );
    assert_eq!(std::env::current_dir().unwrap(), orig);
}

#[test]
fn syntax_errors_start_no_process() {
    let _lock = lock_process();
    let mut sh = Interpreter::default();
    for line in ["| wc", "echo a |", "echo a | | wc", "< in.txt"] {
        assert!(
            matches!(sh.execute_line(line), Err(ShellError::EmptyPipelineStage { .. })),
            "line {line:?}"
        );
    }
    assert!(matches!(
        sh.execute_line("echo a >"),
        Err(ShellError::MissingRedirectionTarget { .. })
    ));
    assert_eq!(sh.execute_line("   ").unwrap(), Outcome::Empty);
}

#[test]
fn exit_stops_the_interpreter() {
    let _lock = lock_process();
    let mut sh = Interpreter::default();
    assert!(!sh.should_exit());
    sh.execute_line("exit").unwrap();
    assert!(sh.should_exit());
    assert_eq!(sh.exit_code(), 0);
}

#[test]
fn binary_runs_a_single_line() {
    let _lock = lock_process();
    let output = Command::new(env!("CARGO_BIN_EXE_minershell"))
        .args(["-c", "echo hi | wc -c"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "3");

    let output = Command::new(env!("CARGO_BIN_EXE_minershell"))
        .args(["-c", "exit 3"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));

    let output = Command::new(env!("CARGO_BIN_EXE_minershell"))
        .args(["-c", "echo a | | wc"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("stage 2 is empty"));
}
