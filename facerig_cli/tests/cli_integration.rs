use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use assert_cmd::Command;
use tempfile::{TempDir, tempdir};

// Short timings so sim runs finish quickly
fn write_fast_config(dir: &TempDir) -> PathBuf {
    let library = dir.path().join("scripts.json");
    let toml = format!(
        r#"
[link]
ack_timeout_ms = 50
probe_timeout_ms = 50
probe_attempts = 1
settle_after_open_ms = 0

[script]
settle_ms = 10
slice_ms = 10
neutral_settle_ms = 10
library = "{}"

[safety]
jaw_margin_deg = 2
"#,
        library.display()
    );
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn facerig(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("facerig").unwrap();
    cmd.arg("--config")
        .arg(write_fast_config(dir))
        .arg("--store")
        .arg(dir.path().join("servo_config.json"));
    cmd
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    path
}

fn last_json_line(stderr: &[u8]) -> serde_json::Value {
    let text = String::from_utf8_lossy(stderr);
    let line = text
        .lines()
        .rev()
        .find(|l| l.contains("\"reason\""))
        .unwrap_or_else(|| panic!("no JSON error line in: {text}"));
    serde_json::from_str(line).unwrap()
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["--sim", "move", "--channel", "11", "--angle", "30"], 0, "11->30", "stdout")]
#[case(&["--sim", "status"], 0, "STATUS", "stdout")]
#[case(&["--sim", "help-device"], 0, "JS<angle>", "stdout")]
#[case(&["--sim", "reset"], 0, "neutral", "stdout")]
#[case(&["self-check"], 0, "self-check ok", "stdout")]
#[case(&["move", "--channel", "3", "--angle", "40"], 1, "use --sim", "stderr")]
#[case(&["move", "--channel", "3"], 2, "required", "stderr")]
#[case(&["--sim", "move", "--channel", "16", "--angle", "40"], 1, "Channel 16 does not exist", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let mut cmd = facerig(&dir);
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
fn run_completes_and_reports_summary() {
    let dir = tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "wave.txt",
        "# wave\n舵机11 30\n延时 20\n舵机0 120\n舵机99 10\n",
    );

    facerig(&dir)
        .arg("--sim")
        .arg("run")
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("script complete: 2 moves, 1 delays, 1 skipped"));
}

#[rstest]
fn run_json_summary_is_parseable() {
    let dir = tempdir().unwrap();
    let script = write_script(dir.path(), "one.txt", "舵机12 100\n");

    let out = facerig(&dir)
        .arg("--sim")
        .arg("--json")
        .arg("run")
        .arg(&script)
        .output()
        .unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    let v: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(v["script"], "complete");
    assert_eq!(v["moves"], 1);
}

#[rstest]
fn run_refuses_script_without_steps() {
    let dir = tempdir().unwrap();
    let script = write_script(dir.path(), "empty.txt", "# nothing\n\n");

    facerig(&dir)
        .arg("--sim")
        .arg("run")
        .arg(&script)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no motion or delay lines"));
}

#[rstest]
fn check_lists_skipped_lines_and_fails() {
    let dir = tempdir().unwrap();
    let script = write_script(dir.path(), "bad.txt", "舵机3 90\n舵机3 200\n延时 abc\n");

    facerig(&dir)
        .arg("check")
        .arg(&script)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("line 2"))
        .stdout(predicate::str::contains("line 3"))
        .stderr(predicate::str::contains("2 warning(s)"));
}

#[rstest]
fn check_clean_script_reports_duration() {
    let dir = tempdir().unwrap();
    let script = write_script(dir.path(), "ok.txt", "舵机3 90\n延时 500\n");

    facerig(&dir)
        .arg("check")
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 motion lines, 500 ms of delays"));
}

#[rstest]
fn json_errors_carry_reason_and_code() {
    let dir = tempdir().unwrap();
    let out = facerig(&dir)
        .arg("--sim")
        .arg("--json")
        .arg("move")
        .arg("--channel")
        .arg("20")
        .arg("--angle")
        .arg("10")
        .output()
        .unwrap();

    assert_eq!(out.status.code(), Some(1));
    let v = last_json_line(&out.stderr);
    assert_eq!(v["reason"], "UnknownChannel");
    assert_eq!(v["exit_code"], 1);
}

#[rstest]
fn cli_reports_bad_calibration_header() {
    let dir = tempdir().unwrap();
    let bad_csv = dir.path().join("calib.csv");
    let mut f = fs::File::create(&bad_csv).unwrap();
    writeln!(f, "id,low,high").unwrap();
    writeln!(f, "0,10,170").unwrap();

    facerig(&dir)
        .arg("--calibration")
        .arg(&bad_csv)
        .arg("self-check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid headers"));
}

#[rstest]
fn calibration_csv_import_persists_to_store() {
    let dir = tempdir().unwrap();
    let csv = dir.path().join("calib.csv");
    fs::write(&csv, "channel,min,max,mid\n5,40,140,100\n").unwrap();

    facerig(&dir)
        .arg("--calibration")
        .arg(&csv)
        .arg("calibrate")
        .arg("--channel")
        .arg("5")
        .arg("--field")
        .arg("mid")
        .arg("--value")
        .arg("95")
        .assert()
        .success()
        .stdout(predicate::str::contains("window 40..140 mid 95"));

    let store = fs::read_to_string(dir.path().join("servo_config.json")).unwrap();
    let v: serde_json::Value = serde_json::from_str(&store).unwrap();
    assert_eq!(v["servo_5_min"], 40);
    assert_eq!(v["servo_5_mid"], 95);
}

#[rstest]
fn reset_window_reopens_full_range() {
    let dir = tempdir().unwrap();
    facerig(&dir)
        .args(["calibrate", "--channel", "9", "--field", "max", "--value", "120"])
        .assert()
        .success();

    facerig(&dir)
        .args(["reset-window", "--channel", "9"])
        .assert()
        .success();

    facerig(&dir)
        .args(["calibrate", "--channel", "9", "--field", "mid", "--value", "170"])
        .assert()
        .success()
        .stdout(predicate::str::contains("window 0..180 mid 170"));
}

#[rstest]
fn generate_writes_expression_walkthrough() {
    let dir = tempdir().unwrap();
    facerig(&dir)
        .arg("generate")
        .assert()
        .success()
        .stdout(predicate::str::contains("舵机0 "))
        .stdout(predicate::str::contains("延时 "));

    let out = dir.path().join("faces.txt");
    facerig(&dir).arg("generate").arg("--out").arg(&out).assert().success();
    let text = fs::read_to_string(&out).unwrap();
    assert!(text.lines().any(|l| l.starts_with("舵机2 ")));
}

#[rstest]
fn library_save_list_and_run_named() {
    let dir = tempdir().unwrap();
    let script = write_script(dir.path(), "nod.txt", "舵机11 60\n延时 10\n");

    facerig(&dir)
        .args(["library", "save", "nod"])
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("saved 'nod'"));

    facerig(&dir)
        .args(["library", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nod"));

    facerig(&dir)
        .args(["--sim", "run", "--named", "nod"])
        .assert()
        .success()
        .stdout(predicate::str::contains("script complete"));

    facerig(&dir)
        .args(["--sim", "run", "--named", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no script named 'missing'"));
}

#[rstest]
fn live_reads_stdin_lines() {
    let dir = tempdir().unwrap();
    facerig(&dir)
        .args(["--sim", "--json", "live"])
        .write_stdin("11 10\n11 20\n11 45\nnot a line\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"currents\""));
}
