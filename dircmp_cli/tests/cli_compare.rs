use assert_cmd::Command as AssertCommand;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn dircmp_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_dircmp_cli"))
}

struct TestFixture {
    _temp: TempDir,
    left: PathBuf,
    right: PathBuf,
}

impl TestFixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let left = temp.path().join("left");
        let right = temp.path().join("right");
        fs::create_dir(&left).unwrap();
        fs::create_dir(&right).unwrap();
        Self {
            _temp: temp,
            left,
            right,
        }
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    /// a.txt differs, sub/b.txt and tmp/c.txt are left only, d.txt is right only
    fn with_scenario(self) -> Self {
        Self::write(&self.left, "a.txt", "left version");
        Self::write(&self.right, "a.txt", "right");
        Self::write(&self.left, "sub/b.txt", "only left");
        Self::write(&self.left, "tmp/c.txt", "scratch");
        Self::write(&self.right, "d.txt", "only right");
        Self::write(&self.left, "same.txt", "identical");
        Self::write(&self.right, "same.txt", "identical");
        self
    }
}

#[test]
fn test_compare_json_output() {
    let fixture = TestFixture::new().with_scenario();

    let output = Command::new(dircmp_bin())
        .arg("compare")
        .arg(&fixture.left)
        .arg(&fixture.right)
        .arg("--json")
        .output()
        .expect("Failed to execute dircmp");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("Invalid JSON output");

    assert_eq!(json["only_left_files"], serde_json::json!(["sub/b.txt", "tmp/c.txt"]));
    assert_eq!(json["only_left_dirs"], serde_json::json!(["sub", "tmp"]));
    assert_eq!(json["only_right_files"], serde_json::json!(["d.txt"]));
    assert_eq!(json["common_files"], 2);

    let divergent = json["divergent"].as_array().unwrap();
    assert_eq!(divergent.len(), 1);
    assert_eq!(divergent[0]["path"], "a.txt");
    assert_eq!(divergent[0]["size"], "Larger");
    assert_eq!(divergent[0]["left"]["size"], 12);
    assert_eq!(divergent[0]["right"]["size"], 5);
}

#[test]
fn test_compare_text_report() {
    let fixture = TestFixture::new().with_scenario();

    let output = Command::new(dircmp_bin())
        .arg("compare")
        .arg(&fixture.left)
        .arg(&fixture.right)
        .output()
        .expect("Failed to execute dircmp");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("File a.txt:"));
    assert!(stdout.contains("Size: 0.00 MB"));
    assert!(stdout.contains("Only in right (1):"));
    assert!(!stdout.contains("File same.txt:"));
}

#[test]
fn test_compare_missing_root_fails() {
    let fixture = TestFixture::new();

    let output = Command::new(dircmp_bin())
        .arg("compare")
        .arg(fixture.left.join("nope"))
        .arg(&fixture.right)
        .output()
        .expect("Failed to execute dircmp");

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
}

#[test]
fn test_sync_both_directions() {
    let fixture = TestFixture::new().with_scenario();

    AssertCommand::new(dircmp_bin())
        .arg("sync")
        .arg(&fixture.left)
        .arg(&fixture.right)
        .assert()
        .success();

    assert_eq!(fs::read_to_string(fixture.left.join("d.txt")).unwrap(), "only right");
    assert_eq!(fs::read_to_string(fixture.right.join("sub/b.txt")).unwrap(), "only left");
    assert_eq!(fs::read_to_string(fixture.right.join("tmp/c.txt")).unwrap(), "scratch");

    // Divergent files are reported, never overwritten
    assert_eq!(fs::read_to_string(fixture.right.join("a.txt")).unwrap(), "right");
}

#[test]
fn test_sync_right_with_avoid_dir() {
    let fixture = TestFixture::new().with_scenario();

    let output = Command::new(dircmp_bin())
        .arg("sync")
        .arg(&fixture.left)
        .arg(&fixture.right)
        .args(["--direction", "right", "--avoid-dir", "tmp", "--json"])
        .output()
        .expect("Failed to execute dircmp");

    assert!(output.status.success());
    assert!(fixture.right.join("sub/b.txt").exists());
    assert!(!fixture.right.join("tmp").exists());
    assert!(!fixture.left.join("d.txt").exists());

    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("Invalid JSON output");
    let passes = json["passes"].as_array().unwrap();
    assert_eq!(passes.len(), 1);
    assert_eq!(passes[0]["copied_files"], serde_json::json!(["sub/b.txt"]));
    assert_eq!(json["stale"], serde_json::json!([]));
}

#[test]
fn test_sync_avoid_file() {
    let fixture = TestFixture::new().with_scenario();

    AssertCommand::new(dircmp_bin())
        .arg("sync")
        .arg(&fixture.left)
        .arg(&fixture.right)
        .args(["--direction", "left", "--avoid-file", "d.txt"])
        .assert()
        .success();

    assert!(!fixture.left.join("d.txt").exists());
}

#[test]
fn test_sync_dry_run_writes_nothing() {
    let fixture = TestFixture::new().with_scenario();

    let output = Command::new(dircmp_bin())
        .arg("sync")
        .arg(&fixture.left)
        .arg(&fixture.right)
        .arg("--dry-run")
        .output()
        .expect("Failed to execute dircmp");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[dry run]"));
    assert!(stdout.contains("sub/b.txt"));

    assert!(!fixture.left.join("d.txt").exists());
    assert!(!fixture.right.join("sub").exists());
}

#[test]
fn test_sync_missing_root_fails() {
    let fixture = TestFixture::new();

    AssertCommand::new(dircmp_bin())
        .arg("sync")
        .arg(&fixture.left)
        .arg(fixture.right.join("missing"))
        .assert()
        .failure()
        .code(1);
}

#[test]
fn test_sync_preserves_mtime_and_ignores_it_on_compare() {
    let fixture = TestFixture::new();
    TestFixture::write(&fixture.right, "pinned.txt", "content");
    let pinned = filetime::FileTime::from_unix_time(1_600_000_000, 0);
    filetime::set_file_mtime(fixture.right.join("pinned.txt"), pinned).unwrap();

    AssertCommand::new(dircmp_bin())
        .arg("sync")
        .arg(&fixture.left)
        .arg(&fixture.right)
        .args(["--direction", "left"])
        .assert()
        .success();

    let copied = fs::metadata(fixture.left.join("pinned.txt")).unwrap();
    assert_eq!(filetime::FileTime::from_last_modification_time(&copied), pinned);

    // Touch the copy; same bytes and permissions must still compare equal
    let later = filetime::FileTime::from_unix_time(1_700_000_000, 0);
    filetime::set_file_mtime(fixture.left.join("pinned.txt"), later).unwrap();

    let output = Command::new(dircmp_bin())
        .arg("compare")
        .arg(&fixture.left)
        .arg(&fixture.right)
        .arg("--json")
        .output()
        .expect("Failed to execute dircmp");

    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("Invalid JSON output");
    assert_eq!(json["common_files"], 1);
    assert_eq!(json["divergent"], serde_json::json!([]));
}
