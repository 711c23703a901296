use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

fn cproof_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("cproof");
    path
}

fn setup_test_env() -> (TempDir, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in [
        (
            "shop-main/src/cart.py",
            "class Cart:\n    def total(self):\n        return sum(self.items)\n",
        ),
        ("shop-main/src/api/routes.py", "def checkout(cart):\n    return cart.total()\n"),
        ("shop-main/README.md", "# Shop\nCheckout flow lives in routes.\n"),
        ("shop-main/node_modules/lib/index.js", "module.exports = {}\n"),
        ("shop-main/static/logo.png", "png"),
    ] {
        writer.start_file(name, SimpleFileOptions::default()).unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    let zip_path = root.join("shop.zip");
    fs::write(&zip_path, writer.finish().unwrap().into_inner()).unwrap();

    let config_content = format!(
        r#"[limits]
context_max_chars = 40000

[store]
dir = "{}/store"

[engine]
api_key_env = "CPROOF_CLI_TEST_UNSET_KEY"
"#,
        root.display()
    );
    let config_path = root.join("cproof.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path, zip_path)
}

fn run_cproof(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = cproof_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("CPROOF_CLI_TEST_UNSET_KEY")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run cproof binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_files_lists_normalized_paths() {
    let (_tmp, config_path, zip_path) = setup_test_env();
    let zip = zip_path.to_str().unwrap();

    let (stdout, stderr, success) = run_cproof(&config_path, &["files", "--zip", zip]);
    assert!(success, "files failed: stdout={}, stderr={}", stdout, stderr);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(&lines[..3], &["src/cart.py", "src/api/routes.py", "README.md"]);
    assert!(stdout.contains("files: 3"));
    assert!(!stdout.contains("node_modules"));
    assert!(!stdout.contains("logo.png"));
}

#[test]
fn test_tree_lists_directories_first() {
    let (_tmp, config_path, zip_path) = setup_test_env();
    let zip = zip_path.to_str().unwrap();

    let (stdout, stderr, success) = run_cproof(&config_path, &["tree", "--zip", zip]);
    assert!(success, "tree failed: stdout={}, stderr={}", stdout, stderr);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        lines,
        vec!["src/", "  api/", "    routes.py", "  cart.py", "README.md"]
    );
}

#[test]
fn test_search_reports_line_numbers() {
    let (_tmp, config_path, zip_path) = setup_test_env();
    let zip = zip_path.to_str().unwrap();

    let (stdout, stderr, success) = run_cproof(&config_path, &["search", "CHECKOUT", "--zip", zip]);
    assert!(success, "search failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("src/api/routes.py"));
    assert!(stdout.contains("    1: def checkout(cart):"));
    assert!(stdout.contains("2 matching lines in 2 files"));

    let (stdout, _, success) = run_cproof(&config_path, &["search", "zzz-nothing", "--zip", zip]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_show_clamps_range() {
    let (_tmp, config_path, zip_path) = setup_test_env();
    let zip = zip_path.to_str().unwrap();

    let (stdout, stderr, success) = run_cproof(
        &config_path,
        &["show", "src/cart.py", "--start", "2", "--end", "50", "--zip", zip],
    );
    assert!(success, "show failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("src/cart.py:2-4"));
    assert!(stdout.contains("2 |     def total(self):"));

    let (stdout, _, success) = run_cproof(&config_path, &["show", "nope.py", "--zip", zip]);
    assert!(success);
    assert!(stdout.contains("nope.py (not found in corpus)"));
}

#[test]
fn test_context_respects_budget() {
    let (_tmp, config_path, zip_path) = setup_test_env();
    let zip = zip_path.to_str().unwrap();

    let (stdout, _, success) = run_cproof(&config_path, &["context", "--zip", zip]);
    assert!(success);
    assert!(stdout.contains("### FILE: src/cart.py (4 lines)"));
    assert!(stdout.contains("### FILE: README.md (3 lines)"));

    let (stdout, _, success) =
        run_cproof(&config_path, &["context", "--max-chars", "10", "--zip", zip]);
    assert!(success);
    assert!(!stdout.contains("### FILE:"));
}

#[test]
fn test_source_is_required_and_exclusive() {
    let (_tmp, config_path, zip_path) = setup_test_env();
    let zip = zip_path.to_str().unwrap();

    let (_, _, success) = run_cproof(&config_path, &["files"]);
    assert!(!success);
    let (_, _, success) = run_cproof(
        &config_path,
        &["files", "--zip", zip, "--repo", "https://github.com/a/b"],
    );
    assert!(!success);
}

#[test]
fn test_invalid_repo_url_fails() {
    let (_tmp, config_path, _) = setup_test_env();
    let (_, stderr, success) =
        run_cproof(&config_path, &["files", "--repo", "https://gitlab.com/a/b"]);
    assert!(!success);
    assert!(stderr.contains("Invalid GitHub URL"));
}

#[test]
fn test_ask_without_key_fails_with_hint() {
    let (_tmp, config_path, zip_path) = setup_test_env();
    let zip = zip_path.to_str().unwrap();
    let (_, stderr, success) = run_cproof(&config_path, &["ask", "what?", "--zip", zip]);
    assert!(!success);
    assert!(stderr.contains("CPROOF_CLI_TEST_UNSET_KEY"));
}

#[test]
fn test_history_and_settings_commands() {
    let (tmp, config_path, _) = setup_test_env();

    let (stdout, _, success) = run_cproof(&config_path, &["history", "list"]);
    assert!(success);
    assert!(stdout.contains("No history."));

    let (_, _, success) = run_cproof(&config_path, &["history", "delete", "no-such-id"]);
    assert!(!success);

    let (stdout, _, success) = run_cproof(&config_path, &["history", "clear"]);
    assert!(success);
    assert!(stdout.contains("History cleared."));

    let (_, _, success) = run_cproof(&config_path, &["config", "set-key", "gsk_test"]);
    assert!(success);
    let settings = fs::read_to_string(tmp.path().join("store").join("settings.json")).unwrap();
    assert!(settings.contains("gsk_test"));
}
