//! Integration tests for Talos

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use serial_test::serial;
    use std::path::Path;
    use tempfile::TempDir;

    fn talos() -> Command {
        cargo_bin_cmd!("talos")
    }

    fn run_git(cwd: &Path, args: &[&str]) {
        let status = std::process::Command::new("git")
            .args(args)
            .current_dir(cwd)
            .status()
            .expect("git runs");
        assert!(status.success(), "git {args:?} failed");
    }

    /// A committed repo with a source tree and a standards document
    fn git_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        run_git(dir.path(), &["init", "-q"]);
        run_git(dir.path(), &["config", "user.email", "dev@example.com"]);
        run_git(dir.path(), &["config", "user.name", "Dev"]);

        std::fs::create_dir_all(dir.path().join("src/widget")).unwrap();
        std::fs::write(dir.path().join("src/widget/lib.rs"), "pub fn widget() {}\n").unwrap();
        std::fs::write(
            dir.path().join("standards.md"),
            "# Standards\n\n## Testing\n\nAll changes carry tests.\n\n## Style\n\nRustfmt.\n",
        )
        .unwrap();

        run_git(dir.path(), &["add", "."]);
        run_git(dir.path(), &["commit", "-q", "-m", "initial"]);
        dir
    }

    /// Init a bundle in `repo`, storing under `store`
    fn init_bundle(repo: &TempDir, store: &TempDir, task_id: &str) {
        talos()
            .current_dir(repo.path())
            .env("TALOS_STATE_DIR", store.path())
            .args([
                "init",
                task_id,
                "--requirements",
                "Build the widget",
                "--step",
                "design",
                "--step",
                "implement",
                "--standard",
                "standards.md#Testing",
                "--path",
                "src/widget",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created"));
    }

    #[test]
    fn help_displays() {
        talos()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("task context caching"));
    }

    #[test]
    fn version_displays() {
        talos()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("talos"));
    }

    #[test]
    fn config_path() {
        talos()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        talos()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[provider]"));
    }

    #[test]
    fn init_outside_repo_fails() {
        let dir = TempDir::new().unwrap();
        let store = TempDir::new().unwrap();

        talos()
            .current_dir(dir.path())
            .env("TALOS_STATE_DIR", store.path())
            .args([
                "init",
                "T-1",
                "--requirements",
                "x",
                "--step",
                "a",
                "--standard",
                "standards.md#Testing",
                "--path",
                "src",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("version-controlled"));
    }

    #[test]
    #[serial]
    fn init_and_show_roundtrip() {
        let repo = git_repo();
        let store = TempDir::new().unwrap();

        init_bundle(&repo, &store, "t-1");

        talos()
            .current_dir(repo.path())
            .env("TALOS_STATE_DIR", store.path())
            .args(["show", "T-1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("T-1"))
            .stdout(predicate::str::contains("design"))
            .stdout(predicate::str::contains("standards.md#Testing"));

        talos()
            .current_dir(repo.path())
            .env("TALOS_STATE_DIR", store.path())
            .args(["list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("T-1"));
    }

    #[test]
    #[serial]
    fn duplicate_init_fails() {
        let repo = git_repo();
        let store = TempDir::new().unwrap();

        init_bundle(&repo, &store, "T-1");

        talos()
            .current_dir(repo.path())
            .env("TALOS_STATE_DIR", store.path())
            .args([
                "init",
                "T-1",
                "--requirements",
                "again",
                "--step",
                "a",
                "--standard",
                "standards.md#Testing",
                "--path",
                "src/widget",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("already exists"));
    }

    #[test]
    fn show_missing_bundle() {
        let repo = git_repo();
        let store = TempDir::new().unwrap();

        talos()
            .current_dir(repo.path())
            .env("TALOS_STATE_DIR", store.path())
            .args(["show", "T-404"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not found"));
    }

    #[test]
    fn list_empty_store() {
        let repo = git_repo();
        let store = TempDir::new().unwrap();

        talos()
            .current_dir(repo.path())
            .env("TALOS_STATE_DIR", store.path())
            .args(["list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No bundles stored"));
    }

    #[test]
    #[serial]
    fn evidence_attach_list_verify() {
        let repo = git_repo();
        let store = TempDir::new().unwrap();

        init_bundle(&repo, &store, "T-1");

        std::fs::write(repo.path().join("report.txt"), "test run output\n").unwrap();

        talos()
            .current_dir(repo.path())
            .env("TALOS_STATE_DIR", store.path())
            .args(["evidence", "attach", "T-1", "report.txt", "--kind", "log"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Attached"));

        talos()
            .current_dir(repo.path())
            .env("TALOS_STATE_DIR", store.path())
            .args(["evidence", "list", "T-1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("log"))
            .stdout(predicate::str::contains("1 artifact(s)"));

        talos()
            .current_dir(repo.path())
            .env("TALOS_STATE_DIR", store.path())
            .args(["evidence", "verify", "T-1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("ok"));
    }

    #[test]
    #[serial]
    fn drift_clean_after_init() {
        let repo = git_repo();
        let store = TempDir::new().unwrap();

        init_bundle(&repo, &store, "T-1");

        talos()
            .current_dir(repo.path())
            .env("TALOS_STATE_DIR", store.path())
            .args(["drift", "T-1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("clean"));
    }

    #[test]
    #[serial]
    fn drift_detects_in_scope_change() {
        let repo = git_repo();
        let store = TempDir::new().unwrap();

        init_bundle(&repo, &store, "T-1");

        std::fs::write(
            repo.path().join("src/widget/lib.rs"),
            "pub fn widget() { /* changed */ }\n",
        )
        .unwrap();

        talos()
            .current_dir(repo.path())
            .env("TALOS_STATE_DIR", store.path())
            .args(["drift", "T-1"])
            .assert()
            .failure()
            .stdout(predicate::str::contains("drifted"))
            .stdout(predicate::str::contains("src/widget/lib.rs"));
    }

    #[test]
    #[serial]
    fn qa_run_records_results() {
        let repo = git_repo();
        let store = TempDir::new().unwrap();

        init_bundle(&repo, &store, "T-1");

        let commands = serde_json::json!([{
            "name": "check",
            "command": ["sh", "-c", "exit 0"],
            "cwd": null,
            "timeout_s": 30,
            "is_blocker": true
        }]);
        std::fs::write(
            repo.path().join("qa.json"),
            serde_json::to_string_pretty(&commands).unwrap(),
        )
        .unwrap();

        talos()
            .current_dir(repo.path())
            .env("TALOS_STATE_DIR", store.path())
            .args(["qa", "run", "T-1", "--commands", "qa.json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("pass"));

        talos()
            .current_dir(repo.path())
            .env("TALOS_STATE_DIR", store.path())
            .args(["qa", "baseline", "T-1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Recorded"));

        talos()
            .current_dir(repo.path())
            .env("TALOS_STATE_DIR", store.path())
            .args(["qa", "drift", "T-1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("no drift detected"));
    }

    #[test]
    fn quarantine_list_empty() {
        let repo = git_repo();
        let store = TempDir::new().unwrap();

        talos()
            .current_dir(repo.path())
            .env("TALOS_STATE_DIR", store.path())
            .args(["quarantine", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No quarantined bundles"));
    }

    #[test]
    #[serial]
    fn status_summarizes_store() {
        let repo = git_repo();
        let store = TempDir::new().unwrap();

        init_bundle(&repo, &store, "T-1");

        talos()
            .current_dir(repo.path())
            .env("TALOS_STATE_DIR", store.path())
            .args(["status"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Talos Store Status"))
            .stdout(predicate::str::contains("bundles:         1"));
    }

    #[test]
    #[serial]
    fn migrate_noop_on_current_schema() {
        let repo = git_repo();
        let store = TempDir::new().unwrap();

        init_bundle(&repo, &store, "T-1");

        talos()
            .current_dir(repo.path())
            .env("TALOS_STATE_DIR", store.path())
            .args(["migrate", "T-1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already at schema"));
    }
}
