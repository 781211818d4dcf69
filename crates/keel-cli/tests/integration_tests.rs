//! Integration tests for CLI commands

use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// Run keel with its state kept under `home`
fn keel(home: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_keel"))
        .arg("--config-dir")
        .arg(home.join("config"))
        .arg("--work-dir")
        .arg(home.join("work"))
        .args(args)
        .env_remove("KEEL_SUBJECT")
        .env_remove("KEEL_LOG")
        .output()
        .expect("Failed to execute keel")
}

const REGISTERED: &str = "https://git.example.com/platform/apps.git";

/// Seed a registration without going through a connection test
fn seed(home: &Path) {
    let config = home.join("config");
    std::fs::create_dir_all(&config).unwrap();
    std::fs::write(
        config.join("repositories.yaml"),
        format!("repositories:\n  - url: {}\n    type: git\n    name: apps\n", REGISTERED),
    )
    .unwrap();
}

mod repo_list {
    use super::*;

    #[test]
    fn test_empty() {
        let home = TempDir::new().unwrap();
        let output = keel(home.path(), &["repo", "list"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("No repositories configured"));
    }

    #[test]
    fn test_json_output() {
        let home = TempDir::new().unwrap();
        let output = keel(home.path(), &["repo", "list", "--output", "json"]);

        assert!(output.status.success());
        let json: serde_json::Value =
            serde_json::from_slice(&output.stdout).expect("Output should be valid JSON");
        assert_eq!(json, serde_json::json!([]));
    }

    #[test]
    fn test_policy_hides_repositories() {
        let home = TempDir::new().unwrap();
        seed(home.path());
        std::fs::write(
            home.path().join("config/policy.yaml"),
            "rules:\n  - subjects: [admin]\n    actions: ['*']\n",
        )
        .unwrap();

        let output = keel(
            home.path(),
            &["--subject", "guest", "repo", "list", "--output", "json"],
        );
        assert!(output.status.success());
        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(json, serde_json::json!([]));
    }
}

mod repo_add {
    use super::*;

    #[test]
    fn test_invalid_location() {
        let home = TempDir::new().unwrap();
        let output = keel(home.path(), &["repo", "add", "   "]);
        assert_eq!(output.status.code(), Some(2));
    }

    #[test]
    fn test_chart_repository_needs_http() {
        let home = TempDir::new().unwrap();
        let output = keel(
            home.path(),
            &["repo", "add", "git@github.com:org/charts.git", "--type", "helm"],
        );
        assert_eq!(output.status.code(), Some(2));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("http"));
    }

    #[test]
    fn test_denied_by_policy() {
        let home = TempDir::new().unwrap();
        let config = home.path().join("config");
        std::fs::create_dir_all(&config).unwrap();
        std::fs::write(
            config.join("policy.yaml"),
            "rules:\n  - subjects: ['*']\n    actions: [get]\n",
        )
        .unwrap();

        let output = keel(home.path(), &["repo", "add", "https://github.com/org/repo"]);
        assert_eq!(output.status.code(), Some(77));
    }
}

mod repo_rm {
    use super::*;

    #[test]
    fn test_unknown_repository() {
        let home = TempDir::new().unwrap();
        let output = keel(home.path(), &["repo", "rm", "https://github.com/org/missing"]);
        assert_eq!(output.status.code(), Some(3));
    }

    #[test]
    fn test_removes_by_location() {
        let home = TempDir::new().unwrap();
        seed(home.path());

        let output = keel(
            home.path(),
            &["repo", "rm", "HTTPS://git.example.com/platform/apps"],
        );
        assert!(output.status.success());

        let content =
            std::fs::read_to_string(home.path().join("config/repositories.yaml")).unwrap();
        assert!(!content.contains("platform/apps"));
    }
}

mod repo_update {
    use super::*;

    #[test]
    fn test_type_is_immutable() {
        let home = TempDir::new().unwrap();
        seed(home.path());

        let output = keel(home.path(), &["repo", "update", REGISTERED, "--type", "helm"]);
        assert_eq!(output.status.code(), Some(2));
    }

    #[test]
    fn test_chart_repository_keeps_its_type() {
        let home = TempDir::new().unwrap();
        let config = home.path().join("config");
        std::fs::create_dir_all(&config).unwrap();
        std::fs::write(
            config.join("repositories.yaml"),
            "repositories:\n  - url: https://charts.example.com\n    type: helm\n",
        )
        .unwrap();

        let output = keel(
            home.path(),
            &["repo", "update", "https://charts.example.com", "--name", "stable"],
        );
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

        let content = std::fs::read_to_string(config.join("repositories.yaml")).unwrap();
        assert!(content.contains("type: helm"));
        assert!(content.contains("name: stable"));
    }

    #[test]
    fn test_unknown_repository() {
        let home = TempDir::new().unwrap();
        let output = keel(
            home.path(),
            &["repo", "update", "https://github.com/org/missing", "--name", "x"],
        );
        assert_eq!(output.status.code(), Some(3));
    }

    #[test]
    fn test_rename() {
        let home = TempDir::new().unwrap();
        seed(home.path());

        let output = keel(home.path(), &["repo", "update", REGISTERED, "--name", "platform"]);
        assert!(output.status.success());

        let content =
            std::fs::read_to_string(home.path().join("config/repositories.yaml")).unwrap();
        assert!(content.contains("name: platform"));
    }
}
