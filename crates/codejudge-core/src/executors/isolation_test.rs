// Tests against a live Docker daemon. They pull public language images on
// first run, so they are ignored by default:
//
//     cargo test -p codejudge-core -- --ignored isolation_test
use crate::config::SandboxConfig;
use crate::errors::ErrorKind;
use crate::executors::BackendKind;
use crate::sandbox::Sandbox;
use tempfile::tempdir;

async fn docker_sandbox(root: &std::path::Path) -> Sandbox {
    let config = SandboxConfig {
        workspace_root: Some(root.to_path_buf()),
        pull_missing_images: true,
        timeout_secs: 120,
        ..Default::default()
    };
    let sandbox = Sandbox::from_config(config).await.unwrap();
    assert_eq!(
        sandbox.backend_kind(),
        BackendKind::Docker,
        "Docker daemon not reachable"
    );
    sandbox
}

fn ok_programs() -> Vec<(&'static str, &'static str)> {
    vec![
        ("python", "import sys\nsys.stdout.write('ok')\n"),
        ("javascript", "process.stdout.write('ok');\n"),
        (
            "java",
            "public class Main { public static void main(String[] a) { System.out.print(\"ok\"); } }\n",
        ),
        (
            "cpp",
            "#include <iostream>\nint main() { std::cout << \"ok\"; return 0; }\n",
        ),
        ("c", "#include <stdio.h>\nint main(void) { printf(\"ok\"); return 0; }\n"),
    ]
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_every_language_prints_ok() {
    let root = tempdir().unwrap();
    let sandbox = docker_sandbox(root.path()).await;

    for (language, code) in ok_programs() {
        let report = sandbox.execute(language, code).await;
        assert!(
            report.is_success(),
            "{}: {:?}",
            language,
            report.error_message()
        );
        assert_eq!(report.output, "ok", "{}", language);
    }
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_stderr_and_non_zero_exit_fail_with_stderr_text() {
    let root = tempdir().unwrap();
    let sandbox = docker_sandbox(root.path()).await;

    let report = sandbox
        .execute(
            "python",
            "import sys\nprint('partial')\nsys.stderr.write('bad input')\nsys.exit(2)\n",
        )
        .await;

    assert!(!report.is_success());
    assert_eq!(report.output, "partial\n");
    assert_eq!(report.error_message().unwrap(), "bad input");
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_repeated_runs_classify_identically() {
    let root = tempdir().unwrap();
    let sandbox = docker_sandbox(root.path()).await;

    for code in ["print('hello')", "raise SystemExit('nope')"] {
        let first = sandbox.execute("python", code).await;
        let second = sandbox.execute("python", code).await;
        assert_eq!(first.is_success(), second.is_success());
        assert_eq!(first.output, second.output);
    }
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_memory_ceiling_terminates_program() {
    let root = tempdir().unwrap();
    let sandbox = docker_sandbox(root.path()).await;

    let report = sandbox
        .execute("python", "blob = bytearray(512 * 1024 * 1024)\nprint('survived')\n")
        .await;

    assert!(!report.is_success());
    assert_ne!(report.output, "survived\n");
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_network_is_unreachable() {
    let root = tempdir().unwrap();
    let sandbox = docker_sandbox(root.path()).await;

    let report = sandbox
        .execute(
            "python",
            "import urllib.request\nurllib.request.urlopen('http://example.com', timeout=5)\nprint('connected')\n",
        )
        .await;

    assert!(!report.is_success());
    assert_eq!(report.output, "");
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_infinite_loop_times_out() {
    let root = tempdir().unwrap();
    let mut config = SandboxConfig {
        workspace_root: Some(root.path().to_path_buf()),
        pull_missing_images: true,
        ..Default::default()
    };
    config.timeout_secs = 2;
    let sandbox = Sandbox::from_config(config).await.unwrap();

    let report = sandbox.execute("python", "while True:\n    pass\n").await;

    assert_eq!(report.error.map(|e| e.kind()), Some(ErrorKind::Timeout));
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}
