use std::collections::BTreeSet;

use serde_json::{json, Value};
use tempfile::TempDir;

use foreman::action::policy::{ActionPolicy, PolicyConfig};
use foreman::action::ActionCall;
use foreman::error::PolicyError;

fn sandbox() -> (ActionPolicy, TempDir) {
    let tmp = TempDir::new().expect("tempdir");
    let policy = ActionPolicy::new(PolicyConfig {
        root_dir: tmp.path().join("workspace"),
        ..PolicyConfig::default()
    })
    .expect("policy");
    (policy, tmp)
}

fn call(name: &str, params: Value) -> ActionCall {
    ActionCall::new(name, params.as_object().cloned().unwrap_or_default())
}

// ============================================================
// Construction
// ============================================================

#[test]
fn test_new_creates_and_canonicalizes_root() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("a").join("b");
    assert!(!root.exists());

    let policy = ActionPolicy::new(PolicyConfig {
        root_dir: root.clone(),
        ..PolicyConfig::default()
    })
    .unwrap();

    assert!(root.is_dir(), "root should be created");
    assert!(policy.root_dir().is_absolute());
}

// ============================================================
// Path containment
// ============================================================

#[test]
fn test_relative_path_joins_under_root() {
    let (policy, _tmp) = sandbox();
    let normalized = policy
        .check(&call("read_file", json!({ "path": "src/app.py" })))
        .unwrap();
    let path = normalized.get("path").and_then(Value::as_str).unwrap();
    assert!(path.starts_with(policy.root_dir().to_str().unwrap()));
    assert!(path.ends_with("src/app.py"));
}

#[test]
fn test_dotdot_escape_is_rejected() {
    let (policy, _tmp) = sandbox();
    let err = policy
        .check(&call("read_file", json!({ "path": "../secrets.txt" })))
        .unwrap_err();
    assert!(matches!(err, PolicyError::PathEscape { .. }), "got {err}");
}

#[test]
fn test_dotdot_inside_root_is_allowed() {
    let (policy, _tmp) = sandbox();
    let normalized = policy
        .check(&call("read_file", json!({ "path": "src/../app.py" })))
        .unwrap();
    let path = normalized.get("path").and_then(Value::as_str).unwrap();
    assert!(path.ends_with("app.py"));
    assert!(!path.contains(".."));
}

#[test]
fn test_absolute_path_outside_root_is_rejected() {
    let (policy, _tmp) = sandbox();
    let err = policy
        .check(&call("read_file", json!({ "path": "/etc/passwd" })))
        .unwrap_err();
    assert!(matches!(err, PolicyError::PathEscape { .. }));
}

// ============================================================
// Size caps (checked before any I/O)
// ============================================================

#[test]
fn test_read_file_gets_default_byte_cap() {
    let (policy, _tmp) = sandbox();
    let normalized = policy
        .check(&call("read_file", json!({ "path": "a.txt" })))
        .unwrap();
    assert_eq!(
        normalized.get("max_bytes").and_then(Value::as_u64),
        Some(262_144)
    );
}

#[test]
fn test_read_file_cap_above_policy_limit_is_rejected() {
    let (policy, _tmp) = sandbox();
    let err = policy
        .check(&call(
            "read_file",
            json!({ "path": "a.txt", "max_bytes": 10_000_000 }),
        ))
        .unwrap_err();
    assert!(matches!(err, PolicyError::SizeLimitExceeded { .. }));
}

#[test]
fn test_create_file_oversized_content_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let policy = ActionPolicy::new(PolicyConfig {
        root_dir: tmp.path().join("ws"),
        max_write_bytes: 16,
        ..PolicyConfig::default()
    })
    .unwrap();

    let err = policy
        .check(&call(
            "create_file",
            json!({ "path": "big.txt", "content": "x".repeat(64) }),
        ))
        .unwrap_err();
    assert!(matches!(
        err,
        PolicyError::SizeLimitExceeded {
            requested: 64,
            limit: 16
        }
    ));
    // Rejection happens before any handler runs; nothing may exist on disk.
    assert!(!tmp.path().join("ws").join("big.txt").exists());
}

#[test]
fn test_edit_file_requires_old_and_new() {
    let (policy, _tmp) = sandbox();
    let err = policy
        .check(&call("edit_file", json!({ "path": "a.py", "new": "y" })))
        .unwrap_err();
    assert!(matches!(err, PolicyError::MissingParam { name: "old" }));
}

// ============================================================
// Command normalization
// ============================================================

#[test]
fn test_string_command_is_word_split() {
    let (policy, _tmp) = sandbox();
    let normalized = policy
        .check(&call(
            "run_command",
            json!({ "cmd": "python3 -m pytest 'my tests'" }),
        ))
        .unwrap();
    let cmd: Vec<&str> = normalized
        .get("cmd")
        .and_then(Value::as_array)
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(cmd, vec!["python3", "-m", "pytest", "my tests"]);
}

#[test]
fn test_array_command_is_kept_verbatim() {
    let (policy, _tmp) = sandbox();
    let normalized = policy
        .check(&call("run_command", json!({ "cmd": ["ls", "-la", "a b"] })))
        .unwrap();
    let cmd = normalized.get("cmd").and_then(Value::as_array).unwrap();
    assert_eq!(cmd[2], Value::from("a b"));
}

#[test]
fn test_disallowed_program_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let policy = ActionPolicy::new(PolicyConfig {
        root_dir: tmp.path().join("ws"),
        allowed_commands: BTreeSet::from(["python3".to_string()]),
        ..PolicyConfig::default()
    })
    .unwrap();

    let err = policy
        .check(&call("run_command", json!({ "cmd": ["rm", "-rf", "/"] })))
        .unwrap_err();
    assert!(
        matches!(err, PolicyError::CommandNotAllowed { ref program } if program == "rm"),
        "got {err}"
    );
}

#[test]
fn test_empty_allowlist_is_unrestricted() {
    let (policy, _tmp) = sandbox();
    assert!(policy
        .check(&call("run_command", json!({ "cmd": ["anything", "goes"] })))
        .is_ok());
}

#[test]
fn test_shell_mode_requires_allow_shell() {
    let (policy, _tmp) = sandbox();
    let err = policy
        .check(&call(
            "run_command",
            json!({ "cmd": "echo hi && echo bye", "shell": true }),
        ))
        .unwrap_err();
    assert!(matches!(err, PolicyError::ShellDisabled));
}

#[test]
fn test_shell_mode_keeps_the_raw_line() {
    let tmp = TempDir::new().unwrap();
    let policy = ActionPolicy::new(PolicyConfig {
        root_dir: tmp.path().join("ws"),
        allow_shell: true,
        ..PolicyConfig::default()
    })
    .unwrap();

    let normalized = policy
        .check(&call(
            "terminal_command",
            json!({ "cmd": "echo hi && echo bye", "shell": true }),
        ))
        .unwrap();
    // The line must reach the handler unquoted so `sh -c` sees the `&&`.
    assert_eq!(
        normalized.get("cmd"),
        Some(&Value::from("echo hi && echo bye"))
    );
}

#[test]
fn test_shell_mode_allowlist_checks_the_first_word() {
    let tmp = TempDir::new().unwrap();
    let policy = ActionPolicy::new(PolicyConfig {
        root_dir: tmp.path().join("ws"),
        allow_shell: true,
        allowed_commands: BTreeSet::from(["python3".to_string()]),
        ..PolicyConfig::default()
    })
    .unwrap();

    let err = policy
        .check(&call(
            "run_command",
            json!({ "cmd": "rm -rf / && echo done", "shell": true }),
        ))
        .unwrap_err();
    assert!(
        matches!(err, PolicyError::CommandNotAllowed { ref program } if program == "rm"),
        "got {err}"
    );
}

#[test]
fn test_timeout_above_ceiling_is_rejected() {
    let (policy, _tmp) = sandbox();
    let err = policy
        .check(&call(
            "run_command",
            json!({ "cmd": ["ls"], "timeout_sec": 9999 }),
        ))
        .unwrap_err();
    assert!(matches!(
        err,
        PolicyError::TimeoutExceedsPolicy {
            requested: 9999,
            limit: 10
        }
    ));
}

#[test]
fn test_timeout_default_is_the_policy_ceiling() {
    let (policy, _tmp) = sandbox();
    let normalized = policy
        .check(&call("run_command", json!({ "cmd": ["ls"] })))
        .unwrap();
    assert_eq!(
        normalized.get("timeout_sec").and_then(Value::as_u64),
        Some(10)
    );
}

// ============================================================
// Purity and idempotence
// ============================================================

#[test]
fn test_check_does_not_mutate_the_call() {
    let (policy, _tmp) = sandbox();
    let original = call("read_file", json!({ "path": "a.txt" }));
    let _ = policy.check(&original).unwrap();
    assert_eq!(original.params.get("path"), Some(&Value::from("a.txt")));
    assert!(!original.params.contains_key("max_bytes"));
}

#[test]
fn test_normalization_is_idempotent() {
    let (policy, _tmp) = sandbox();
    let first = policy
        .check(&call(
            "run_command",
            json!({ "cmd": "python3 app.py", "timeout_sec": 5 }),
        ))
        .unwrap();
    let second = policy
        .check(&ActionCall::new("run_command", first.clone()))
        .unwrap();
    assert_eq!(Value::Object(first), Value::Object(second));
}

// ============================================================
// Closed action set
// ============================================================

#[test]
fn test_unknown_action_is_rejected() {
    let (policy, _tmp) = sandbox();
    let err = policy.check(&call("delete_everything", json!({}))).unwrap_err();
    assert!(matches!(err, PolicyError::UnknownAction { ref name } if name == "delete_everything"));
}

#[test]
fn test_terminal_actions_need_no_params() {
    let (policy, _tmp) = sandbox();
    assert!(policy.check(&call("finish_task", json!({}))).is_ok());
    assert!(policy.check(&call("finish_work", json!({}))).is_ok());
}

#[test]
fn test_run_subagent_rejects_blank_instruction() {
    let (policy, _tmp) = sandbox();
    let err = policy
        .check(&call("run_subagent", json!({ "instruction": "   " })))
        .unwrap_err();
    assert!(matches!(err, PolicyError::InvalidParam { name: "instruction", .. }));
    let ok = policy.check(&call("run_subagent", json!({ "instruction": "build it" })));
    assert!(ok.is_ok());
}
