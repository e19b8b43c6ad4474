use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use foreman::action::executor::ActionExecutor;
use foreman::action::handlers::SandboxCtx;
use foreman::action::policy::{ActionPolicy, PolicyConfig};
use foreman::action::registry::WorkerRegistry;
use foreman::agent::logging::RunLogger;
use foreman::agent::model::{ModelClient, ModelTurn, ParsedAction};
use foreman::agent::transcript::ChatMessage;
use foreman::agent::worker::Worker;
use foreman::harness::BuildRunner;

// ============================================================
// Scripted collaborators
// ============================================================

struct ScriptedClient {
    turns: VecDeque<ModelTurn>,
}

impl ScriptedClient {
    fn new(turns: Vec<ModelTurn>) -> Self {
        Self {
            turns: turns.into(),
        }
    }
}

impl ModelClient for ScriptedClient {
    async fn chat(&mut self, _transcript: &[ChatMessage]) -> ModelTurn {
        self.turns.pop_front().unwrap_or(ModelTurn::Exhausted {
            reason: "script ended".to_string(),
        })
    }
}

fn action_turn(action: &str, params: serde_json::Value) -> ModelTurn {
    ModelTurn::Action(ParsedAction {
        raw: format!("```json\n{{\"action\": \"{action}\"}}\n```"),
        thought: String::new(),
        action: action.to_string(),
        params: params.as_object().cloned().unwrap_or_default(),
    })
}

/// Fails the first `fail_first` build attempts, then succeeds.
struct FlakyBuilder {
    fail_first: usize,
    attempts: Arc<AtomicUsize>,
}

impl BuildRunner for FlakyBuilder {
    async fn attempt_build(&mut self, _entry_point: &str) -> (bool, String) {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.fail_first {
            (false, format!("Traceback on attempt {attempt}"))
        } else {
            (true, "Application stayed up".to_string())
        }
    }
}

struct Fixture {
    worker: Worker<ScriptedClient, WorkerRegistry<FlakyBuilder>>,
    attempts: Arc<AtomicUsize>,
    logger: RunLogger,
    _workspace: TempDir,
    _runs: TempDir,
}

fn fixture(turns: Vec<ModelTurn>, fail_first: usize, budget: u32) -> Fixture {
    let workspace = TempDir::new().expect("workspace");
    let runs = TempDir::new().expect("runs dir");

    let policy = ActionPolicy::new(PolicyConfig {
        root_dir: workspace.path().join("ws"),
        ..PolicyConfig::default()
    })
    .expect("policy");

    let ctx = SandboxCtx {
        root: policy.root_dir().to_path_buf(),
        command_timeout_sec: 5,
        max_output_chars: 10_000,
        python_bin: "python3".to_string(),
        entry_point: "app.py".to_string(),
    };

    let attempts = Arc::new(AtomicUsize::new(0));
    let builder = FlakyBuilder {
        fail_first,
        attempts: attempts.clone(),
    };
    let registry = WorkerRegistry::new(ctx, builder).expect("registry");
    let executor = ActionExecutor::new(policy, registry);
    let logger = RunLogger::new(runs.path(), 7).expect("logger");
    let worker = Worker::new(
        ScriptedClient::new(turns),
        executor,
        logger.clone(),
        "app.py",
        budget,
    );

    Fixture {
        worker,
        attempts,
        logger,
        _workspace: workspace,
        _runs: runs,
    }
}

// ============================================================
// finish_task terminal behavior
// ============================================================

#[tokio::test]
async fn test_failed_build_feeds_back_then_second_finish_accepts() {
    let mut fx = fixture(
        vec![
            action_turn("finish_task", json!({})),
            action_turn("finish_task", json!({})),
        ],
        1,
        30,
    );

    let outcome = fx.worker.run("build a calculator").await;
    assert!(outcome.success, "second finish_task should accept");
    assert_eq!(outcome.iterations, 2);
    assert_eq!(
        fx.attempts.load(Ordering::SeqCst),
        2,
        "exactly two build attempts: one failed, one accepted"
    );

    let chat = std::fs::read_to_string(fx.logger.chat_path("worker")).unwrap();
    assert!(
        chat.contains("The application does not work"),
        "failed build becomes corrective feedback"
    );
}

#[tokio::test]
async fn test_immediate_finish_accepts_in_one_iteration() {
    let mut fx = fixture(vec![action_turn("finish_task", json!({}))], 0, 30);
    let outcome = fx.worker.run("build a timer").await;
    assert!(outcome.success);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(fx.attempts.load(Ordering::SeqCst), 1);
}

// ============================================================
// Parse failures and transport exhaustion
// ============================================================

#[tokio::test]
async fn test_parse_failure_gets_corrective_feedback_and_continues() {
    let mut fx = fixture(
        vec![
            ModelTurn::ParseFailure {
                raw: "Let me think about this.".to_string(),
            },
            action_turn("finish_task", json!({})),
        ],
        0,
        30,
    );

    let outcome = fx.worker.run("build a notepad").await;
    assert!(outcome.success, "loop should survive a parse failure");
    assert_eq!(outcome.iterations, 2);

    let chat = std::fs::read_to_string(fx.logger.chat_path("worker")).unwrap();
    assert!(chat.contains("```json block"), "corrective message logged");
    assert!(chat.contains("Let me think about this."));
}

#[tokio::test]
async fn test_transport_exhaustion_rejects() {
    let mut fx = fixture(
        vec![ModelTurn::Exhausted {
            reason: "endpoint down".to_string(),
        }],
        0,
        30,
    );

    let outcome = fx.worker.run("build anything").await;
    assert!(!outcome.success);
    assert!(outcome.summary.contains("endpoint down"));
    assert_eq!(fx.attempts.load(Ordering::SeqCst), 0);
}

// ============================================================
// Budget exhaustion
// ============================================================

#[tokio::test]
async fn test_iteration_budget_exhaustion_rejects() {
    let turns = (0..5)
        .map(|_| action_turn("get_file_tree", json!({})))
        .collect();
    let mut fx = fixture(turns, 0, 3);

    let outcome = fx.worker.run("never finishes").await;
    assert!(!outcome.success);
    assert_eq!(outcome.iterations, 3, "budget caps the loop");
    assert!(outcome.summary.contains("budget"));
}

// ============================================================
// Ordinary actions flow through the sandbox
// ============================================================

#[tokio::test]
async fn test_created_file_lands_in_sandbox_root() {
    let mut fx = fixture(
        vec![
            action_turn(
                "create_file",
                json!({ "path": "app.py", "content": "print('hi')\n" }),
            ),
            action_turn("finish_task", json!({})),
        ],
        0,
        30,
    );

    let outcome = fx.worker.run("write app.py").await;
    assert!(outcome.success);

    let chat = std::fs::read_to_string(fx.logger.chat_path("worker")).unwrap();
    assert!(chat.contains("Success:"), "file creation result logged");

    let created = fx._workspace.path().join("ws").join("app.py");
    assert!(created.is_file(), "file must exist under the sandbox root");
}
