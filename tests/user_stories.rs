//! User Story Integration Tests
//!
//! These tests trace complete user workflows against a mock router to verify
//! the session engine behaves correctly from the user's perspective.
//!
//! Each test represents a real user story:
//! - "As a user, I want to..."
//! - Tests verify the expected output/behavior
//! - Logs are captured for debugging

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use titan::history::HISTORY_CAP;
use titan::{
    AdminAction, Config, ConfigStore, Diagnostic, HistoryStore, Rejected, SessionState, Task,
};

/// Test helper to capture and display trace logs
struct TestTracer {
    name: String,
    logs: Vec<String>,
}

impl TestTracer {
    fn new(name: &str) -> Self {
        eprintln!("\n╔═══════════════════════════════════════════════════════════════");
        eprintln!("║ USER STORY: {}", name);
        eprintln!("╚═══════════════════════════════════════════════════════════════\n");
        Self {
            name: name.to_string(),
            logs: vec![],
        }
    }

    fn step(&mut self, description: &str) {
        let msg = format!("  → {}", description);
        eprintln!("{}", msg);
        self.logs.push(msg);
    }

    fn expect(&mut self, condition: bool, description: &str) {
        let status = if condition { "✓" } else { "✗" };
        let msg = format!("    {} {}", status, description);
        eprintln!("{}", msg);
        self.logs.push(msg);
        assert!(condition, "FAILED: {}", description);
    }

    fn done(&self) {
        eprintln!("\n  ══════════════════════════════════════════════════════");
        eprintln!("  ✓ Story completed: {} ({} steps)", self.name, self.logs.len());
        eprintln!();
    }
}

/// Config and history files in a throwaway directory
struct Workspace {
    _dir: tempfile::TempDir,
    config_store: ConfigStore,
    history_store: HistoryStore,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self {
            config_store: ConfigStore::at(dir.path().join("config.json")),
            history_store: HistoryStore::at(dir.path().join("history.json")),
            _dir: dir,
        }
    }

    fn save(&self, base_url: &str, credential: &str) {
        self.config_store
            .save(&Config {
                base_url: base_url.to_string(),
                credential: credential.to_string(),
                ..Default::default()
            })
            .unwrap();
    }

    fn open(&self) -> SessionState {
        SessionState::open(self.config_store.clone(), self.history_store.clone())
    }
}

// ═══════════════════════════════════════════════════════════════
// STORY: User sends a prompt with auto task
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn story_send_prompt_with_auto_task() {
    let mut t = TestTracer::new("Send a prompt without forcing a task");
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/route"))
        .and(body_json(json!({ "prompt": "four times five" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"route":"math","answer":"20"}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    t.step("Given a router with no API key configured");
    let ws = Workspace::new();
    ws.save(&format!("{}/", server.uri()), "");
    let mut session = ws.open();

    t.step("When the user types 'four times five' and sends with task auto");
    session.set_prompt("four times five");
    let pending = session.send().unwrap();
    t.expect(session.is_dispatching(), "Session is dispatching");
    let result = session.settle(pending).await.clone();

    t.expect(result.ok, "Response is ok");
    t.expect(result.status == Some(200), "Status 200 recorded");
    t.expect(result.body["answer"] == json!("20"), "JSON body parsed");
    t.expect(!session.is_dispatching(), "Session back to idle");

    let requests = server.received_requests().await.unwrap();
    t.expect(requests.len() == 1, "Exactly one request issued");
    t.expect(
        requests[0].headers.get("x-api-key").is_none(),
        "No X-API-Key header without a credential",
    );
    t.expect(
        requests[0].url.path() == "/v1/route",
        "Trailing slash on base address is not doubled",
    );

    t.step("Then the prompt is recorded in recent history");
    t.expect(session.history().len() == 1, "One history entry");
    t.expect(session.history()[0].prompt == "four times five", "Prompt recorded");
    t.expect(session.history()[0].task == Task::Auto, "Task recorded");

    t.done();
}

// ═══════════════════════════════════════════════════════════════
// STORY: Admin actions need a key
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn story_admin_action_requires_key() {
    let mut t = TestTracer::new("Admin actions are gated on the API key");
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/freeze"))
        .and(header("X-API-Key", "admin-key"))
        .and(body_json(json!({})))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"frozen":true}"#))
        .mount(&server)
        .await;

    let ws = Workspace::new();
    ws.save(&server.uri(), "");
    let mut session = ws.open();

    t.step("Given no API key, when the user presses Freeze");
    let err = session.admin_action(AdminAction::Freeze).unwrap_err();
    t.expect(err == Rejected::CredentialRequired, "Rejected locally");
    t.expect(
        session.last_result().and_then(|r| r.error.as_deref()) == Some("credential required"),
        "Local 'credential required' result shown",
    );
    t.expect(
        server.received_requests().await.unwrap().is_empty(),
        "No network call was made",
    );

    t.step("When the user saves an API key and presses Freeze again");
    let cfg = Config {
        credential: "admin-key".into(),
        ..session.config().clone()
    };
    session.save_config(cfg).unwrap();
    let pending = session.admin_action(AdminAction::Freeze).unwrap();
    let result = session.settle(pending).await.clone();

    t.expect(result.ok, "Freeze succeeded");
    let requests = server.received_requests().await.unwrap();
    t.expect(requests.len() == 1, "Exactly one network call");
    t.expect(
        requests[0].headers.get("x-api-key").map(|v| v.as_bytes()) == Some(b"admin-key".as_slice()),
        "X-API-Key header carried",
    );
    t.expect(session.history().is_empty(), "Admin calls create no history");

    t.done();
}

// ═══════════════════════════════════════════════════════════════
// STORY: Diagnostics and error bodies
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn story_diagnostics_show_raw_bodies() {
    let mut t = TestTracer::new("Diagnostics display whatever the router returns");
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/metrics"))
        .and(header("X-API-Key", "k"))
        .respond_with(ResponseTemplate::new(200).set_body_string("router_requests_total 42"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/improvement-log"))
        .respond_with(ResponseTemplate::new(503).set_body_string(r#"{"error":"warming up"}"#))
        .mount(&server)
        .await;

    let ws = Workspace::new();
    ws.save(&server.uri(), "k");
    let mut session = ws.open();

    t.step("When the user requests /metrics (plain text)");
    let pending = session.run_diagnostic(Diagnostic::Metrics).unwrap();
    let result = session.settle(pending).await.clone();
    t.expect(result.ok, "Metrics ok");
    t.expect(
        result.body == json!("router_requests_total 42"),
        "Text body kept verbatim",
    );

    t.step("When the user requests /improvement-log and the router is unavailable");
    let pending = session.run_diagnostic(Diagnostic::ImprovementLog).unwrap();
    let result = session.settle(pending).await.clone();
    t.expect(!result.ok, "Not ok");
    t.expect(result.status == Some(503), "Status still recorded");
    t.expect(result.body["error"] == json!("warming up"), "Error body surfaced");
    t.expect(session.history().is_empty(), "Diagnostics create no history");

    t.done();
}

// ═══════════════════════════════════════════════════════════════
// STORY: Recent prompts survive restarts
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn story_recent_prompts_persist_and_dedupe() {
    let mut t = TestTracer::new("Recent prompts are capped, deduped and persisted");
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/route"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#))
        .mount(&server)
        .await;

    let ws = Workspace::new();
    ws.save(&server.uri(), "");
    let mut session = ws.open();

    t.step("Given the user sends twelve distinct prompts");
    for i in 0..12 {
        let pending = session.send_prompt(&format!("question {}", i), Task::Writing).unwrap();
        session.settle(pending).await;
    }
    t.expect(session.history().len() == HISTORY_CAP, "History capped at 10");
    t.expect(session.history()[0].prompt == "question 11", "Newest first");

    t.step("When the user re-sends an older prompt");
    let pending = session.send_prompt("question 5", Task::Math).unwrap();
    session.settle(pending).await;
    let count = session
        .history()
        .iter()
        .filter(|i| i.prompt == "question 5")
        .count();
    t.expect(count == 1, "Only one entry for the prompt");
    t.expect(session.history()[0].task == Task::Math, "Newest entry wins");

    t.step("Then a fresh session sees the same history and config");
    let fresh = ws.open();
    t.expect(fresh.history() == session.history(), "History reloaded");
    t.expect(fresh.config().base_url == server.uri(), "Base URL reloaded");
    t.expect(fresh.transcript().is_empty(), "Transcript is not persisted");

    t.step("When the user loads an item from history");
    let mut fresh = fresh;
    let id = fresh.history()[3].id.clone();
    fresh.load_from_history(&id).unwrap();
    t.expect(fresh.prompt() == fresh.history()[3].prompt, "Prompt buffer filled");

    t.done();
}

// ═══════════════════════════════════════════════════════════════
// STORY: Router is unreachable
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn story_unreachable_router_stays_usable() {
    let mut t = TestTracer::new("Transport failures never break the session");

    let ws = Workspace::new();
    ws.save("http://127.0.0.1:1", "");
    let mut session = ws.open();

    t.step("When the user runs Health against a dead address");
    let pending = session.run_diagnostic(Diagnostic::Health).unwrap();
    let result = session.settle(pending).await.clone();
    t.expect(!result.ok, "Not ok");
    t.expect(result.status.is_none(), "No status");
    t.expect(result.error.is_some(), "Error message captured");

    t.step("Then the session accepts the next intent");
    t.expect(!session.is_dispatching(), "Idle again");
    t.expect(session.run_diagnostic(Diagnostic::Version).is_ok(), "Next dispatch accepted");

    t.done();
}
