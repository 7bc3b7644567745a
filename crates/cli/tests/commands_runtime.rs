use std::env;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use serde_json::{json, Value};
use triage_cli::commands::{doctor, migrate, seed, suggest};
use triage_core::config::PipelineMode;
use triage_core::domain::ticket::TicketId;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("TRIAGE_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("TRIAGE_DATABASE_URL", "postgres://localhost/triage")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(dir.path());

    with_env(&[("TRIAGE_DATABASE_URL", url.as_str())], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let first_payload = parse_payload(&first.output);
        assert_eq!(first_payload["command"], "seed");
        assert!(first_payload["message"]
            .as_str()
            .unwrap_or_default()
            .contains("5 categories and 5 tickets inserted"));

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");
        let second_payload = parse_payload(&second.output);
        assert!(second_payload["message"]
            .as_str()
            .unwrap_or_default()
            .contains("0 categories and 0 tickets inserted"));
    });
}

#[test]
fn suggest_prints_guarded_patch_without_applying() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(dir.path());
    let model = ModelStub::answering(json!({
        "category_name": "Bug",
        "priority": "MEDIUM",
        "status": "OPEN",
        "summary": "Export uses a comma separator.",
        "rationale": ["export formatting"],
        "draft_reply": "Thanks, we are checking the export settings."
    }));

    with_env(
        &[
            ("TRIAGE_DATABASE_URL", url.as_str()),
            ("TRIAGE_LLM_BASE_URL", model.uri.as_str()),
            ("TRIAGE_LLM_WARMUP", "false"),
        ],
        || {
            assert_eq!(seed::run().exit_code, 0);

            // Seeded ticket 2 is the CSV separator report; categories are ids 1..=5 by name.
            let result = suggest::run(TicketId(2), None, false);
            assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

            let payload = parse_payload(&result.output);
            assert_eq!(payload["status"], "ok");
            assert_eq!(payload["data"]["ticket_id"], 2);
            assert_eq!(payload["data"]["suggestion"]["category_name"], "Bug");
            assert_eq!(payload["data"]["patch_to_apply"]["category_id"], 4);
            assert_eq!(payload["data"]["patch_to_apply"]["priority"], "MEDIUM");
            assert_eq!(payload["data"]["patch_to_apply"]["status"], "OPEN");
            assert!(payload["data"].get("applied").is_none());
        },
    );
}

#[test]
fn suggest_apply_persists_patch() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(dir.path());
    let model = ModelStub::answering(json!({
        "category_name": "Incident",
        "priority": "URGENT",
        "status": "OPEN",
        "summary": "Platform down for all users.",
        "rationale": ["every page times out"],
        "draft_reply": null
    }));

    with_env(
        &[
            ("TRIAGE_DATABASE_URL", url.as_str()),
            ("TRIAGE_LLM_BASE_URL", model.uri.as_str()),
            ("TRIAGE_LLM_WARMUP", "false"),
        ],
        || {
            assert_eq!(seed::run().exit_code, 0);

            let result = suggest::run(TicketId(4), Some(PipelineMode::Single), true);
            assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

            let payload = parse_payload(&result.output);
            assert_eq!(payload["data"]["applied"]["priority"], "URGENT");
            assert_eq!(payload["data"]["applied"]["status"], "IN_PROGRESS");
            assert_eq!(payload["data"]["applied"]["category_id"], 5);
        },
    );
}

#[test]
fn suggest_reports_missing_ticket_with_exit_code() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(dir.path());

    with_env(&[("TRIAGE_DATABASE_URL", url.as_str()), ("TRIAGE_LLM_WARMUP", "false")], || {
        let result = suggest::run(TicketId(999), None, false);
        assert_eq!(result.exit_code, 10);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "not_found");
        assert_eq!(payload["data"]["status_code"], 404);
        assert_eq!(payload["data"]["details"]["ticket_id"], 999);
        assert!(payload["data"]["correlation_id"].as_str().is_some());
    });
}

#[test]
fn doctor_reports_failure_when_config_invalid() {
    with_env(&[("TRIAGE_LLM_TIMEOUT_SECS", "0")], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 7);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][0]["name"], "config_validation");
        assert_eq!(payload["checks"][1]["status"], "skipped");
    });
}

#[test]
fn doctor_passes_with_reachable_model() {
    let model = ModelStub::answering(json!({ "ok": true }));

    with_env(
        &[("TRIAGE_DATABASE_URL", "sqlite::memory:"), ("TRIAGE_LLM_BASE_URL", model.uri.as_str())],
        || {
            let result = doctor::run(true);
            assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

            let payload = parse_payload(&result.output);
            assert_eq!(payload["overall_status"], "pass");
            assert_eq!(payload["checks"][2]["name"], "llm_reachability");
        },
    );
}

/// Ollama-compatible chat endpoint answering every request with `content`.
struct ModelStub {
    _server: MockServer,
    _runtime: tokio::runtime::Runtime,
    uri: String,
}

impl ModelStub {
    fn answering(content: Value) -> Self {
        let runtime = tokio::runtime::Runtime::new().expect("stub runtime");
        let server = runtime.block_on(async {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/api/chat"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "message": { "role": "assistant", "content": content.to_string() },
                    "done": true
                })))
                .mount(&server)
                .await;
            server
        });
        let uri = server.uri();
        Self { _server: server, _runtime: runtime, uri }
    }
}

fn database_url(dir: &Path) -> String {
    format!("sqlite://{}?mode=rwc", dir.join("triage.db").display())
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    let keys = [
        "TRIAGE_DATABASE_URL",
        "TRIAGE_DATABASE_MAX_CONNECTIONS",
        "TRIAGE_DATABASE_TIMEOUT_SECS",
        "TRIAGE_LLM_PROVIDER",
        "TRIAGE_LLM_API_KEY",
        "TRIAGE_LLM_BASE_URL",
        "TRIAGE_LLM_MODEL",
        "TRIAGE_LLM_TIMEOUT_SECS",
        "TRIAGE_LLM_CONNECT_TIMEOUT_SECS",
        "TRIAGE_LLM_READ_TIMEOUT_SECS",
        "TRIAGE_LLM_WRITE_TIMEOUT_SECS",
        "TRIAGE_LLM_WARMUP",
        "TRIAGE_PIPELINE",
        "TRIAGE_LOGGING_LEVEL",
        "TRIAGE_LOGGING_FORMAT",
        "TRIAGE_LOG_LEVEL",
        "TRIAGE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
