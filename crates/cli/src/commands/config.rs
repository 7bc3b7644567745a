use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use toml::Value;
use triage_core::config::{AppConfig, LoadOptions};

struct Field {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let llm = &config.llm;
    let api_key = if llm.api_key.is_some() { "<redacted>" } else { "<unset>" };

    vec![
        Field {
            key: "database.url",
            env_keys: &["TRIAGE_DATABASE_URL"],
            value: config.database.url.clone(),
        },
        Field {
            key: "database.max_connections",
            env_keys: &["TRIAGE_DATABASE_MAX_CONNECTIONS"],
            value: config.database.max_connections.to_string(),
        },
        Field {
            key: "database.timeout_secs",
            env_keys: &["TRIAGE_DATABASE_TIMEOUT_SECS"],
            value: config.database.timeout_secs.to_string(),
        },
        Field {
            key: "llm.provider",
            env_keys: &["TRIAGE_LLM_PROVIDER"],
            value: llm.provider.as_str().to_string(),
        },
        Field { key: "llm.model", env_keys: &["TRIAGE_LLM_MODEL"], value: llm.model.clone() },
        Field {
            key: "llm.base_url",
            env_keys: &["TRIAGE_LLM_BASE_URL"],
            value: llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
        },
        Field { key: "llm.api_key", env_keys: &["TRIAGE_LLM_API_KEY"], value: api_key.to_string() },
        Field {
            key: "llm.timeout_secs",
            env_keys: &["TRIAGE_LLM_TIMEOUT_SECS"],
            value: llm.timeout_secs.to_string(),
        },
        Field {
            key: "llm.connect_timeout_secs",
            env_keys: &["TRIAGE_LLM_CONNECT_TIMEOUT_SECS"],
            value: llm.connect_timeout_secs.to_string(),
        },
        Field {
            key: "llm.read_timeout_secs",
            env_keys: &["TRIAGE_LLM_READ_TIMEOUT_SECS"],
            value: llm.read_timeout_secs.to_string(),
        },
        Field {
            key: "llm.write_timeout_secs",
            env_keys: &["TRIAGE_LLM_WRITE_TIMEOUT_SECS"],
            value: llm.write_timeout_secs.to_string(),
        },
        Field {
            key: "llm.warmup",
            env_keys: &["TRIAGE_LLM_WARMUP"],
            value: llm.warmup.to_string(),
        },
        Field {
            key: "triage.pipeline",
            env_keys: &["TRIAGE_PIPELINE"],
            value: config.triage.pipeline.as_str().to_string(),
        },
        Field {
            key: "logging.level",
            env_keys: &["TRIAGE_LOGGING_LEVEL", "TRIAGE_LOG_LEVEL"],
            value: config.logging.level.clone(),
        },
        Field {
            key: "logging.format",
            env_keys: &["TRIAGE_LOGGING_FORMAT", "TRIAGE_LOG_FORMAT"],
            value: format!("{:?}", config.logging.format).to_lowercase(),
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("triage.toml"), PathBuf::from("config/triage.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
