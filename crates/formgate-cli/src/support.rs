use crate::cli::{ActorArgs, StoreArgs};
use chrono::{DateTime, Utc};
use formgate_kernel::{RawAnswers, SubmitError};
use formgate_store::{DirectoryUploads, EngineConfig, FormService, Requester, ServiceError};
use serde_json::{Value, json};
use std::fmt::Display;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Logs go to stderr so `--json` output on stdout stays parseable.
pub fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        1 => "debug".into(),
        _ => "trace".into(),
    };
    tracing_subscriber::registry()
        .with(EnvFilter::new(filter))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

pub fn fail(message: impl Display) -> ! {
    eprintln!("error: {message}");
    std::process::exit(1);
}

pub fn or_exit<T, E: Display>(result: Result<T, E>) -> T {
    result.unwrap_or_else(|e| fail(e))
}

pub fn yes_no(ok: bool) -> &'static str {
    if ok { "yes" } else { "no" }
}

pub fn print_json(payload: &Value) {
    match serde_json::to_string_pretty(payload) {
        Ok(text) => println!("{text}"),
        Err(e) => fail(format!("json serialization: {e}")),
    }
}

/// Build the service from `--config` and `--store`.
pub fn open_service_or_exit(common: &StoreArgs) -> FormService {
    let config = EngineConfig::load(&common.config).unwrap_or_else(|e| fail(e));
    let store_path = common
        .store
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| config.store.path.clone());
    let uploads = DirectoryUploads::new(
        config.uploads.staging_dir.clone(),
        config.uploads.storage_dir.clone(),
    );
    debug!(store = %store_path.display(), config = %common.config, "opening form store");
    FormService::new(store_path, config, Arc::new(uploads))
}

pub fn requester(actor: &ActorArgs) -> Requester {
    Requester {
        user_id: actor.user.clone(),
        link_token: actor.token.clone(),
    }
}

/// Caller identity for owner-only commands.
pub fn owner_or_exit(actor: &ActorArgs) -> String {
    match actor.user.as_deref().map(str::trim) {
        Some(user) if !user.is_empty() => user.to_string(),
        _ => fail("--as USER is required for this command"),
    }
}

/// The explicit form id, else the form the caller's link token opens.
pub fn form_id_or_exit(service: &FormService, form_id: Option<u64>, actor: &ActorArgs) -> u64 {
    if let Some(id) = form_id {
        return id;
    }
    match actor.token.as_deref() {
        Some(token) => or_exit(service.form_for_link(token)),
        None => fail("a form id or --token is required"),
    }
}

/// `--at` as an RFC 3339 instant, or the current time.
pub fn parse_time_or_exit(at: Option<&str>) -> DateTime<Utc> {
    match at {
        Some(raw) => DateTime::parse_from_rfc3339(raw.trim())
            .map(|at| at.with_timezone(&Utc))
            .unwrap_or_else(|e| fail(format!("invalid RFC 3339 time `{raw}`: {e}"))),
        None => Utc::now(),
    }
}

/// Inline JSON, or `@path` to read it from a file.
pub fn parse_answers_or_exit(raw: &str) -> RawAnswers {
    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .unwrap_or_else(|e| fail(format!("failed to read answers {path}: {e}"))),
        None => raw.to_string(),
    };
    serde_json::from_str(&text).unwrap_or_else(|e| fail(format!("invalid answers JSON: {e}")))
}

pub fn block_on_or_exit<F: Future>(future: F) -> F::Output {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| fail(format!("failed to create tokio runtime: {e}")));
    runtime.block_on(future)
}

pub fn submit_error_payload(err: &SubmitError) -> Value {
    let mut payload = json!({
        "code": err.code(),
        "message": err.to_string(),
    });
    if let SubmitError::InvalidAnswer(rejection) = err {
        payload["rejection"] = json!(rejection);
    }
    payload
}

/// Report a rejected submission: JSON on stdout with `--json`, otherwise
/// `error: ...` on stderr. Exits 1 either way.
pub fn reject_submission(action: &str, err: &SubmitError, json_output: bool) -> ! {
    if json_output {
        print_json(&json!({
            "action": action,
            "accepted": false,
            "error": submit_error_payload(err),
        }));
        std::process::exit(1);
    }
    fail(err)
}

pub fn reject_service(action: &str, err: ServiceError, json_output: bool) -> ! {
    match err {
        ServiceError::Submit(err) => reject_submission(action, &err, json_output),
        other => fail(other),
    }
}
