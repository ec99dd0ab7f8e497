//! Structured logging for data-pipeline runs.
//!
//! Every record is one JSON line carrying the run id, a sequence number, the
//! level and a domain, so a run can be filtered and replayed from its logs.
//! Records go to `LOG_DIR/<run_id>/events.jsonl` (trace/debug to
//! `trace.jsonl`) and are echoed to stderr unless `LOG_ECHO=0`, so stdout
//! stays free for the binaries' own output.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("info") => Level::Info,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            Ok("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains (categories for filtering)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Fetch,      // HTTP/RPC calls, retries
    Align,      // Joins, origin normalization
    Metrics,    // Rolling stats, ratios
    Regime,     // Threshold runs
    Volatility, // Per-regime scoring
    Export,     // CSV and manifests
    Network,    // Solana network statistics
    System,     // Startup, config, summaries
    Profile,    // Stage timing
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Fetch => "fetch",
            Domain::Align => "align",
            Domain::Metrics => "metrics",
            Domain::Regime => "regime",
            Domain::Volatility => "volatility",
            Domain::Export => "export",
            Domain::Network => "network",
            Domain::System => "system",
            Domain::Profile => "profile",
        }
    }

    /// `LOG_DOMAINS`: comma-separated list or "all".
    pub fn is_enabled(&self) -> bool {
        match &ensure_run_context().domains {
            None => true,
            Some(enabled) => enabled.iter().any(|d| d == self.as_str()),
        }
    }
}

fn domains_from_env() -> Option<Vec<String>> {
    match std::env::var("LOG_DOMAINS").as_deref() {
        Ok("all") | Err(_) => None,
        Ok(list) => Some(list.split(',').map(|d| d.trim().to_string()).collect()),
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

/// Resolved once per process; filters are not re-read from the environment.
#[derive(Debug)]
struct RunContext {
    run_id: String,
    min_level: Level,
    domains: Option<Vec<String>>,
    echo: bool,
    events: Option<Mutex<BufWriter<File>>>,
    trace: Option<Mutex<BufWriter<File>>>,
}

fn open_log(path: PathBuf) -> Option<Mutex<BufWriter<File>>> {
    match File::create(&path) {
        Ok(f) => Some(Mutex::new(BufWriter::new(f))),
        Err(err) => {
            eprintln!("[log] failed to create {}: {}", path.display(), err);
            None
        }
    }
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let base = std::env::var("LOG_DIR").unwrap_or_else(|_| "out/runs".to_string());
        let mut run_dir = PathBuf::from(base);
        run_dir.push(&run_id);
        if let Err(err) = create_dir_all(&run_dir) {
            eprintln!("[log] failed to create run dir: {}", err);
        }

        let _ = std::fs::write(
            run_dir.join("manifest.json"),
            json!({
                "run_id": run_id,
                "ts": ts_now(),
                "pid": process::id(),
                "log_dir": run_dir.to_string_lossy(),
            })
            .to_string(),
        );

        RunContext {
            min_level: Level::from_env(),
            domains: domains_from_env(),
            echo: std::env::var("LOG_ECHO").map_or(true, |v| v != "0"),
            events: open_log(run_dir.join("events.jsonl")),
            trace: open_log(run_dir.join("trace.jsonl")),
            run_id,
        }
    })
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["identifier", "series", "source", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

fn write_line(writer: &Option<Mutex<BufWriter<File>>>, line: &str) {
    if let Some(Ok(mut w)) = writer.as_ref().map(|w| w.lock()) {
        let _ = writeln!(w, "{}", line);
        let _ = w.flush();
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Epoch milliseconds
pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    if level < ensure_run_context().min_level || !domain.is_enabled() {
        return;
    }
    emit_record(level, domain.as_str(), event, fields);
}

fn emit_record(level: Level, component: &str, event: &str, fields: Map<String, Value>) {
    let ctx = ensure_run_context();
    let (mut top, data) = split_fields(fields);

    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(ctx.run_id.clone()));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(component));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));

    let line = Value::Object(entry).to_string();
    match level {
        Level::Trace | Level::Debug => write_line(&ctx.trace, &line),
        _ => write_line(&ctx.events, &line),
    }
    if ctx.echo {
        eprintln!("{}", line);
    }
}

// =============================================================================
// Domain-Specific Logging Helpers
// =============================================================================

pub fn log_fetch_attempt_failed(operation: &str, attempt: u32, max_attempts: u32, error: &str, retry_in_ms: u64) {
    log(
        Level::Warn,
        Domain::Fetch,
        "attempt_failed",
        obj(&[
            ("operation", v_str(operation)),
            ("attempt", json!(attempt)),
            ("max_attempts", json!(max_attempts)),
            ("error", v_str(error)),
            ("retry_in_ms", json!(retry_in_ms)),
        ]),
    );
}

pub fn log_fetch_failure(source: &str, identifier: &str, error: &str) {
    log(
        Level::Error,
        Domain::Fetch,
        "source_unavailable",
        obj(&[
            ("source", v_str(source)),
            ("identifier", v_str(identifier)),
            ("error", v_str(error)),
        ]),
    );
}

pub fn log_fetched(source: &str, identifier: &str, points: usize) {
    log(
        Level::Debug,
        Domain::Fetch,
        "fetched",
        obj(&[
            ("source", v_str(source)),
            ("identifier", v_str(identifier)),
            ("points", json!(points)),
        ]),
    );
}

pub fn log_regime(series: &str, start: i64, end: i64, duration: usize) {
    log(
        Level::Debug,
        Domain::Regime,
        "regime",
        obj(&[
            ("series", v_str(series)),
            ("start", json!(start)),
            ("end", json!(end)),
            ("duration", json!(duration)),
        ]),
    );
}

pub fn log_issue(level: Level, kind: &str, msg: &str) {
    log(
        level,
        Domain::System,
        "issue",
        obj(&[("kind", v_str(kind)), ("msg", v_str(msg))]),
    );
}

pub fn log_export(path: &str, rows: usize, sha256: &str) {
    log(
        Level::Info,
        Domain::Export,
        "exported",
        obj(&[
            ("path", v_str(path)),
            ("rows", json!(rows)),
            ("sha256", v_str(sha256)),
        ]),
    );
}

// =============================================================================
// Utility Functions
// =============================================================================

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

pub fn v_opt(n: Option<f64>) -> Value {
    n.map(v_num).unwrap_or(Value::Null)
}

// =============================================================================
// Profiling Scope
// =============================================================================

/// Emits elapsed time for a pipeline stage on drop.
pub struct ProfileScope {
    label: &'static str,
    context: Map<String, Value>,
    started: Instant,
}

impl ProfileScope {
    pub fn new(label: &'static str) -> Self {
        Self::with_context(label, &[])
    }

    pub fn with_context(label: &'static str, fields: &[(&str, Value)]) -> Self {
        Self {
            label,
            context: obj(fields),
            started: Instant::now(),
        }
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let mut fields = std::mem::take(&mut self.context);
        fields.insert("label".to_string(), v_str(self.label));
        fields.insert("elapsed_ms".to_string(), v_num(elapsed_ms));
        log(Level::Trace, Domain::Profile, "profile", fields);
    }
}

// =============================================================================
// Tests
// =============================================================================
