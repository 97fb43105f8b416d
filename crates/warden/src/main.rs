#![forbid(unsafe_code)]

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use tracing_subscriber::EnvFilter;
use warden_core::config::GovernanceConfig;
use warden_core::contracts::GateInput;
use warden_core::types::TraceId;
use warden_engine::audit::verify_chain;
use warden_engine::executors::builtin_registry;
use warden_engine::policy::PolicyCatalog;
use warden_engine::registry::{ActionRegistry, ActionRouter};
use warden_engine::resilience::ResilienceLayer;
use warden_engine::Governor;

#[derive(Parser)]
#[command(
    name = "warden",
    version,
    about = "Policy-gated, audited action execution. JSON in, JSON out."
)]
struct Cli {
    /// Audit log path (overrides WARDEN_AUDIT_LOG_PATH).
    #[arg(long, global = true)]
    audit_log: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(clap::Args)]
struct Request {
    /// Action id, e.g. "process".
    action: String,

    /// Payload JSON object (or "-" for stdin).
    #[arg(long, default_value = "{}")]
    payload: String,

    /// Policy catalog JSON file (built-in catalog when omitted).
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Caller permits external-origin fields.
    #[arg(long)]
    allow_external: bool,

    /// Caller relaxes unknown-field strictness (the profile may still force it).
    #[arg(long)]
    allow_unknown_fields: bool,

    /// Correlation id (generated when omitted).
    #[arg(long)]
    trace_id: Option<String>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Evaluate the policy gate and record the decision. Exit 1 on DENY.
    Gate(Request),

    /// Gate, audit and execute an action. Exit 1 unless the result is SUCCESS.
    Run(Request),

    /// Print the policy catalog export.
    Catalog {
        /// Catalog JSON file (built-in catalog when omitted).
        file: Option<PathBuf>,

        /// Print only the catalog fingerprint.
        #[arg(long)]
        fingerprint: bool,

        /// Validate the file and print a short report.
        #[arg(long)]
        validate: bool,
    },

    /// Print the action registry, routes and registry fingerprint.
    Actions,

    /// Audit log operations.
    Audit {
        /// Audit log file (configured path when omitted).
        file: Option<PathBuf>,

        /// Verify the hash chain.
        #[arg(long)]
        verify: bool,
    },

    /// Print the effective configuration.
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = GovernanceConfig::from_env();
    if let Some(path) = cli.audit_log {
        config.audit_log_path = path;
    }

    match cli.cmd {
        Cmd::Gate(req) => cmd_gate(&config, &req),
        Cmd::Run(req) => cmd_run(&config, &req),
        Cmd::Catalog {
            file,
            fingerprint,
            validate,
        } => cmd_catalog(file.as_deref(), fingerprint, validate),
        Cmd::Actions => cmd_actions(),
        Cmd::Audit { file, verify } => cmd_audit(&config, file.as_deref(), verify),
        Cmd::Config => cmd_config(&config),
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_payload(arg: &str) -> Result<Map<String, Value>> {
    let text = if arg == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        arg.to_string()
    };
    match serde_json::from_str(&text).context("payload is not valid JSON")? {
        Value::Object(map) => Ok(map),
        _ => bail!("payload must be a JSON object"),
    }
}

fn load_catalog(path: Option<&Path>) -> Result<PolicyCatalog> {
    match path {
        Some(p) => {
            let catalog = PolicyCatalog::from_file(p)?;
            tracing::debug!(path = %p.display(), fingerprint = %catalog.fingerprint(), "catalog loaded");
            Ok(catalog)
        }
        None => Ok(PolicyCatalog::builtin()),
    }
}

fn prepare(config: &GovernanceConfig, req: &Request) -> Result<(Governor, GateInput, TraceId)> {
    let governor = Governor::from_config(config, load_catalog(req.catalog.as_deref())?);
    let input = GateInput::new(&req.action, read_payload(&req.payload)?)
        .allow_external(req.allow_external)
        .deny_unknown_fields(!req.allow_unknown_fields);
    let trace_id = match &req.trace_id {
        Some(t) => t.parse::<TraceId>().with_context(|| format!("invalid trace id {t:?}"))?,
        None => TraceId::generate(),
    };
    Ok((governor, input, trace_id))
}

fn cmd_gate(config: &GovernanceConfig, req: &Request) -> Result<()> {
    let (governor, input, trace_id) = prepare(config, req)?;
    let (gate, decision) = governor.decide(&input, &trace_id)?;
    print_json(&json!({ "gate": gate, "decision": decision }))?;
    if !gate.is_allow() {
        bail!("denied: {:?}", gate.reason_codes());
    }
    Ok(())
}

fn cmd_run(config: &GovernanceConfig, req: &Request) -> Result<()> {
    let (governor, input, trace_id) = prepare(config, req)?;
    let submission = governor.submit(&input, trace_id)?;
    print_json(&submission)?;
    match &submission.action {
        Some(result) if result.is_success() => Ok(()),
        Some(result) => bail!("action {}: {:?}", result.status(), result.reason_codes()),
        None => bail!("denied: {:?}", submission.gate.reason_codes()),
    }
}

fn cmd_catalog(file: Option<&Path>, fingerprint: bool, validate: bool) -> Result<()> {
    let catalog = load_catalog(file)?;
    if validate {
        eprintln!("  catalog valid ({} profiles)", catalog.len());
        return print_json(&json!({
            "valid": true,
            "profiles": catalog.len(),
            "fingerprint": catalog.fingerprint(),
        }));
    }
    if fingerprint {
        println!("{}", catalog.fingerprint());
        return Ok(());
    }
    print_json(&catalog.export())
}

fn cmd_actions() -> Result<()> {
    let registry = ActionRegistry::builtin();
    let executors = builtin_registry(Arc::new(ResilienceLayer::default()));
    print_json(&json!({
        "actions": registry.export(),
        "routes": ActionRouter::builtin().routes(),
        "executors": executors.ids(),
        "fingerprint": registry.fingerprint(),
    }))
}

fn cmd_audit(config: &GovernanceConfig, file: Option<&Path>, verify: bool) -> Result<()> {
    if !verify {
        bail!("specify --verify");
    }
    let path = file.unwrap_or(&config.audit_log_path);
    if !path.exists() {
        eprintln!("  no audit log found at {}", path.display());
        return print_json(&json!({ "valid": true, "entries": 0, "head": "genesis" }));
    }
    let summary = verify_chain(path)?;
    eprintln!("  audit chain valid ({} entries)", summary.entries);
    print_json(&json!({ "valid": true, "entries": summary.entries, "head": summary.head }))
}

fn cmd_config(config: &GovernanceConfig) -> Result<()> {
    print_json(&json!({
        "executor_timeout_s": config.executor_timeout.as_secs_f64(),
        "circuit_breaker": {
            "failure_threshold": config.breaker.failure_threshold,
            "cooldown_s": config.breaker.cooldown.as_secs_f64(),
        },
        "rate_limits": {
            "per_provider": config.rate_limits.per_provider,
            "default_limit": config.rate_limits.default_limit,
            "window_s": config.rate_limits.window.as_secs_f64(),
        },
        "retry": {
            "max_retries": config.retry.max_retries,
            "base_delay_ms": config.retry.base_delay.as_millis() as u64,
            "timeout_s": config.retry.timeout.as_secs_f64(),
        },
        "audit_log_path": config.audit_log_path,
        "action_audit_log_path": config.action_audit_path(),
    }))
}
