//! Governed execution: route, validate, limit, pre-audit, execute, post-audit.
//!
//! Every step is fail-closed and short-circuits with a BLOCKED or FAILED
//! result. Only the [`ActionResult`] proof object leaves the pipeline; the raw
//! executor output is digested and dropped.

use std::cmp::Ordering;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use warden_core::capabilities::{self, CapabilityCheck};
use warden_core::config::GovernanceConfig;
use warden_core::contracts::{ActionRequest, ActionResult, Attribution, UNKNOWN};
use warden_core::errors::ExecutorError;
use warden_core::reasons::ReasonCode;
use warden_core::semver;
use warden_core::traits::Executor;
use warden_core::types::TraceId;
use warden_digest::{check_object_limits, sha256_object, sha256_value};

use crate::audit::AuditTrail;
use crate::registry::{ActionRegistry, ActionRouter, ExecutorRegistry};

pub struct GovernedPipeline {
    router: ActionRouter,
    actions: Arc<ActionRegistry>,
    executors: Arc<ExecutorRegistry>,
    audit: AuditTrail,
    executor_timeout: Duration,
}

impl GovernedPipeline {
    pub fn new(actions: Arc<ActionRegistry>, executors: Arc<ExecutorRegistry>, audit: AuditTrail) -> Self {
        Self {
            router: ActionRouter::builtin(),
            actions,
            executors,
            audit,
            executor_timeout: GovernanceConfig::default().executor_timeout,
        }
    }

    pub fn with_router(mut self, router: ActionRouter) -> Self {
        self.router = router;
        self
    }

    /// Upper bound on executor time; an executor's own limit may be tighter.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.executor_timeout = timeout;
        self
    }

    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    pub fn executors(&self) -> &ExecutorRegistry {
        &self.executors
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    /// Serialize a typed payload and run it. A payload that does not
    /// serialize to a JSON object is blocked with `NON_JSON_PAYLOAD`.
    pub fn run_serialized<P: Serialize + ?Sized>(&self, action: &str, payload: &P, trace_id: TraceId) -> ActionResult {
        match serde_json::to_value(payload) {
            Ok(value) => self.run_value(action, &value, trace_id),
            Err(e) => {
                debug!(trace_id = %trace_id, error = %e, "payload is not JSON-representable");
                let (who, _) = self.attribute(action, trace_id);
                self.terminate(ActionResult::blocked(&who, ReasonCode::NonJsonPayload))
            }
        }
    }

    /// Run a JSON payload; anything but an object is `NON_JSON_PAYLOAD`.
    pub fn run_value(&self, action: &str, payload: &Value, trace_id: TraceId) -> ActionResult {
        match payload {
            Value::Object(map) => self.run(action, map, trace_id),
            _ => {
                let (who, _) = self.attribute(action, trace_id);
                self.terminate(ActionResult::blocked(&who, ReasonCode::NonJsonPayload))
            }
        }
    }

    /// The payload is only borrowed until the limits have passed: digest and
    /// limit checks walk it iteratively, so nesting of any depth is rejected
    /// without recursion. It is cloned for the executor only afterwards.
    pub fn run(&self, action: &str, payload: &Map<String, Value>, trace_id: TraceId) -> ActionResult {
        // 1. route
        let (mut who, executor_id) = self.attribute(action, trace_id);

        // 2. canonical digest
        who.input_digest = Some(sha256_object(payload));

        // 3. metadata
        let Some(executor_id) = executor_id else {
            return self.terminate(ActionResult::blocked(&who, ReasonCode::ActionUnknown));
        };
        let meta = self.actions.get(action);
        let legacy = self.actions.is_legacy(action);

        // 4. action version
        if !legacy {
            let version = meta.as_ref().and_then(|m| m.action_version.as_deref());
            match version {
                None => return self.terminate(ActionResult::blocked(&who, ReasonCode::ActionVersionMissing)),
                Some(v) if !semver::is_valid(v) => {
                    return self.terminate(ActionResult::blocked(&who, ReasonCode::ActionVersionInvalid))
                }
                Some(_) => {}
            }
        }

        // 5. executor
        let Some(executor) = self.executors.get(&executor_id) else {
            return self.terminate(ActionResult::blocked(&who, ReasonCode::ExecutorNotFound));
        };
        who.executor_version = executor.version().unwrap_or(UNKNOWN).to_string();

        if let (false, Some(meta)) = (legacy, &meta) {
            // 6. minimum executor version
            if let Some(min) = &meta.min_executor_version {
                let Some(version) = executor.version() else {
                    return self.terminate(ActionResult::blocked(&who, ReasonCode::ExecutorVersionMissing));
                };
                if !matches!(semver::compare(version, min), Ok(Ordering::Equal | Ordering::Greater)) {
                    return self.terminate(ActionResult::blocked(&who, ReasonCode::ExecutorVersionIncompatible));
                }
            }

            // 7. capabilities
            match capabilities::check(&meta.required_capabilities, executor.capabilities()) {
                CapabilityCheck::Satisfied => {}
                CapabilityCheck::Undeclared => {
                    return self.terminate(ActionResult::blocked(&who, ReasonCode::ExecutorCapabilityMissing))
                }
                CapabilityCheck::Missing(missing) => {
                    debug!(trace_id = %who.trace_id, ?missing, "executor lacks required capabilities");
                    return self.terminate(ActionResult::blocked(&who, ReasonCode::ExecutorCapabilityMismatch));
                }
            }
        }

        // 8. limits
        if let Err(e) = check_object_limits(payload, executor.limits()) {
            debug!(trace_id = %who.trace_id, error = %e, "payload rejected by executor limits");
            return self.terminate(ActionResult::blocked(&who, e.reason_code()));
        }

        // 9. pre-audit
        if self.audit.record_action(&ActionResult::pending(&who)).is_err() {
            return self.terminate(ActionResult::blocked(&who, ReasonCode::AuditLogFailed));
        }

        // 10-11. invoke
        let request = ActionRequest::new(action, payload.clone(), who.trace_id.clone());
        let timeout = self.executor_timeout.min(executor.limits().timeout);
        let result = match invoke(executor, request, timeout) {
            Ok(output) => ActionResult::success(&who, output.as_ref().map(sha256_value)),
            Err(ExecutorError::Timeout(after)) => {
                warn!(trace_id = %who.trace_id, ?after, "executor timed out");
                ActionResult::failed(&who, ReasonCode::ExecutorTimeout)
            }
            Err(e) => {
                warn!(trace_id = %who.trace_id, error = %e, "executor failed");
                ActionResult::failed(&who, ReasonCode::ExecutorException)
            }
        };

        // 12-13. post-audit
        self.terminate(result)
    }

    /// Attribution for `action` with the executor it routes to, if any.
    fn attribute(&self, action: &str, trace_id: TraceId) -> (Attribution, Option<String>) {
        let mut who = Attribution::new(action, trace_id);
        let executor_id = self
            .router
            .route(action)
            .map(str::to_string)
            .or_else(|| self.actions.get(action).map(|m| m.executor));
        if let Some(id) = &executor_id {
            who.executor_id = id.clone();
        }
        (who, executor_id)
    }

    /// Write the terminal record. A result that cannot be recorded is
    /// downgraded to BLOCKED/AUDIT_LOG_FAILED, and that record is attempted once.
    fn terminate(&self, result: ActionResult) -> ActionResult {
        let result = match self.audit.record_action(&result) {
            Ok(()) => result,
            Err(_) => {
                let downgraded = result.downgraded(ReasonCode::AuditLogFailed);
                if let Err(e) = self.audit.record_action(&downgraded) {
                    warn!(trace_id = %downgraded.trace_id(), error = %e, "downgraded record not persisted");
                }
                downgraded
            }
        };
        info!(
            target: "action_audit",
            trace_id = %result.trace_id(),
            action = result.action(),
            executor_id = result.executor_id(),
            status = %result.status(),
            reason_codes = ?result.reason_codes(),
            "action result"
        );
        result
    }
}

/// Run the executor on its own thread and wait at most `timeout`. A panicking
/// executor drops the sender, which surfaces as a failure. On timeout the
/// request's cancel token fires, so an executor still running stops before
/// its next side effect.
fn invoke(executor: Arc<dyn Executor>, request: ActionRequest, timeout: Duration) -> Result<Option<Value>, ExecutorError> {
    let cancel = request.cancel.clone();
    let (tx, rx) = mpsc::sync_channel(1);
    thread::Builder::new()
        .name(format!("exec-{}", executor.id()))
        .spawn(move || {
            let _ = tx.send(executor.execute(&request));
        })
        .map_err(|e| ExecutorError::Failed(e.to_string()))?;
    match rx.recv_timeout(timeout) {
        Ok(outcome) => outcome,
        Err(RecvTimeoutError::Timeout) => {
            cancel.cancel();
            Err(ExecutorError::Timeout(timeout))
        }
        Err(RecvTimeoutError::Disconnected) => Err(ExecutorError::Failed("executor panicked".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::memory::FailingAuditSink;
    use crate::audit::MemoryAuditSink;
    use crate::executors::{builtin_registry, GenerationRequest, LlmExecutor, TextProvider};
    use crate::registry::ActionMeta;
    use crate::resilience::{CircuitBreakerRegistry, CircuitState, RateLimiter, ResilienceLayer, RetryPolicy};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use warden_core::config::{BreakerConfig, RateLimitConfig};
    use warden_core::contracts::AuditRecord;
    use warden_core::errors::ProviderError;
    use warden_core::traits::{AuditSink, ExecutorLimits};
    use warden_core::types::ActionStatus;

    fn builtin(sink: Arc<dyn AuditSink>) -> GovernedPipeline {
        GovernedPipeline::new(
            Arc::new(ActionRegistry::builtin()),
            Arc::new(builtin_registry(Arc::new(ResilienceLayer::default()))),
            AuditTrail::single(sink),
        )
    }

    enum Behavior {
        Echo,
        Sleep(Duration),
        Panic,
        Fail,
    }

    struct Probe {
        version: Option<String>,
        caps: Option<Vec<String>>,
        limits: ExecutorLimits,
        behavior: Behavior,
        calls: Arc<AtomicUsize>,
    }

    impl Probe {
        fn new(behavior: Behavior) -> Self {
            Self {
                version: Some("1.0.0".into()),
                caps: Some(vec!["PROBE".into()]),
                limits: ExecutorLimits::default(),
                behavior,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl Executor for Probe {
        fn id(&self) -> &str {
            "probe_v1"
        }

        fn version(&self) -> Option<&str> {
            self.version.as_deref()
        }

        fn capabilities(&self) -> Option<&[String]> {
            self.caps.as_deref()
        }

        fn limits(&self) -> &ExecutorLimits {
            &self.limits
        }

        fn execute(&self, request: &ActionRequest) -> Result<Option<Value>, ExecutorError> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            match self.behavior {
                Behavior::Echo => Ok(Some(Value::Object(request.payload.clone()))),
                Behavior::Sleep(d) => {
                    thread::sleep(d);
                    Ok(None)
                }
                Behavior::Panic => panic!("probe exploded"),
                Behavior::Fail => Err(ExecutorError::Failed("boom".into())),
            }
        }
    }

    fn probe_pipeline(probe: Probe, meta: ActionMeta, sink: Arc<dyn AuditSink>) -> GovernedPipeline {
        let actions = ActionRegistry::new([("probe".to_string(), meta)], &[]).unwrap();
        let executors = ExecutorRegistry::new();
        executors.register(Arc::new(probe)).unwrap();
        GovernedPipeline::new(Arc::new(actions), Arc::new(executors), AuditTrail::single(sink))
            .with_router(ActionRouter::new([("probe", "probe_v1")]))
    }

    fn strict_meta() -> ActionMeta {
        ActionMeta::new("probe", "probe_v1")
            .action_version("1.0.0")
            .required_capabilities(["probe"])
            .min_executor_version("1.0.0")
    }

    fn codes(r: &ActionResult) -> Vec<ReasonCode> {
        r.reason_codes().to_vec()
    }

    fn statuses(sink: &MemoryAuditSink) -> Vec<ActionStatus> {
        sink.records()
            .iter()
            .map(|r| match r {
                AuditRecord::ActionAudit(a) => a.status(),
                AuditRecord::DecisionAudit(_) => panic!("unexpected decision record"),
            })
            .collect()
    }

    #[test]
    fn process_succeeds_with_dual_audit() {
        let sink = Arc::new(MemoryAuditSink::new());
        let p = builtin(sink.clone());
        let r = p.run_value("process", &json!({"text": "hello"}), TraceId::generate());

        assert_eq!(r.status(), ActionStatus::Success);
        assert!(r.reason_codes().is_empty());
        assert_eq!(r.executor_id(), "text_process_v1");
        assert_eq!(r.executor_version(), "1.0.0");
        assert_eq!(r.input_digest(), Some(&sha256_value(&json!({"text": "hello"}))));
        assert_eq!(
            r.output_digest(),
            Some(&sha256_value(&json!({"processed": "HELLO", "length": 5})))
        );
        assert_eq!(statuses(&sink), vec![ActionStatus::Pending, ActionStatus::Success]);
    }

    #[test]
    fn unknown_action_is_blocked() {
        let sink = Arc::new(MemoryAuditSink::new());
        let r = builtin(sink.clone()).run_value("delete_everything", &json!({}), TraceId::generate());
        assert_eq!(r.status(), ActionStatus::Blocked);
        assert_eq!(codes(&r), vec![ReasonCode::ActionUnknown]);
        assert_eq!(r.executor_id(), UNKNOWN);
        assert_eq!(statuses(&sink), vec![ActionStatus::Blocked]);
    }

    #[test]
    fn non_json_payload_is_blocked_without_digest() {
        let sink = Arc::new(MemoryAuditSink::new());
        let p = builtin(sink);
        let mut bad = HashMap::new();
        bad.insert((1, 2), "tuple keys");
        let r = p.run_serialized("process", &bad, TraceId::generate());
        assert_eq!(codes(&r), vec![ReasonCode::NonJsonPayload]);
        assert!(r.input_digest().is_none());

        let r = p.run_value("process", &json!([1, 2]), TraceId::generate());
        assert_eq!(codes(&r), vec![ReasonCode::NonJsonPayload]);
    }

    #[test]
    fn legacy_actions_skip_version_checks() {
        let sink = Arc::new(MemoryAuditSink::new());
        let r = builtin(sink).run_value("noop", &json!({}), TraceId::generate());
        assert_eq!(r.status(), ActionStatus::Success);
        assert!(r.output_digest().is_none());
    }

    #[test]
    fn action_version_missing_and_invalid() {
        let sink = Arc::new(MemoryAuditSink::new());
        let p = probe_pipeline(Probe::new(Behavior::Echo), ActionMeta::new("probe", "probe_v1"), sink.clone());
        let r = p.run_value("probe", &json!({}), TraceId::generate());
        assert_eq!(codes(&r), vec![ReasonCode::ActionVersionMissing]);

        let p = probe_pipeline(
            Probe::new(Behavior::Echo),
            ActionMeta::new("probe", "probe_v1").action_version("v1"),
            sink,
        );
        let r = p.run_value("probe", &json!({}), TraceId::generate());
        assert_eq!(codes(&r), vec![ReasonCode::ActionVersionInvalid]);
    }

    #[test]
    fn executor_not_found() {
        let sink = Arc::new(MemoryAuditSink::new());
        let p = probe_pipeline(Probe::new(Behavior::Echo), strict_meta(), sink)
            .with_router(ActionRouter::new([("probe", "ghost_v9")]));
        let r = p.run_value("probe", &json!({}), TraceId::generate());
        assert_eq!(codes(&r), vec![ReasonCode::ExecutorNotFound]);
        assert_eq!(r.executor_id(), "ghost_v9");
    }

    #[test]
    fn executor_version_checks_are_numeric() {
        let sink = Arc::new(MemoryAuditSink::new());
        let mut probe = Probe::new(Behavior::Echo);
        probe.version = Some("1.10.0".into());
        let p = probe_pipeline(probe, strict_meta().min_executor_version("1.9.0"), sink.clone());
        assert_eq!(p.run_value("probe", &json!({}), TraceId::generate()).status(), ActionStatus::Success);

        let mut probe = Probe::new(Behavior::Echo);
        probe.version = Some("1.9.0".into());
        let p = probe_pipeline(probe, strict_meta().min_executor_version("1.10.0"), sink.clone());
        let r = p.run_value("probe", &json!({}), TraceId::generate());
        assert_eq!(codes(&r), vec![ReasonCode::ExecutorVersionIncompatible]);

        let mut probe = Probe::new(Behavior::Echo);
        probe.version = None;
        let p = probe_pipeline(probe, strict_meta(), sink);
        let r = p.run_value("probe", &json!({}), TraceId::generate());
        assert_eq!(codes(&r), vec![ReasonCode::ExecutorVersionMissing]);
        assert_eq!(r.executor_version(), UNKNOWN);
    }

    #[test]
    fn capability_checks() {
        let sink = Arc::new(MemoryAuditSink::new());
        let mut probe = Probe::new(Behavior::Echo);
        probe.caps = None;
        let p = probe_pipeline(probe, strict_meta(), sink.clone());
        assert_eq!(
            codes(&p.run_value("probe", &json!({}), TraceId::generate())),
            vec![ReasonCode::ExecutorCapabilityMissing]
        );

        let mut probe = Probe::new(Behavior::Echo);
        probe.caps = Some(vec![" probe ".into()]);
        let p = probe_pipeline(probe, strict_meta().required_capabilities(["probe", "extra"]), sink.clone());
        assert_eq!(
            codes(&p.run_value("probe", &json!({}), TraceId::generate())),
            vec![ReasonCode::ExecutorCapabilityMismatch]
        );

        let mut probe = Probe::new(Behavior::Echo);
        probe.caps = Some(vec![" probe ".into()]);
        let p = probe_pipeline(probe, strict_meta(), sink);
        assert_eq!(p.run_value("probe", &json!({}), TraceId::generate()).status(), ActionStatus::Success);
    }

    #[test]
    fn limits_are_enforced_before_pre_audit() {
        let sink = Arc::new(MemoryAuditSink::new());
        let mut probe = Probe::new(Behavior::Echo);
        probe.limits.max_list_len = 2;
        let p = probe_pipeline(probe, strict_meta(), sink.clone());
        let r = p.run_value("probe", &json!({"items": [1, 2, 3]}), TraceId::generate());
        assert_eq!(codes(&r), vec![ReasonCode::LimitExceeded]);
        assert_eq!(statuses(&sink), vec![ActionStatus::Blocked]);
    }

    #[test]
    fn executor_errors_and_panics_fail() {
        for behavior in [Behavior::Fail, Behavior::Panic] {
            let sink = Arc::new(MemoryAuditSink::new());
            let p = probe_pipeline(Probe::new(behavior), strict_meta(), sink.clone());
            let r = p.run_value("probe", &json!({}), TraceId::generate());
            assert_eq!(r.status(), ActionStatus::Failed);
            assert_eq!(codes(&r), vec![ReasonCode::ExecutorException]);
            assert_eq!(statuses(&sink), vec![ActionStatus::Pending, ActionStatus::Failed]);
        }
    }

    #[test]
    fn slow_executor_times_out() {
        let sink = Arc::new(MemoryAuditSink::new());
        let p = probe_pipeline(Probe::new(Behavior::Sleep(Duration::from_millis(500))), strict_meta(), sink.clone())
            .with_timeout(Duration::from_millis(20));
        let r = p.run_value("probe", &json!({}), TraceId::generate());
        assert_eq!(r.status(), ActionStatus::Failed);
        assert_eq!(codes(&r), vec![ReasonCode::ExecutorTimeout]);
        assert_eq!(statuses(&sink), vec![ActionStatus::Pending, ActionStatus::Failed]);
    }

    #[test]
    fn executor_limit_tightens_timeout() {
        let sink = Arc::new(MemoryAuditSink::new());
        let mut probe = Probe::new(Behavior::Sleep(Duration::from_millis(500)));
        probe.limits.timeout = Duration::from_millis(20);
        let p = probe_pipeline(probe, strict_meta(), sink);
        assert_eq!(
            codes(&p.run_value("probe", &json!({}), TraceId::generate())),
            vec![ReasonCode::ExecutorTimeout]
        );
    }

    #[test]
    fn pre_audit_failure_never_invokes_executor() {
        let sink = Arc::new(FailingAuditSink::after(0));
        let probe = Probe::new(Behavior::Echo);
        let calls = Arc::clone(&probe.calls);
        let p = probe_pipeline(probe, strict_meta(), sink.clone());
        let r = p.run_value("probe", &json!({"text": "x"}), TraceId::generate());
        assert_eq!(r.status(), ActionStatus::Blocked);
        assert_eq!(codes(&r), vec![ReasonCode::AuditLogFailed]);
        assert!(r.output_digest().is_none());
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn post_audit_failure_downgrades_success() {
        let sink = Arc::new(FailingAuditSink::after(1));
        let probe = Probe::new(Behavior::Echo);
        let calls = Arc::clone(&probe.calls);
        let p = probe_pipeline(probe, strict_meta(), sink.clone());
        let r = p.run_value("probe", &json!({"text": "x"}), TraceId::generate());
        assert_eq!(r.status(), ActionStatus::Blocked);
        assert_eq!(codes(&r), vec![ReasonCode::AuditLogFailed]);
        assert!(r.output_digest().is_some(), "downgrade keeps the output digest");
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
        // pre-audit, failed post-audit, one attempt at the downgraded record
        assert_eq!(sink.attempts(), 3);
        assert_eq!(sink.records().len(), 1);
    }

    #[test]
    fn blocked_requests_never_reach_the_executor() {
        let sink = Arc::new(MemoryAuditSink::new());
        let mut probe = Probe::new(Behavior::Echo);
        probe.limits.max_list_len = 1;
        let calls = Arc::clone(&probe.calls);
        let p = probe_pipeline(probe, strict_meta(), sink);
        assert_eq!(p.run_value("probe", &json!({"xs": [1, 2]}), TraceId::generate()).status(), ActionStatus::Blocked);
        assert_eq!(p.run_value("probe", &json!("scalar"), TraceId::generate()).status(), ActionStatus::Blocked);
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 0);
        assert_eq!(p.run_value("probe", &json!({"xs": [1]}), TraceId::generate()).status(), ActionStatus::Success);
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
    }

    /// Object nested `depth` levels under "k", built without recursion.
    fn deeply_nested(depth: usize) -> Map<String, Value> {
        let mut inner = Map::new();
        for _ in 0..depth {
            let mut outer = Map::new();
            outer.insert("k".to_string(), Value::Object(inner));
            inner = outer;
        }
        inner
    }

    /// Tear down iteratively; the default recursive drop would overflow.
    fn drop_nested(mut map: Map<String, Value>) {
        while let Some(Value::Object(next)) = map.remove("k") {
            map = next;
        }
    }

    #[test]
    fn very_deep_payload_is_blocked_without_recursion() {
        let sink = Arc::new(MemoryAuditSink::new());
        let probe = Probe::new(Behavior::Echo);
        let calls = Arc::clone(&probe.calls);
        let p = probe_pipeline(probe, strict_meta(), sink.clone());
        let payload = deeply_nested(20_000);

        let r = p.run("probe", &payload, TraceId::generate());
        assert_eq!(r.status(), ActionStatus::Blocked);
        assert_eq!(codes(&r), vec![ReasonCode::LimitExceeded]);
        assert!(r.input_digest().is_some());
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 0);
        assert_eq!(statuses(&sink), vec![ActionStatus::Blocked]);
        drop_nested(payload);
    }

    struct SlowRejecting {
        delay: Duration,
        calls: AtomicUsize,
    }

    impl TextProvider for SlowRejecting {
        fn name(&self) -> &str {
            "openai"
        }

        fn generate(&self, _: &GenerationRequest) -> Result<Value, ProviderError> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            thread::sleep(self.delay);
            Err(ProviderError::Rejected("openai".into(), "late".into()))
        }
    }

    #[test]
    fn timed_out_generation_leaves_breaker_state_alone() {
        let resilience = Arc::new(ResilienceLayer::new(
            RateLimiter::new(RateLimitConfig::default()),
            CircuitBreakerRegistry::new(BreakerConfig {
                failure_threshold: 1,
                cooldown: Duration::from_secs(60),
            }),
            RetryPolicy::new(2, Duration::from_millis(1), Duration::from_secs(5)),
        ));
        let provider = Arc::new(SlowRejecting {
            delay: Duration::from_millis(300),
            calls: AtomicUsize::new(0),
        });
        let executors = ExecutorRegistry::new();
        executors
            .register(Arc::new(LlmExecutor::new(vec![provider.clone()], Arc::clone(&resilience))))
            .unwrap();
        let sink = Arc::new(MemoryAuditSink::new());
        let p = GovernedPipeline::new(Arc::new(ActionRegistry::builtin()), Arc::new(executors), AuditTrail::single(sink))
            .with_timeout(Duration::from_millis(50));

        let r = p.run_value(
            "llm_generate",
            &json!({"prompt": "hi", "model": "gpt-4", "max_tokens": 8}),
            TraceId::generate(),
        );
        assert_eq!(codes(&r), vec![ReasonCode::ExecutorTimeout]);
        let breaker = resilience.breakers().get("openai");
        assert_eq!(breaker.consecutive_failures(), 0);

        // let the abandoned worker finish its provider call
        thread::sleep(Duration::from_millis(500));
        assert_eq!(provider.calls.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(breaker.consecutive_failures(), 0);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn same_trace_id_correlates_records() {
        let sink = Arc::new(MemoryAuditSink::new());
        let trace = TraceId::generate();
        builtin(sink.clone()).run_value("process", &json!({"text": "x"}), trace.clone());
        assert!(sink.records().iter().all(|r| r.trace_id() == &trace));
    }
}
