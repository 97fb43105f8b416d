#![no_main]
use libfuzzer_sys::fuzz_target;
use warden_core::contracts::GateInput;
use warden_core::errors::Decision;
use warden_engine::policy::{PolicyCatalog, PolicyGate};

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = serde_json::from_slice::<GateInput>(data) {
        let gate = PolicyGate::new(PolicyCatalog::builtin());
        let result = gate.evaluate(&input);
        assert!(result.decision == Decision::Allow || !result.reasons.is_empty());
    }
});
