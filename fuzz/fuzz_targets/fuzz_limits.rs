#![no_main]
use libfuzzer_sys::fuzz_target;
use warden_core::traits::ExecutorLimits;

fuzz_target!(|data: &[u8]| {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) {
        let limits = ExecutorLimits::default();
        let whole = warden_digest::check_payload_limits(&value, &limits);
        if let serde_json::Value::Object(map) = &value {
            assert_eq!(warden_digest::check_object_limits(map, &limits), whole);
        }
    }
});
