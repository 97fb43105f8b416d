#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) {
        let canonical = warden_digest::canonical_string(&value);
        let reparsed: serde_json::Value = serde_json::from_str(&canonical).unwrap();
        assert_eq!(warden_digest::sha256_value(&reparsed), warden_digest::sha256_value(&value));
    }
});
