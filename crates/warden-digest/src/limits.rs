//! Bounded payload limits: canonical byte size, nesting depth, list length.
//!
//! Traversals are iterative and stop at a ceiling slightly above the
//! configured limit, so hostile payloads cannot force unbounded work.

use serde_json::{Map, Value};
use warden_core::reasons::ReasonCode;
use warden_core::traits::ExecutorLimits;

use crate::canonical::{canonical_object, canonical_string};

const DEPTH_CEILING_SLACK: usize = 10;
const LIST_CEILING_SLACK: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimitError {
    #[error("payload size {actual} exceeds max_bytes ({limit})")]
    TooLarge { actual: usize, limit: usize },
    #[error("payload depth {depth} exceeds max_depth ({limit})")]
    TooDeep { depth: usize, limit: usize },
    #[error("list length {len} exceeds max_list_len ({limit})")]
    ListTooLong { len: usize, limit: usize },
}

impl LimitError {
    pub fn reason_code(&self) -> ReasonCode {
        ReasonCode::LimitExceeded
    }
}

pub fn canonical_size(value: &Value) -> usize {
    canonical_string(value).len()
}

/// Deepest container nesting (a scalar is depth 0, `{}` is 1).
/// Returns `Err(depth)` as soon as a container deeper than `ceiling` is seen.
pub fn max_depth(value: &Value, ceiling: usize) -> Result<usize, usize> {
    if !is_container(value) {
        return Ok(0);
    }
    deepest_from(vec![(value, 1)], 1, ceiling)
}

/// [`max_depth`] of `Value::Object(map)`, without building the value.
pub fn max_object_depth(map: &Map<String, Value>, ceiling: usize) -> Result<usize, usize> {
    if ceiling == 0 {
        return Err(1);
    }
    let roots = map.values().filter(|c| is_container(c)).map(|c| (c, 2)).collect();
    deepest_from(roots, 1, ceiling)
}

fn deepest_from(mut stack: Vec<(&Value, usize)>, mut deepest: usize, ceiling: usize) -> Result<usize, usize> {
    while let Some((node, depth)) = stack.pop() {
        if depth > ceiling {
            return Err(depth);
        }
        deepest = deepest.max(depth);
        for child in children(node).filter(|c| is_container(c)) {
            stack.push((child, depth + 1));
        }
    }
    Ok(deepest)
}

/// Longest list anywhere in the payload.
/// Returns `Err(len)` as soon as a list longer than `ceiling` is seen.
pub fn max_list_len(value: &Value, ceiling: usize) -> Result<usize, usize> {
    longest_from(vec![value], ceiling)
}

/// [`max_list_len`] of `Value::Object(map)`.
pub fn max_object_list_len(map: &Map<String, Value>, ceiling: usize) -> Result<usize, usize> {
    longest_from(map.values().collect(), ceiling)
}

fn longest_from(mut stack: Vec<&Value>, ceiling: usize) -> Result<usize, usize> {
    let mut longest = 0;
    while let Some(node) = stack.pop() {
        if let Value::Array(items) = node {
            if items.len() > ceiling {
                return Err(items.len());
            }
            longest = longest.max(items.len());
        }
        stack.extend(children(node).filter(|c| is_container(c)));
    }
    Ok(longest)
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::Object(_))
}

fn children(value: &Value) -> Box<dyn Iterator<Item = &Value> + '_> {
    match value {
        Value::Array(items) => Box::new(items.iter()),
        Value::Object(map) => Box::new(map.values()),
        _ => Box::new(std::iter::empty()),
    }
}

/// Enforce size, then depth, then list length.
pub fn check_payload_limits(value: &Value, limits: &ExecutorLimits) -> Result<(), LimitError> {
    enforce(
        || canonical_size(value),
        |ceiling| max_depth(value, ceiling),
        |ceiling| max_list_len(value, ceiling),
        limits,
    )
}

/// [`check_payload_limits`] for a borrowed object payload. Every traversal is
/// iterative, so arbitrarily deep input is rejected without recursion.
pub fn check_object_limits(map: &Map<String, Value>, limits: &ExecutorLimits) -> Result<(), LimitError> {
    enforce(
        || canonical_object(map).len(),
        |ceiling| max_object_depth(map, ceiling),
        |ceiling| max_object_list_len(map, ceiling),
        limits,
    )
}

fn enforce(
    size: impl FnOnce() -> usize,
    depth: impl FnOnce(usize) -> Result<usize, usize>,
    list_len: impl FnOnce(usize) -> Result<usize, usize>,
    limits: &ExecutorLimits,
) -> Result<(), LimitError> {
    let size = size();
    if size > limits.max_payload_bytes {
        return Err(LimitError::TooLarge {
            actual: size,
            limit: limits.max_payload_bytes,
        });
    }

    let depth = depth(limits.max_depth + DEPTH_CEILING_SLACK).unwrap_or_else(|d| d);
    if depth > limits.max_depth {
        return Err(LimitError::TooDeep {
            depth,
            limit: limits.max_depth,
        });
    }

    let len = list_len(limits.max_list_len + LIST_CEILING_SLACK).unwrap_or_else(|l| l);
    if len > limits.max_list_len {
        return Err(LimitError::ListTooLong {
            len,
            limit: limits.max_list_len,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn limits(bytes: usize, depth: usize, list: usize) -> ExecutorLimits {
        ExecutorLimits {
            max_payload_bytes: bytes,
            max_depth: depth,
            max_list_len: list,
            ..ExecutorLimits::default()
        }
    }

    fn nested(depth: usize) -> Value {
        let mut v = json!(1);
        for _ in 0..depth {
            v = json!({ "k": v });
        }
        v
    }

    #[test]
    fn depth_counts_containers() {
        assert_eq!(max_depth(&json!(5), 100), Ok(0));
        assert_eq!(max_depth(&json!({}), 100), Ok(1));
        assert_eq!(max_depth(&json!({"a": [1, {"b": []}]}), 100), Ok(4));
    }

    #[test]
    fn depth_stops_at_ceiling() {
        assert_eq!(max_depth(&nested(50), 5), Err(6));
    }

    #[test]
    fn list_length_found_anywhere() {
        let v = json!({"a": [1, 2], "b": {"c": [1, 2, 3, 4]}});
        assert_eq!(max_list_len(&v, 100), Ok(4));
        assert_eq!(max_list_len(&v, 3), Err(4));
    }

    #[test]
    fn within_limits_passes() {
        let v = json!({"text": "hello", "tags": [1, 2, 3]});
        assert_eq!(check_payload_limits(&v, &limits(1000, 3, 3)), Ok(()));
    }

    #[test]
    fn size_checked_first() {
        let v = json!({"text": "x".repeat(100)});
        let err = check_payload_limits(&v, &limits(50, 0, 0)).unwrap_err();
        assert!(matches!(err, LimitError::TooLarge { limit: 50, .. }));
        assert_eq!(err.reason_code(), ReasonCode::LimitExceeded);
    }

    #[test]
    fn too_deep() {
        let err = check_payload_limits(&nested(12), &limits(10_000, 10, 100)).unwrap_err();
        assert_eq!(err, LimitError::TooDeep { depth: 12, limit: 10 });
        let err = check_payload_limits(&nested(40), &limits(10_000, 10, 100)).unwrap_err();
        assert_eq!(err, LimitError::TooDeep { depth: 21, limit: 10 });
    }

    #[test]
    fn list_too_long() {
        let v = json!({"items": vec![0; 101]});
        let err = check_payload_limits(&v, &limits(10_000, 10, 100)).unwrap_err();
        assert_eq!(err, LimitError::ListTooLong { len: 101, limit: 100 });
    }

    #[test]
    fn object_checks_agree_with_value_checks() {
        let v = json!({"a": [1, {"b": [2, 3]}], "c": {}});
        let Value::Object(map) = &v else { unreachable!() };
        assert_eq!(max_object_depth(map, 100), max_depth(&v, 100));
        assert_eq!(max_object_depth(map, 2), max_depth(&v, 2));
        assert_eq!(max_object_list_len(map, 100), Ok(2));
        assert_eq!(max_object_depth(&Map::new(), 100), Ok(1));

        let deep = nested(30);
        let Value::Object(map) = &deep else { unreachable!() };
        assert_eq!(
            check_object_limits(map, &limits(10_000, 10, 100)),
            check_payload_limits(&deep, &limits(10_000, 10, 100))
        );
    }
}
