//! Proptest strategies for gateway request and payload generation.

#![allow(dead_code)] // Each test binary uses a different subset of these strategies

use proptest::prelude::*;
use proptest::strategy::Just;
use warden_core::constants::{GuardKind, JobPriority};

/// Strategy for generating valid request identifiers
pub fn valid_request_id_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_-]{1,128}"
}

/// Strategy for generating request identifiers with at least one
/// disallowed character
pub fn invalid_request_id_strategy() -> impl Strategy<Value = String> {
    ("[A-Za-z0-9_-]{0,16}", "[ !@#$%^&*()+=/\\\\.:;]", "[A-Za-z0-9_-]{0,16}")
        .prop_map(|(prefix, bad, suffix)| format!("{prefix}{bad}{suffix}"))
}

/// Strategy for generating arbitrary guard kinds
pub fn guard_kind_strategy() -> impl Strategy<Value = GuardKind> {
    prop_oneof![
        Just(GuardKind::Compression),
        Just(GuardKind::Validation),
        Just(GuardKind::Moderation),
        Just(GuardKind::Sanitization),
    ]
}

/// Strategy for generating job priorities
pub fn job_priority_strategy() -> impl Strategy<Value = JobPriority> {
    prop_oneof![
        Just(JobPriority::Critical),
        Just(JobPriority::High),
        Just(JobPriority::Normal),
        Just(JobPriority::Low),
    ]
}

/// Strategy for generating benign JSON payloads
pub fn json_payload_strategy() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        Just(serde_json::json!({})),
        Just(serde_json::json!({"text": "hello world"})),
        Just(serde_json::json!({"content": "abc", "level": 9})),
        Just(serde_json::json!({"data": {"nested": [1, 2, 3]}})),
        Just(serde_json::json!({"message": "hi", "user": "u-1", "tags": ["a", "b"]})),
    ]
}

/// Strategy for generating strings with embedded control characters
pub fn control_character_string_strategy() -> impl Strategy<Value = String> {
    ("[a-z]{0,8}", 0u32..32, "[a-z]{0,8}").prop_map(|(prefix, code, suffix)| {
        let control = char::from_u32(code).unwrap_or('\u{0}');
        format!("{prefix}{control}{suffix}")
    })
}
