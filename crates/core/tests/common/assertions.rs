//! Custom assertion helpers.

use crux_protocol::Envelope;

/// Assert that `reply` is a failure with the given name.
#[allow(dead_code)]
pub fn assert_failure(reply: &Envelope, name: &str) {
    assert!(!reply.success, "Expected a failure reply, got: {}", reply);
    assert_eq!(reply.name, name, "Unexpected reply name in {}", reply);
}

/// Assert that a string contains a substring (case-insensitive).
#[allow(dead_code)]
pub fn assert_contains_ci(haystack: &str, needle: &str) {
    let haystack_lower = haystack.to_lowercase();
    let needle_lower = needle.to_lowercase();
    assert!(
        haystack_lower.contains(&needle_lower),
        "Expected '{}' to contain '{}' (case-insensitive)",
        haystack,
        needle
    );
}
