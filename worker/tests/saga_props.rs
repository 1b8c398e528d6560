//! Property test for Saga compensation ordering: whatever the forward
//! pass registered, compensations run in exact reverse order.

use biovalue_worker::workflows::saga::Saga;
use proptest::prelude::*;
use serde_json::json;

proptest! {
    #[test]
    fn compensations_run_in_reverse_registration_order(
        names in proptest::collection::vec("[a-z]{1,12}", 0..16)
    ) {
        let mut saga = Saga::new();
        for name in &names {
            saga.add(name, "cleanup-cache", json!({"ticker": "T", "namespace": name}));
        }

        let executed: Vec<&str> = saga.steps().iter().map(|s| s.name.as_str()).collect();
        let expected: Vec<&str> = names.iter().rev().map(|s| s.as_str()).collect();
        prop_assert_eq!(executed, expected);
        prop_assert_eq!(saga.len(), names.len());
    }
}
