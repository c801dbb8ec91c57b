//! Garbage in, structured failure out: nothing here may panic.

mod common;

use common::{Harness, COUNTER};
use proptest::prelude::*;
use serde_json::{json, Value as JsonValue};
use stampchain::compiler::lint;
use stampchain::crypto::Keypair;
use stampchain::runtime::{EngineConfig, Status};

fn arb_json() -> impl Strategy<Value = JsonValue> {
    let leaf = prop_oneof![
        Just(JsonValue::Null),
        any::<bool>().prop_map(JsonValue::from),
        any::<i64>().prop_map(JsonValue::from),
        "[a-z]{0,8}".prop_map(JsonValue::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(JsonValue::Array),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..4)
                .prop_map(|m| JsonValue::Object(m.into_iter().collect())),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn fuzz_random_transactions_are_malformed(raw in arb_json()) {
        let mut h = Harness::new(EngineConfig::default());
        let out = h.run(&raw);
        prop_assert_eq!(out.status, Status::MalformedTx);
        prop_assert!(out.updates.is_empty());
    }

    #[test]
    fn fuzz_random_arguments_never_panic(args in prop::collection::btree_map("[a-z]{1,3}", arb_json(), 0..3)) {
        let mut h = Harness::new(EngineConfig::default());
        h.install("counter", COUNTER);
        let kp = Keypair::generate();
        let mut tx = h.tx(&kp, "counter", "set", &[]);
        tx["payload"]["arguments"] = json!(args);
        let out = h.run(&tx);
        // arguments are signed: anything but the original empty map is a bad signature,
        // and the empty map is missing `v`
        prop_assert!(matches!(out.status, Status::InvalidSignature | Status::RuntimeException));
    }

    #[test]
    fn fuzz_lint_never_panics(src in "[a-z{}();=.,\\[\\] 0-9\n'\"+-]{0,80}") {
        let _ = lint(&src);
    }
}
