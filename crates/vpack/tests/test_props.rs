//! Property tests: arbitrary JSON documents round-trip through VPACK.

use proptest::prelude::*;
use serde_json::Value;
use vpack::{Options, Parser};

fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        any::<u64>().prop_map(Value::from),
        any::<f64>()
            .prop_filter("finite doubles only", |v| v.is_finite())
            .prop_map(Value::from),
        "[a-zA-Z0-9_/\\\\\" ]{0,24}".prop_map(Value::from),
    ];
    leaf.prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..6).prop_map(Value::from),
            proptest::collection::btree_map("[a-z]{1,8}", inner, 0..6)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

proptest! {
    #[test]
    fn roundtrip_is_semantically_identical(value in json_value()) {
        let text = serde_json::to_string(&value).unwrap();
        let mut parser = Parser::new(Options::default());
        parser.parse(text.as_bytes()).unwrap();
        let dumped = parser.slice().unwrap().to_json(&Options::default()).unwrap();
        let reparsed: Value = serde_json::from_str(&dumped).unwrap();
        prop_assert_eq!(reparsed, value);
    }

    #[test]
    fn reencoding_is_deterministic(value in json_value()) {
        let text = serde_json::to_string(&value).unwrap();
        let mut a = Parser::new(Options::default());
        a.parse(text.as_bytes()).unwrap();
        let mut b = Parser::new(Options::default());
        b.parse(text.as_bytes()).unwrap();
        prop_assert_eq!(a.builder().bytes(), b.builder().bytes());
        prop_assert!(a.slice().unwrap().equals(&b.slice().unwrap()));
    }

    #[test]
    fn normalized_hash_survives_reencoding(value in json_value()) {
        let text = serde_json::to_string(&value).unwrap();
        let mut parser = Parser::new(Options::default());
        parser.parse(text.as_bytes()).unwrap();
        let slice = parser.slice().unwrap();
        let dumped = slice.to_json(&Options::default()).unwrap();

        let mut unsorted = Options::default();
        unsorted.sort_attribute_names = false;
        let mut reparsed = Parser::new(unsorted);
        reparsed.parse(dumped.as_bytes()).unwrap();
        prop_assert_eq!(
            slice.normalized_hash(0).unwrap(),
            reparsed.slice().unwrap().normalized_hash(0).unwrap()
        );
    }
}
