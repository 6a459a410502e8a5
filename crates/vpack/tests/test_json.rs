//! Parse/dump round-trip tests, compared semantically through `serde_json`.

use base64::Engine;
use vpack::{Flavor, Options, Parser};

/// Parse `json`, dump it back, and compare both sides as `serde_json` values
/// (numerics by value, objects as sets of pairs).
fn assert_semantic_roundtrip(json: &str, options: &Options) {
    let mut parser = Parser::new(options.clone());
    parser
        .parse(json.as_bytes())
        .unwrap_or_else(|e| panic!("parse failed for {json}: {e}"));
    let dumped = parser
        .slice()
        .unwrap()
        .to_json(options)
        .unwrap_or_else(|e| panic!("dump failed for {json}: {e}"));

    let original: serde_json::Value = serde_json::from_str(json).unwrap();
    let result: serde_json::Value = serde_json::from_str(&dumped)
        .unwrap_or_else(|e| panic!("dump produced invalid JSON {dumped}: {e}"));
    assert_eq!(original, result, "roundtrip mismatch for {json} -> {dumped}");
}

#[test]
fn test_document_corpus_roundtrip() {
    let corpus = [
        "null",
        "true",
        "false",
        "0",
        "1",
        "-1",
        "9",
        "10",
        "-6",
        "-7",
        "127",
        "128",
        "255",
        "256",
        "65535",
        "65536",
        "4294967295",
        "4294967296",
        "9223372036854775807",
        "-9223372036854775808",
        "9223372036854775808",
        "18446744073709551615",
        "0.5",
        "-0.5",
        "-0.5e2",
        "3.141592653589793",
        "1e10",
        "1e-10",
        "5e-324",
        "2.2250738585072014e-308",
        "1.7976931348623157e308",
        r#""""#,
        r#""hello""#,
        r#""with \"quotes\" inside""#,
        r#""tab\there""#,
        r#""newline\nhere""#,
        r#""control \u0001 char""#,
        r#""café""#,
        r#""€ 100""#,
        r#""smile 😀""#,
        "[]",
        "{}",
        "[1,2,3]",
        "[[1],[2],[3]]",
        r#"[true,null,"x"]"#,
        r#"{"a":1}"#,
        r#"{"a":1,"b":[true,null,"x"]}"#,
        r#"{"nested":{"deeper":{"deepest":[1,2,{"end":null}]}}}"#,
        r#"{"mixed":[1,"two",3.5,true,null,{"six":6}]}"#,
    ];
    let options = Options::default();
    for json in corpus {
        assert_semantic_roundtrip(json, &options);
    }
}

#[test]
fn test_roundtrip_with_utf8_validation() {
    let mut options = Options::default();
    options.validate_utf8_strings = true;
    for json in [
        r#""café""#,
        "\"caf\u{e9}\"",
        "\"\u{20ac}\"",
        "\"\u{1f600}\"",
        r#""smile 😀""#,
    ] {
        assert_semantic_roundtrip(json, &options);
    }
}

#[test]
fn test_deeply_nested_roundtrip() {
    let mut json = String::new();
    for _ in 0..32 {
        json.push_str(r#"{"a":["#);
    }
    json.push_str("42");
    for _ in 0..32 {
        json.push_str("]}");
    }
    assert_semantic_roundtrip(&json, &Options::default());
}

#[test]
fn test_key_order_preserved_without_sorting() {
    let mut options = Options::default();
    options.sort_attribute_names = false;
    let json = r#"{"zeta":1,"alpha":2,"mid":3}"#;
    let mut parser = Parser::new(options.clone());
    parser.parse(json.as_bytes()).unwrap();
    assert_eq!(parser.slice().unwrap().to_json(&options).unwrap(), json);
}

#[test]
fn test_compact_containers_roundtrip() {
    let mut options = Options::default();
    options.build_unindexed_arrays = true;
    options.build_unindexed_objects = true;

    let json = r#"{"list":[1,"two",3.5],"flag":true}"#;
    let mut parser = Parser::new(options.clone());
    parser.parse(json.as_bytes()).unwrap();
    let slice = parser.slice().unwrap();
    assert_eq!(slice.head(), 0x14);
    assert_eq!(slice.get("list").unwrap().head(), 0x13);

    let dumped = slice.to_json(&options).unwrap();
    let original: serde_json::Value = serde_json::from_str(json).unwrap();
    let result: serde_json::Value = serde_json::from_str(&dumped).unwrap();
    assert_eq!(original, result);
}

#[test]
fn test_multi_document_parse() {
    let mut parser = Parser::new(Options::default());
    let count = parser.parse_multi(b"{\"a\":1} [2,3] \"four\" 5").unwrap();
    assert_eq!(count, 4);
    // the first value is visible through slice()
    let slice = parser.slice().unwrap();
    assert_eq!(slice.get("a").unwrap().get_int().unwrap(), 1);
}

#[test]
fn test_reencode_produces_equal_value() {
    let json = r#"{"a":[1,2.5,"three"],"b":{"c":null,"d":false}}"#;
    let options = Options::default();

    let mut first = Parser::new(options.clone());
    first.parse(json.as_bytes()).unwrap();
    let dumped = first.slice().unwrap().to_json(&options).unwrap();

    let mut second = Parser::new(options.clone());
    second.parse(dumped.as_bytes()).unwrap();
    assert!(second.slice().unwrap().equals(&first.slice().unwrap()));
}

#[test]
fn test_vjson_binary_both_alphabets() {
    let payloads: Vec<Vec<u8>> = vec![
        vec![],
        vec![0x00],
        vec![0xff, 0xfb],
        (0u8..=255).collect(),
        b"Hello World".to_vec(),
    ];
    for payload in payloads {
        for encoded in [
            base64::engine::general_purpose::STANDARD.encode(&payload),
            base64::engine::general_purpose::URL_SAFE.encode(&payload),
        ] {
            let json = format!("\"b:{encoded}\"");
            let mut parser = Parser::with_flavor(Options::default(), Flavor::VJson);
            parser.parse(json.as_bytes()).unwrap();
            let slice = parser.slice().unwrap();
            assert_eq!(
                slice.get_binary().unwrap(),
                &payload[..],
                "payload mismatch for {json}"
            );
        }
    }
}

#[test]
fn test_vjson_dates() {
    for (text, millis) in [
        ("1970-01-01T00:00:00Z", 0i64),
        ("2019-03-04T05:06:07Z", 1551675967000),
        ("2019-03-04T05:06:07.250Z", 1551675967250),
        ("2019-03-04T06:06:07+01:00", 1551675967000),
        ("1969-12-31T23:59:59Z", -1000),
    ] {
        let json = format!("\"d:{text}\"");
        let mut parser = Parser::with_flavor(Options::default(), Flavor::VJson);
        parser.parse(json.as_bytes()).unwrap();
        assert_eq!(
            parser.slice().unwrap().get_utc_date().unwrap(),
            millis,
            "for {text}"
        );
    }
}

#[test]
fn test_failed_parse_leaves_builder_consistent() {
    // a failed literal leaves no partial bytes behind
    let mut parser = Parser::new(Options::default());
    assert!(parser.parse(b"tru").is_err());
    assert!(parser.builder().bytes().is_empty());
    assert!(parser.parse(b"true").is_ok());
    assert_eq!(parser.builder().bytes(), &[0x1a]);

    // a failed string parse rolls back the speculative header byte
    let mut parser = Parser::new(Options::default());
    assert!(parser.parse(b"\"abc").is_err());
    assert!(parser.builder().bytes().is_empty());
}
