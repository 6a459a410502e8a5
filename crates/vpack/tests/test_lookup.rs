//! Byte-level tests for object lookup, container walking and hashing.

use vpack::{Builder, Options, Parser, Slice, tag};

/// Build an object with `n` distinct keys `key_number_<i>` mapped to `i`.
fn build_object(n: usize) -> Builder {
    let mut builder = Builder::new();
    builder.add_object().unwrap();
    for i in 0..n {
        builder.add_string(&format!("key_number_{i}")).unwrap();
        builder.add_uint(i as u64).unwrap();
    }
    builder.close().unwrap();
    builder
}

#[test]
fn test_cuckoo_lookup_across_widths() {
    for n in [0usize, 1, 2, 3, 7, 8, 100, 10_000] {
        let builder = build_object(n);
        let slice = builder.slice().unwrap();
        assert_eq!(slice.length().unwrap(), n, "length for n={n}");

        // every stored key resolves to its exact value
        let step = if n > 1000 { 97 } else { 1 };
        for i in (0..n).step_by(step) {
            let value = slice.get(&format!("key_number_{i}")).unwrap();
            assert_eq!(value.get_uint().unwrap(), i as u64, "hit for n={n}, i={i}");
        }

        // absent keys return the None slice
        assert!(slice.get(&format!("key_number_{n}")).unwrap().is_none());
        assert!(slice.get("not_in_there").unwrap().is_none());
        assert!(slice.get("").unwrap().is_none());
    }
}

#[test]
fn test_header_width_grows_with_size() {
    assert_eq!(build_object(0).bytes(), &[0x0a]);
    assert_eq!(build_object(1).bytes()[0], 0x0b);
    assert_eq!(build_object(8).bytes()[0], 0x0b);
    assert_eq!(build_object(100).bytes()[0], 0x0c);
    assert_eq!(build_object(10_000).bytes()[0], 0x0d);
}

#[test]
fn test_stored_order_iteration() {
    // default options sort keys; iteration must follow stored order, not
    // hash-slot order
    let builder = build_object(100);
    let slice = builder.slice().unwrap();
    let mut previous = Vec::new();
    for i in 0..100 {
        let key = slice.get_nth_key(i).unwrap().get_string().unwrap().to_vec();
        assert!(previous < key, "keys not sorted at {i}");
        previous = key;
    }
}

/// Walk a container by n-th access, summing child byte sizes; the sum must
/// land exactly on the start of the trailing structures.
fn check_walk(slice: Slice<'_>) {
    let container = slice.start().as_ptr() as usize;
    let total = slice.byte_size().unwrap();
    let bytes = slice.value_bytes().unwrap();
    let head = slice.head();
    let n = slice.length().unwrap();

    if n == 0 {
        return;
    }

    let mut children = Vec::new();
    if slice.is_array() {
        for item in vpack::ArrayIterator::new(slice).unwrap() {
            children.push(item.unwrap());
        }
        // n-th access agrees with iteration order
        for i in [0, n / 2, n - 1] {
            assert!(slice.get_nth(i).unwrap().equals(&children[i]));
        }
    } else {
        for pair in vpack::ObjectIterator::new(slice).unwrap() {
            let (key, value) = pair.unwrap();
            children.push(key);
            children.push(value);
        }
        for i in [0, n / 2, n - 1] {
            assert!(slice.get_nth_key(i).unwrap().equals(&children[2 * i]));
            assert!(slice.get_nth_value(i).unwrap().equals(&children[2 * i + 1]));
        }
    }

    // contiguity: each child follows the previous one
    let expected_first = if head == 0x13 || head == 0x14 {
        let (_, header) = tag::read_varint_forward(&bytes[1..]).unwrap();
        1 + header
    } else {
        tag::first_sub_offset(head)
    };
    let mut cursor = children[0].start().as_ptr() as usize - container;
    assert_eq!(cursor, expected_first);
    for child in &children {
        let offset = child.start().as_ptr() as usize - container;
        assert_eq!(offset, cursor, "child not contiguous");
        cursor += child.byte_size().unwrap();
        check_walk(*child);
    }

    // the walk must end exactly at the index table / trailing length
    let expected_end = match head {
        0x02..=0x05 => total,
        0x06..=0x09 => {
            let w = tag::width_of_length_field(head);
            total - n * w - if w == 8 { 8 } else { 0 }
        }
        0x0b..=0x0e => {
            let w = tag::width_of_length_field(head);
            let n_slots = read_n_slots(bytes, w);
            let tail = if w < 4 { 0 } else { 1 + 2 * w };
            total - n_slots * w - tail
        }
        0x13 | 0x14 => {
            let (_, n_len) = tag::read_varint_backward(bytes, bytes.len()).unwrap();
            total - n_len
        }
        _ => panic!("unexpected container head {head:#04x}"),
    };
    assert_eq!(cursor, expected_end, "walk end mismatch for head {head:#04x}");
}

fn read_n_slots(bytes: &[u8], w: usize) -> usize {
    if w < 4 {
        tag::read_uint_le(&bytes[1 + 2 * w..1 + 3 * w]).unwrap() as usize
    } else {
        let end = bytes.len();
        tag::read_uint_le(&bytes[end - 1 - w..end - 1]).unwrap() as usize
    }
}

#[test]
fn test_byte_size_walk_invariant() {
    let documents = [
        r#"{"a":1,"b":[true,null,"x"]}"#,
        r#"[[1,2,3],[4,5,6],[7,8,9]]"#,
        r#"[0.5,1.5,2.5]"#,
        r#"{"long":"a string that is long enough to matter","n":123456789}"#,
        r#"[{"k":[{"deep":null}]},[],{},"tail"]"#,
    ];
    for json in documents {
        for (unindexed_arrays, unindexed_objects) in
            [(false, false), (true, false), (false, true), (true, true)]
        {
            let mut options = Options::default();
            options.build_unindexed_arrays = unindexed_arrays;
            options.build_unindexed_objects = unindexed_objects;
            let mut parser = Parser::new(options);
            parser.parse(json.as_bytes()).unwrap();
            let slice = parser.slice().unwrap();
            if slice.is_array() || slice.is_object() {
                check_walk(slice);
            }
        }
    }

    // and a large object crossing into the wide-header layouts
    let builder = build_object(10_000);
    check_walk(builder.slice().unwrap());
}

#[test]
fn test_normalized_hash_order_insensitive() {
    let mut sorted = Options::default();
    sorted.sort_attribute_names = true;
    let mut unsorted = Options::default();
    unsorted.sort_attribute_names = false;

    let mut a = Parser::new(sorted);
    a.parse(br#"{"x":1,"y":[2,3],"z":"s"}"#).unwrap();
    let mut b = Parser::new(unsorted);
    b.parse(br#"{"z":"s","y":[2,3],"x":1}"#).unwrap();

    let ha = a.slice().unwrap().normalized_hash(0).unwrap();
    let hb = b.slice().unwrap().normalized_hash(0).unwrap();
    assert_eq!(ha, hb);
}

#[test]
fn test_normalized_hash_numeric_equivalence() {
    let mut a = Parser::new(Options::default());
    a.parse(b"5").unwrap();
    let mut b = Parser::new(Options::default());
    b.parse(b"5.0").unwrap();
    assert_eq!(
        a.slice().unwrap().normalized_hash(7).unwrap(),
        b.slice().unwrap().normalized_hash(7).unwrap()
    );

    // raw hash distinguishes the encodings
    assert_ne!(
        a.slice().unwrap().hash(7).unwrap(),
        b.slice().unwrap().hash(7).unwrap()
    );
}

#[test]
fn test_normalized_hash_distinguishes_structures() {
    let documents = [
        "null",
        "true",
        "[]",
        "{}",
        "[1]",
        "[1,2]",
        "[[1],2]",
        r#"{"a":1}"#,
        r#"{"a":2}"#,
        r#"{"b":1}"#,
        r#""a""#,
    ];
    let mut hashes = Vec::new();
    for json in documents {
        let mut parser = Parser::new(Options::default());
        parser.parse(json.as_bytes()).unwrap();
        hashes.push(parser.slice().unwrap().normalized_hash(0).unwrap());
    }
    for i in 0..hashes.len() {
        for j in i + 1..hashes.len() {
            assert_ne!(hashes[i], hashes[j], "{} vs {}", documents[i], documents[j]);
        }
    }
}

#[test]
fn test_arrays_are_order_sensitive() {
    let mut a = Parser::new(Options::default());
    a.parse(b"[1,2]").unwrap();
    let mut b = Parser::new(Options::default());
    b.parse(b"[2,1]").unwrap();
    assert_ne!(
        a.slice().unwrap().normalized_hash(0).unwrap(),
        b.slice().unwrap().normalized_hash(0).unwrap()
    );
}
