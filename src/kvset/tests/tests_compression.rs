use super::helpers::{init_tracing, new_builder_with, test_policy};
use crate::kvset::builder::Value;

fn compressible_value() -> Vec<u8> {
    vec![b'x'; 4096]
}

fn incompressible_value() -> Vec<u8> {
    let mut v = Vec::with_capacity(4096);
    for i in 0..4096u32 {
        v.extend_from_slice(&i.to_le_bytes());
    }
    v
}

#[test]
fn worthwhile_compression_reduces_vused_below_raw_length() {
    init_tracing();
    let mut b = new_builder_with(test_policy(), false, true);
    let value = compressible_value();

    b.add_key(b"k").unwrap();
    b.add_val(1, Value::Raw(&value), None).unwrap();
    let mblocks = b.get_mblocks().unwrap();

    assert!(
        mblocks.vused < value.len() as u64,
        "highly repetitive value should compress smaller than its raw length"
    );
}

#[test]
fn not_worthwhile_compression_falls_back_to_raw_storage() {
    init_tracing();
    let mut b = new_builder_with(test_policy(), false, true);
    let value = incompressible_value();

    b.add_key(b"k").unwrap();
    b.add_val(1, Value::Raw(&value), None).unwrap();
    let mblocks = b.get_mblocks().unwrap();

    assert_eq!(
        mblocks.vused,
        value.len() as u64,
        "non-compressible value should fall back to its raw length"
    );
}

#[test]
fn compression_disabled_by_policy_always_stores_raw() {
    init_tracing();
    let mut policy = test_policy();
    policy.compression_enabled = false;
    let mut b = new_builder_with(policy, false, true);
    let value = compressible_value();

    b.add_key(b"k").unwrap();
    b.add_val(1, Value::Raw(&value), None).unwrap();
    let mblocks = b.get_mblocks().unwrap();

    assert_eq!(mblocks.vused, value.len() as u64);
}

#[test]
fn no_compressor_attached_always_stores_raw() {
    init_tracing();
    let mut b = new_builder_with(test_policy(), false, false);
    let value = compressible_value();

    b.add_key(b"k").unwrap();
    b.add_val(1, Value::Raw(&value), None).unwrap();
    let mblocks = b.get_mblocks().unwrap();

    assert_eq!(mblocks.vused, value.len() as u64);
}

#[test]
fn pre_compressed_value_is_stored_exactly_as_given() {
    init_tracing();
    let mut b = new_builder_with(test_policy(), false, true);
    let compressed = vec![1u8, 2, 3, 4];

    b.add_key(b"k").unwrap();
    b.add_val(
        1,
        Value::PreCompressed {
            bytes: &compressed,
            uncompressed_len: 9000,
        },
        None,
    )
    .unwrap();
    let mblocks = b.get_mblocks().unwrap();

    assert_eq!(mblocks.vused, compressed.len() as u64);
}
