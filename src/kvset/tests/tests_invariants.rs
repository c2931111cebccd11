use super::helpers::{init_tracing, new_builder};
use crate::kvset::builder::Value;
use crate::kvset::media_pool::MemMediaPool;
use crate::kvset::{AgeGroup, KvsetBuilder, KvsetPolicy, MediaPool};

#[test]
fn ascending_seqno_is_rejected_but_repeating_the_same_seqno_is_allowed() {
    init_tracing();
    let mut b = new_builder();
    b.add_key(b"k").unwrap();
    b.add_val(10, Value::Raw(b"v"), None).unwrap();
    // Repeating the prior seqno is a valid resubmission, not an inversion.
    b.add_val(10, Value::Raw(b"v2"), None).unwrap();
    let err = b.add_val(11, Value::Raw(b"v3"), None).unwrap_err();
    assert!(err.to_string().contains("sequence number"));
}

#[test]
fn oversized_key_is_rejected() {
    init_tracing();
    let mut b = new_builder();
    let too_long = vec![0u8; (crate::kvset::KLEN_MAX + 1) as usize];
    let err = b.add_key(&too_long).unwrap_err();
    assert!(err.to_string().contains("invalid key"));
}

#[test]
fn empty_key_is_rejected() {
    init_tracing();
    let mut b = new_builder();
    let err = b.add_key(b"").unwrap_err();
    assert!(err.to_string().contains("invalid key"));
}

#[test]
fn oversized_value_is_rejected() {
    init_tracing();
    let mut b = new_builder();
    b.add_key(b"k").unwrap();
    let too_big = vec![0u8; (crate::kvset::VLEN_MAX + 1) as usize];
    let err = b.add_val(1, Value::Raw(&too_big), None).unwrap_err();
    assert!(err.to_string().contains("exceeds vlen_max"));
}

#[test]
fn dropping_a_builder_before_get_mblocks_releases_its_blocks() {
    init_tracing();

    // Exercise via a small target size so several blocks actually get
    // written (and thus need aborting) before we drop the builder.
    let mut policy = KvsetPolicy {
        kblock_target_size: 16,
        vblock_target_size: 16,
        ..KvsetPolicy::default()
    };
    policy.compression_enabled = false;

    let key_pool: Box<dyn MediaPool> = Box::new(MemMediaPool::new());
    let value_pool: Box<dyn MediaPool> = Box::new(MemMediaPool::new());
    let mut b = KvsetBuilder::create(key_pool, value_pool, policy, 1, false, None).unwrap();

    for i in 0u8..20 {
        b.add_key(&[b'a', i]).unwrap();
        b.add_val(1, Value::Raw(b"0123456789abcdef"), None)
            .unwrap();
    }
    // Dropped here without calling get_mblocks(); the KeyBlockWriter and
    // ValueBlockWriter Drop impls abort everything they'd written.
    drop(b);
}

#[test]
fn builder_with_no_committed_keys_finishes_with_no_blocks_at_all() {
    init_tracing();
    let b = new_builder();
    // No key was ever added, so the key-block writer flushes nothing. The
    // value-block writer must be destroyed rather than finished in that
    // case: there is no key-block stream left for its blocks to support.
    let mblocks = b.get_mblocks().unwrap();
    assert!(mblocks.kblks.is_empty());
    assert!(mblocks.vblks.is_empty());
}

#[test]
fn age_group_can_be_changed_mid_build() {
    init_tracing();
    let mut b = new_builder();
    b.set_agegroup(AgeGroup::Leaf);
    b.add_key(b"k").unwrap();
    b.add_val(1, Value::Raw(b"v"), None).unwrap();
    b.get_mblocks().unwrap();
}
