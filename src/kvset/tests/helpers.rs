use tracing::Level;
use tracing_subscriber::fmt::Subscriber;

use crate::kvset::builder::KvsetBuilder;
use crate::kvset::compress::Lz4Adapter;
use crate::kvset::media_pool::MemMediaPool;
use crate::kvset::{KvsetPolicy, MediaPool};

pub(crate) fn init_tracing() {
    let _ = Subscriber::builder()
        .with_max_level(Level::TRACE)
        .try_init();
}

pub(crate) fn test_policy() -> KvsetPolicy {
    KvsetPolicy {
        kblock_target_size: 256,
        vblock_target_size: 256,
        ..KvsetPolicy::default()
    }
}

pub(crate) fn new_builder() -> KvsetBuilder {
    new_builder_with(test_policy(), false, true)
}

pub(crate) fn new_capped_builder() -> KvsetBuilder {
    new_builder_with(test_policy(), true, true)
}

pub(crate) fn new_builder_with(
    policy: KvsetPolicy,
    capped: bool,
    compression: bool,
) -> KvsetBuilder {
    let key_pool: Box<dyn MediaPool> = Box::new(MemMediaPool::new());
    let value_pool: Box<dyn MediaPool> = Box::new(MemMediaPool::new());
    let compressor = if compression {
        Some(Box::new(Lz4Adapter::new()) as Box<_>)
    } else {
        None
    };
    KvsetBuilder::create(key_pool, value_pool, policy, 1, capped, compressor)
        .expect("builder creation should not fail")
}
