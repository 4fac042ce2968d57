pub mod layout;
pub mod shard;
pub mod allocator;
pub mod locks;
pub mod file_lock;
pub mod record_store;
