pub mod disk;
pub mod memory;
pub mod provider;

pub use disk::DiskCache;
pub use memory::MemoryCache;
pub use provider::CacheProvider;
