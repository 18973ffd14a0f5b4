pub mod cache;
pub mod cancel;
pub mod error;
pub mod lua;
pub mod memory;
pub mod redisx;
pub mod script;
pub mod settings;
pub mod store;
pub mod types;

pub use cache::Cache;
pub use cancel::CancellationToken;
pub use error::{CacheError, CacheResult, StoreError};
pub use memory::MemoryStore;
pub use redisx::RedisStore;
pub use script::FailureHook;
pub use settings::CacheConfig;
pub use store::Store;
pub use types::Lookup;
