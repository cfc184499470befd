pub mod assets_manager;
pub mod query_cache;

pub use assets_manager::AssetsManager;
pub use query_cache::{ QueryCache, DEFAULT_CACHE_TTL };
