pub mod hash;

pub use hash::plan_cache_key;
