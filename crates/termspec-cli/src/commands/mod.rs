pub mod build;
pub mod clean_cache;
pub mod validate;
