// src/extractors/mod.rs
pub mod fields;
pub mod identity;
pub mod layout;
pub mod page;
pub mod row;

// Re-export key extraction types for convenience
pub use fields::AmountPolicy;
pub use layout::Layout;
pub use page::{table_materialized, PageExtractor};
