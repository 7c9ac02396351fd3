// src/registry/mod.rs
pub mod browser;
pub mod models;
pub mod pagination;
pub mod pipeline;
pub mod renderer;

#[cfg(test)]
pub mod fake;
