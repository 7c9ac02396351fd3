// src/registry/renderer.rs

//! The page-rendering capability the pipeline consumes.
//!
//! A renderer executes the registry's client-side application and hands
//! back the resulting HTML. Sessions are single, stateful resources: one
//! navigation at a time, opened at run start and closed at run end.

use async_trait::async_trait;

use crate::utils::error::RenderError;

#[async_trait]
pub trait Renderer: Send + Sync {
    type Session: RenderSession;

    async fn open(&self) -> Result<Self::Session, RenderError>;
}

#[async_trait]
pub trait RenderSession: Send {
    /// Navigates to `url` and returns the content rendered so far.
    async fn load(&mut self, url: &str) -> Result<String, RenderError>;

    /// Content of the current page as rendered right now.
    async fn current_content(&mut self) -> Result<String, RenderError>;

    /// Releases the session. Safe to call more than once.
    async fn close(&mut self);
}
