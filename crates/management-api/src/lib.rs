//! # Management API
//!
//! Client for the remote container-management control plane (Portainer-style
//! HTTP API). A session is established with [`ManagementApi::authenticate`],
//! which logs in with the stored admin credentials, picks the first endpoint
//! and resolves its cluster identity. Stack operations then run against that
//! session.
//!
//! [`ManagementApi::deploy_stack`] gives create-or-update semantics on top of
//! the CRUD primitives; [`ManagementApi::remove_stack_by_name`] reports a
//! missing stack as [`Error::StackNotFound`] so teardown code can treat it as
//! a no-op.

#![warn(missing_docs)]

mod api;
mod client;
mod models;

pub use api::{ManagementApi, ManagementApiProvider};
pub use client::{PortainerClient, PortainerProvider};
pub use models::{ManagementApiSettings, Session, Stack, StackAction, StackDeployment};

/// Error types for management API operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Network-level failure (connect, timeout, TLS)
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Session could not be established
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The API answered with a non-2xx status
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message extracted from the response body
        message: String,
    },

    /// No stack with the given name exists remotely
    #[error("stack not found: {0}")]
    StackNotFound(String),

    /// The response body did not have the expected shape
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl Error {
    /// Whether this error means the requested object is absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::StackNotFound(_))
    }
}

/// Result type alias for management API operations
pub type Result<T> = std::result::Result<T, Error>;
