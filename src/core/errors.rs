// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the agent
/// and the controller. Using `thiserror` allows for clean error definitions
/// and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum BmcLinkError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("{kind} {name:?} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} {name:?} already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("Conflict writing {kind} {name:?}: stale resource version")]
    Conflict { kind: &'static str, name: String },

    #[error("Server timeout: {0}")]
    ServerTimeout(String),

    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("invalid action {0:?}")]
    InvalidAction(String),

    #[error("HTTP client error: {0}")]
    HttpClientError(String),

    #[error("Redfish error: {0}")]
    Redfish(String),

    #[error("DHCP server error: {0}")]
    Dhcp(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BmcLinkError {
    /// Whether a reconciler should re-enqueue the work item after seeing this
    /// error. Optimistic-concurrency losses and missing referents resolve on
    /// their own; validation failures never do.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            BmcLinkError::NotFound { .. }
                | BmcLinkError::Conflict { .. }
                | BmcLinkError::ServerTimeout(_)
                | BmcLinkError::TooManyRequests(_)
        )
    }

    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        BmcLinkError::NotFound {
            kind,
            name: name.into(),
        }
    }
}

impl Clone for BmcLinkError {
    fn clone(&self) -> Self {
        match self {
            BmcLinkError::Io(e) => BmcLinkError::Io(Arc::clone(e)),
            BmcLinkError::NotFound { kind, name } => BmcLinkError::NotFound {
                kind,
                name: name.clone(),
            },
            BmcLinkError::AlreadyExists { kind, name } => BmcLinkError::AlreadyExists {
                kind,
                name: name.clone(),
            },
            BmcLinkError::Conflict { kind, name } => BmcLinkError::Conflict {
                kind,
                name: name.clone(),
            },
            BmcLinkError::ServerTimeout(s) => BmcLinkError::ServerTimeout(s.clone()),
            BmcLinkError::TooManyRequests(s) => BmcLinkError::TooManyRequests(s.clone()),
            BmcLinkError::Validation(s) => BmcLinkError::Validation(s.clone()),
            BmcLinkError::InvalidAction(s) => BmcLinkError::InvalidAction(s.clone()),
            BmcLinkError::HttpClientError(s) => BmcLinkError::HttpClientError(s.clone()),
            BmcLinkError::Redfish(s) => BmcLinkError::Redfish(s.clone()),
            BmcLinkError::Dhcp(s) => BmcLinkError::Dhcp(s.clone()),
            BmcLinkError::Internal(s) => BmcLinkError::Internal(s.clone()),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for BmcLinkError {
    fn from(e: std::io::Error) -> Self {
        BmcLinkError::Io(Arc::new(e))
    }
}

impl From<reqwest::Error> for BmcLinkError {
    fn from(e: reqwest::Error) -> Self {
        BmcLinkError::HttpClientError(e.to_string())
    }
}

impl From<serde_json::Error> for BmcLinkError {
    fn from(e: serde_json::Error) -> Self {
        BmcLinkError::Internal(format!("JSON serialization/deserialization error: {e}"))
    }
}

impl From<std::net::AddrParseError> for BmcLinkError {
    fn from(e: std::net::AddrParseError) -> Self {
        BmcLinkError::Validation(format!("invalid IP address: {e}"))
    }
}

impl From<url::ParseError> for BmcLinkError {
    fn from(e: url::ParseError) -> Self {
        BmcLinkError::Validation(format!("invalid URL: {e}"))
    }
}
