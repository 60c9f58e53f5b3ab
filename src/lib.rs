//! HTTP Stream Library
//!
//! This library provides an HTTP stream element for media pipelines: a
//! pipeline stage that either downloads an HTTP resource into the pipeline
//! (reader) or uploads pipeline data to one (writer).
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`element`] - The stream element: lifecycle, read/write/process
//! - [`hook`] - Optional user callback invoked at fixed points of the exchange
//! - [`sniff`] - Codec detection from response headers
//! - [`info`] - Resume offset, total size and codec of the stream
//! - [`pipeline`] - Contract between the element and its pipeline
//! - [`transport`] - Request/response sessions, reqwest-backed by default
//! - [`config`] - Construction-time settings

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod constants;
pub mod element;
pub mod hook;
pub mod info;
pub mod pipeline;
pub mod sniff;
pub mod transport;
mod user_agent;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::{ConfigError, StreamConfig};
pub use element::{Role, StreamElement, StreamError};
pub use hook::{HookBuffer, HookContext, HookEvent, HookKind, HookOutcome, StreamHook};
pub use info::StreamInfo;
pub use pipeline::{Element, ElementHost, ElementState};
pub use sniff::{CodecFormat, classify_content_type};
pub use transport::http::HttpConnector;
pub use transport::{
    Connector, HeaderObserver, IgnoreHeaders, RequestConfig, Transport, TransportError,
};
