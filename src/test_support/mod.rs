//! Shared helpers for unit tests.

pub(crate) mod host;
pub(crate) mod scripted;
