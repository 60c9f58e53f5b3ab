//! Default User-Agent string sent by the HTTP transport.

/// Product token used in the User-Agent header.
const PRODUCT: &str = "http-stream";

/// Default User-Agent for stream requests (identifies the tool and version).
#[must_use]
pub(crate) fn default_stream_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("{PRODUCT}/{version} (media-pipeline)")
}
