//! Codec classification from response headers.
//!
//! The sniffer looks at `Content-Type` and `Content-Disposition` values as
//! the transport reports them and records the first codec it recognizes.
//! Payload bytes are never inspected.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::info::StreamInfo;
use crate::transport::HeaderObserver;

/// Codec family of the payload carried by a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecFormat {
    /// Nothing recognized.
    #[default]
    None,
    /// MPEG audio layer III.
    Mp3,
    /// Advanced Audio Coding.
    Aac,
    /// RIFF WAVE.
    Wav,
    /// Opus.
    Opus,
}

impl fmt::Display for CodecFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Mp3 => "mp3",
            Self::Aac => "aac",
            Self::Wav => "wav",
            Self::Opus => "opus",
        };
        f.write_str(name)
    }
}

/// Markers tested against header values, in priority order.
const CODEC_MARKERS: &[(&str, CodecFormat)] = &[
    ("audio/mp3", CodecFormat::Mp3),
    ("audio/mpeg", CodecFormat::Mp3),
    ("audio/aac", CodecFormat::Aac),
    ("audio/wav", CodecFormat::Wav),
    ("audio/opus", CodecFormat::Opus),
];

/// Header names whose values can carry a media type.
const SNIFFED_HEADERS: &[&str] = &["content-disposition", "content-type"];

/// Classifies a header value by case-insensitive substring match.
///
/// Parameters after the media type (`; charset=...`) do not matter.
#[must_use]
pub fn classify_content_type(value: &str) -> CodecFormat {
    let value = value.to_ascii_lowercase();
    CODEC_MARKERS
        .iter()
        .find(|(marker, _)| value.contains(marker))
        .map_or(CodecFormat::None, |(_, codec)| *codec)
}

/// Returns true when `name` is a header the sniffer inspects.
#[must_use]
pub fn is_sniffed_header(name: &str) -> bool {
    SNIFFED_HEADERS
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(name))
}

/// Header observer that writes the detected codec into [`StreamInfo`].
///
/// Each response starts out as [`CodecFormat::None`]; the first header that
/// classifies to something else wins.
#[derive(Debug)]
pub struct CodecSniffer<'a> {
    info: &'a mut StreamInfo,
    detected: bool,
}

impl<'a> CodecSniffer<'a> {
    /// Binds a sniffer to the metadata it updates and clears its codec.
    pub fn new(info: &'a mut StreamInfo) -> Self {
        info.codec = CodecFormat::None;
        Self {
            info,
            detected: false,
        }
    }

    /// Whether a codec was recognized so far.
    #[must_use]
    pub fn detected(&self) -> bool {
        self.detected
    }
}

impl HeaderObserver for CodecSniffer<'_> {
    fn on_header(&mut self, name: &str, value: &str) {
        if !is_sniffed_header(name) {
            return;
        }
        info!(header = %name, value = %value, "media header");
        if self.detected {
            return;
        }
        let codec = classify_content_type(value);
        if codec != CodecFormat::None {
            debug!(%codec, "codec detected");
            self.info.codec = codec;
            self.detected = true;
        }
    }
}
