//! Binary content normalization.
//!
//! - [`kind`] — magic-number sniffing into an [`ImageKind`]
//! - [`normalize`] — extension reconciliation for output paths
//!
//! The detected kind always comes from the bytes themselves and is
//! authoritative over any filename or caller-declared MIME type.

pub mod kind;
pub mod normalize;

pub use kind::{is_image_extension, sniff, ImageKind, IMAGE_EXTENSIONS};
pub use normalize::{normalize, NormalizedPath};

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};

/// MIME type used when nothing better is known.
pub const DEFAULT_MIME_TYPE: &str = "image/png";

/// Raw image bytes with their sniffed kind.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    bytes: Vec<u8>,
    kind: Option<ImageKind>,
}

impl ImagePayload {
    /// Wraps `bytes`, sniffing their kind.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let kind = sniff(&bytes);
        Self { bytes, kind }
    }

    /// The raw bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The sniffed kind, if recognized.
    #[must_use]
    pub const fn kind(&self) -> Option<ImageKind> {
        self.kind
    }

    /// The sniffed MIME type, falling back to [`DEFAULT_MIME_TYPE`].
    #[must_use]
    pub fn detected_mime_type(&self) -> &'static str {
        self.kind.map_or(DEFAULT_MIME_TYPE, ImageKind::mime_type)
    }

    /// Number of bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Standard base64 of the bytes.
    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(&self.bytes)
    }

    /// A `data:` URL carrying the bytes and their detected MIME type.
    #[must_use]
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.detected_mime_type(), self.to_base64())
    }
}

/// Splits an optional `data:<mime>;base64,` prefix off `raw`.
///
/// Returns the declared MIME type (if any) and the base64 body.
#[must_use]
pub fn strip_data_url_prefix(raw: &str) -> (Option<&str>, &str) {
    let Some(rest) = raw.strip_prefix("data:") else {
        return (None, raw);
    };
    match rest.split_once(";base64,") {
        Some((mime, body)) if !mime.is_empty() && !mime.contains(';') => (Some(mime), body),
        _ => (None, raw),
    }
}

/// Decodes base64 image data, tolerating embedded whitespace.
///
/// # Errors
///
/// Returns the decoder error if the input is not valid base64.
pub fn decode_base64(body: &str) -> Result<Vec<u8>, base64::DecodeError> {
    if body.bytes().any(|b| b.is_ascii_whitespace()) {
        let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        BASE64_STANDARD.decode(compact)
    } else {
        BASE64_STANDARD.decode(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: [u8; 12] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

    #[test]
    fn payload_sniffs_on_construction() {
        let payload = ImagePayload::from_bytes(PNG_HEADER.to_vec());
        assert_eq!(payload.kind(), Some(ImageKind::Png));
        assert_eq!(payload.detected_mime_type(), "image/png");
        assert_eq!(payload.len(), 12);
    }

    #[test]
    fn unknown_payload_defaults_to_png_mime() {
        let payload = ImagePayload::from_bytes(b"just some text bytes".to_vec());
        assert_eq!(payload.kind(), None);
        assert_eq!(payload.detected_mime_type(), DEFAULT_MIME_TYPE);
    }

    #[test]
    fn data_url_uses_detected_type() {
        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0];
        jpeg.resize(16, 0);
        let url = ImagePayload::from_bytes(jpeg).to_data_url();
        assert!(url.starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn strip_data_url() {
        assert_eq!(
            strip_data_url_prefix("data:image/webp;base64,AAAA"),
            (Some("image/webp"), "AAAA")
        );
        assert_eq!(strip_data_url_prefix("AAAA"), (None, "AAAA"));
        assert_eq!(
            strip_data_url_prefix("data:;base64,AAAA"),
            (None, "data:;base64,AAAA")
        );
    }

    #[test]
    fn decode_tolerates_line_breaks() {
        let encoded = BASE64_STANDARD.encode(PNG_HEADER);
        let (head, tail) = encoded.split_at(8);
        let wrapped = format!("{head}\n{tail}\n");
        assert_eq!(decode_base64(&wrapped).unwrap(), PNG_HEADER.to_vec());
        assert!(decode_base64("!!!not base64!!!").is_err());
    }
}
