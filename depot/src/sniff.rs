//! Content type detection from magic bytes.
//!
//! The accept/reject decision for uploads is made from the payload itself,
//! never from the client-declared `Content-Type` header or the file
//! extension. A `.png`-named part carrying an ELF binary is classified as
//! `application/octet-stream` and rejected by the default policy; a file
//! with no extension but a valid JPEG header is accepted.

/// Number of leading payload bytes inspected for classification.
pub const SNIFF_LEN: usize = 512;

/// Fallback type for payloads matching no known signature, including empty
/// payloads.
pub const UNKNOWN: &str = "application/octet-stream";

/// Magic-byte signatures, checked in order. First match wins.
const SIGNATURES: &[(&[u8], &str)] = &[
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"%PDF-", "application/pdf"),
];

/// Classify a payload prefix into a canonical MIME type.
///
/// `data` should hold up to [`SNIFF_LEN`] bytes; shorter slices (tiny parts)
/// are classified on whatever is available.
pub fn classify(data: &[u8]) -> &'static str {
    for (magic, mime) in SIGNATURES {
        if data.starts_with(magic) {
            return mime;
        }
    }

    // WebP: RIFF container with a WEBP fourcc after the chunk size.
    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return "image/webp";
    }

    UNKNOWN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_jpeg() {
        assert_eq!(classify(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10]), "image/jpeg");
    }

    #[test]
    fn detects_png() {
        assert_eq!(classify(b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR"), "image/png");
    }

    #[test]
    fn detects_pdf() {
        assert_eq!(classify(b"%PDF-1.7\n%\xe2\xe3\xcf\xd3"), "application/pdf");
    }

    #[test]
    fn detects_gif() {
        assert_eq!(classify(b"GIF89a\x01\x00\x01\x00"), "image/gif");
        assert_eq!(classify(b"GIF87a\x01\x00\x01\x00"), "image/gif");
    }

    #[test]
    fn detects_webp() {
        assert_eq!(classify(b"RIFF\x24\x00\x00\x00WEBPVP8 "), "image/webp");
    }

    #[test]
    fn mislabeled_executable_is_not_an_image() {
        // ELF magic bytes; the filename or declared header may claim png
        assert_eq!(classify(b"\x7fELF\x02\x01\x01\x00"), UNKNOWN);
    }

    #[test]
    fn empty_and_tiny_payloads_fall_back_to_unknown() {
        assert_eq!(classify(&[]), UNKNOWN);
        assert_eq!(classify(&[0xFF]), UNKNOWN);
        assert_eq!(classify(b"GIF8"), UNKNOWN);
    }
}
