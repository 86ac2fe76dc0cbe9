use crate::errors::Error;

/// Metadata parsed from one part's header block.
///
/// Everything here is client-supplied and untrusted. In particular
/// `content_type` is informational only; acceptance decisions are made from
/// sniffed magic bytes downstream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartHeaders {
    /// Form field name from `Content-Disposition`
    pub(crate) name: String,
    /// Original file name from `Content-Disposition`; empty for non-file fields
    pub(crate) file_name: String,
    /// Declared `Content-Type` header, verbatim
    pub(crate) content_type: Option<String>,
    /// Declared per-part `Content-Length`, when the transport provides one
    pub(crate) content_length: Option<u64>,
}

impl PartHeaders {
    /// Parse a header block (without the terminating blank line).
    pub(crate) fn parse(block: &[u8]) -> Result<Self, Error> {
        let text = std::str::from_utf8(block).map_err(|_| Error::malformed("part headers are not valid UTF-8"))?;

        let mut headers = PartHeaders::default();
        for line in text.split("\r\n").filter(|l| !l.is_empty()) {
            let Some((name, value)) = line.split_once(':') else {
                return Err(Error::malformed("part header line without a colon"));
            };
            let value = value.trim();

            match name.trim().to_ascii_lowercase().as_str() {
                "content-disposition" => headers.parse_disposition(value),
                "content-type" => headers.content_type = Some(value.to_string()),
                "content-length" => headers.content_length = value.parse().ok(),
                // Unknown part headers are tolerated and ignored.
                _ => {}
            }
        }

        Ok(headers)
    }

    /// Extract `name` and `filename` parameters from a
    /// `Content-Disposition: form-data; name="..."; filename="..."` value.
    fn parse_disposition(&mut self, value: &str) {
        // First segment is the disposition type itself (`form-data`,
        // `attachment`), the rest are parameters.
        for param in value.split(';').skip(1) {
            let Some((key, raw)) = param.split_once('=') else {
                continue;
            };
            let unquoted = raw.trim().trim_matches('"').to_string();
            match key.trim().to_ascii_lowercase().as_str() {
                "name" => self.name = unquoted,
                "filename" => self.file_name = unquoted,
                _ => {}
            }
        }
    }
}
