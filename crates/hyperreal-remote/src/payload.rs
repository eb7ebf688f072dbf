//! Opaque image blobs exchanged with the generation service.

use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};

use crate::error::RemoteCallError;

/// An encoded image (PNG, JPEG, ...) plus its MIME type.
///
/// Bytes are reference-counted so a payload can sit in the reference set, the
/// run state and an artifact record at once without copying.
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    mime_type: String,
    bytes: Arc<[u8]>,
}

impl ImagePayload {
    pub fn new(mime_type: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes: Arc::from(bytes.into()),
        }
    }

    pub fn png(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new("image/png", bytes)
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Standard base64 of the raw bytes (no data-URL prefix).
    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(self.bytes())
    }

    pub fn from_base64(mime_type: impl Into<String>, data: &str) -> Result<Self, RemoteCallError> {
        let bytes = general_purpose::STANDARD.decode(data.trim())?;
        Ok(Self::new(mime_type, bytes))
    }

    /// Parse `data:<mime>;base64,<data>`. A bare base64 string is taken as PNG.
    pub fn from_data_url(url: &str) -> Result<Self, RemoteCallError> {
        match url.strip_prefix("data:").and_then(|rest| rest.split_once(',')) {
            Some((header, data)) => {
                let mime = header.strip_suffix(";base64").ok_or_else(|| {
                    RemoteCallError::Decode(format!("data URL is not base64: {header}"))
                })?;
                Self::from_base64(mime, data)
            }
            None => Self::from_base64("image/png", url),
        }
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

impl std::fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePayload")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_url_parsing() {
        let payload = ImagePayload::png(b"hello".to_vec());
        let url = payload.to_data_url();
        assert!(url.starts_with("data:image/png;base64,"));

        let parsed = ImagePayload::from_data_url(&url).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn test_bare_base64_defaults_to_png() {
        let parsed = ImagePayload::from_data_url("aGk=").unwrap();
        assert_eq!(parsed.mime_type(), "image/png");
        assert_eq!(parsed.bytes(), b"hi");
    }

    #[test]
    fn test_invalid_base64_is_decode_error() {
        let err = ImagePayload::from_data_url("data:image/png;base64,@@@").unwrap_err();
        assert!(matches!(err, RemoteCallError::Decode(_)));
    }

    #[test]
    fn test_debug_hides_bytes() {
        let payload = ImagePayload::new("image/jpeg", vec![0u8; 2048]);
        let dbg = format!("{payload:?}");
        assert!(dbg.contains("2048"));
        assert!(!dbg.contains("0, 0"));
    }
}
