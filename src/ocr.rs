use anyhow::Result;

/// Text recognition collaborator. One blocking call per image; retries and
/// provider failover are the implementation's business.
pub trait OcrService: Send + Sync {
    /// Recognize the text in a PNG-encoded image, one line per text row.
    fn recognize(&self, image_png: &[u8]) -> Result<String>;
}
