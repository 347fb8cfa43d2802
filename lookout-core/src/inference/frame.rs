use base64::{engine::general_purpose::STANDARD, Engine};

use crate::inference::error::{InferenceError, InferenceResult};

/// Pixel encoding of a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    Jpeg,
    Png,
    /// Raw 8-bit RGBA, row-major
    Rgba,
}

impl FrameFormat {
    /// MIME type for encoded formats
    pub fn mime_type(&self) -> Option<&'static str> {
        match self {
            Self::Jpeg => Some("image/jpeg"),
            Self::Png => Some("image/png"),
            Self::Rgba => None,
        }
    }
}

/// A single captured video frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, format: FrameFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            data,
        }
    }

    /// Encode as a `data:` URL for model backends that take image URLs
    ///
    /// # Errors
    /// Raw RGBA frames have no MIME type and cannot be encoded.
    pub fn to_data_url(&self) -> InferenceResult<String> {
        let mime = self.format.mime_type().ok_or_else(|| {
            InferenceError::Encoding(format!(
                "{}x{} raw frame has no MIME type",
                self.width, self.height
            ))
        })?;

        Ok(format!("data:{};base64,{}", mime, STANDARD.encode(&self.data)))
    }
}

/// Supplies the current video frame
///
/// Implemented by the video-element collaborator. Returns `None` while no
/// frame is available (e.g. before the first frame is decoded).
pub trait FrameSource: Send + Sync {
    fn capture_frame(&self) -> Option<Frame>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_data_url() {
        let frame = Frame::new(1, 1, FrameFormat::Jpeg, vec![0xff, 0xd8, 0xff]);
        assert_eq!(frame.to_data_url().unwrap(), "data:image/jpeg;base64,/9j/");
    }

    #[test]
    fn test_rgba_has_no_data_url() {
        let frame = Frame::new(2, 2, FrameFormat::Rgba, vec![0; 16]);
        assert!(matches!(
            frame.to_data_url(),
            Err(InferenceError::Encoding(_))
        ));
    }
}
