//! Image decoding into BGRA frames.

use crate::error::DeviceError;
use crate::frame::{FrameBuffer, BYTES_PER_PIXEL};
use crate::DeviceResult;

/// A decoded image in RGBA order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl DecodedImage {
    /// Wrap raw RGBA pixels. Returns `None` if the length does not match.
    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Option<Self> {
        (rgba.len() == FrameBuffer::bgra_buffer_size(width, height)).then_some(Self {
            width,
            height,
            rgba,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Write the image into `out` as packed BGRA.
    ///
    /// `width` and `height` must match the image and `out` must hold
    /// `width * height * 4` bytes; nothing is written otherwise.
    pub fn export_bgra(&self, width: u32, height: u32, out: &mut [u8]) -> DeviceResult<()> {
        if width != self.width || height != self.height {
            return Err(DeviceError::DecodeFailed(format!(
                "export size {}x{} does not match image {}x{}",
                width, height, self.width, self.height
            )));
        }

        let size = FrameBuffer::bgra_buffer_size(width, height);
        let out = out.get_mut(..size).ok_or_else(|| {
            DeviceError::DecodeFailed(format!("output buffer holds fewer than {} bytes", size))
        })?;

        for (dst, src) in out
            .chunks_exact_mut(BYTES_PER_PIXEL)
            .zip(self.rgba.chunks_exact(BYTES_PER_PIXEL))
        {
            dst[0] = src[2];
            dst[1] = src[1];
            dst[2] = src[0];
            dst[3] = src[3];
        }

        Ok(())
    }
}

/// Decodes encoded image data (JPEG, PNG, ...) produced by a camera.
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, data: &[u8]) -> DeviceResult<DecodedImage>;
}

/// Decoder backed by the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCrateDecoder;

impl ImageDecoder for ImageCrateDecoder {
    fn decode(&self, data: &[u8]) -> DeviceResult<DecodedImage> {
        let image = image::load_from_memory(data)
            .map_err(|e| DeviceError::DecodeFailed(e.to_string()))?
            .to_rgba8();

        let (width, height) = image.dimensions();
        DecodedImage::from_rgba(width, height, image.into_raw())
            .ok_or_else(|| DeviceError::DecodeFailed("decoder returned a short image".to_string()))
    }
}
