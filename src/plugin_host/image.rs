//! Images and image inputs
//!
//! The host exchanges premultiplied RGBA float images with plugins. An
//! `Image` covers a pixel rectangle; pixels outside it read as transparent
//! black.

use std::sync::Arc;

use super::context::EvaluationContext;
use super::types::{ClipDescriptor, Format, PluginError, PluginResult, Rect};

/// Number of float channels per pixel
pub const CHANNELS: usize = 4;

/// Largest image the host allocates, in pixels
pub const MAX_PIXELS: usize = 1 << 28;

/// Widest row whose byte length still fits the ABI's `i32` row bytes
const MAX_ROW_PIXELS: usize = i32::MAX as usize / (CHANNELS * std::mem::size_of::<f32>());

/// A premultiplied RGBA float image
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    bounds: Rect,
    pixel_aspect: f64,
    pixels: Vec<f32>,
}

impl Image {
    /// A transparent image covering `bounds`
    ///
    /// Fails with `InvalidFormat` when the pixels cannot be allocated.
    pub fn new(bounds: Rect) -> PluginResult<Self> {
        let (width, height) = (bounds.width() as usize, bounds.height() as usize);
        let too_large = || PluginError::InvalidFormat(format!("{}x{} image is too large", width, height));
        let pixels = width
            .checked_mul(height)
            .filter(|&n| n <= MAX_PIXELS && width <= MAX_ROW_PIXELS)
            .ok_or_else(too_large)?;

        let mut data = Vec::new();
        data.try_reserve_exact(pixels * CHANNELS)
            .map_err(|_| too_large())?;
        data.resize(pixels * CHANNELS, 0.0);
        Ok(Self {
            bounds,
            pixel_aspect: 1.0,
            pixels: data,
        })
    }

    /// An image filled with a single colour
    pub fn filled(bounds: Rect, color: [f32; 4]) -> PluginResult<Self> {
        let mut image = Self::new(bounds)?;
        image.fill(color);
        Ok(image)
    }

    pub fn with_pixel_aspect(mut self, pixel_aspect: f64) -> Self {
        self.pixel_aspect = pixel_aspect;
        self
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn pixel_aspect(&self) -> f64 {
        self.pixel_aspect
    }

    pub fn width(&self) -> i32 {
        self.bounds.width()
    }

    pub fn height(&self) -> i32 {
        self.bounds.height()
    }

    /// Bytes per row of pixel data
    pub fn row_bytes(&self) -> i32 {
        self.width() * (CHANNELS * std::mem::size_of::<f32>()) as i32
    }

    pub fn data(&self) -> &[f32] {
        &self.pixels
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.pixels
    }

    fn offset(&self, x: i32, y: i32) -> Option<usize> {
        if !self.bounds.contains(x, y) {
            return None;
        }
        let col = (x - self.bounds.x1) as usize;
        let row = (y - self.bounds.y1) as usize;
        Some((row * self.width() as usize + col) * CHANNELS)
    }

    /// Pixel at absolute coordinates, transparent outside the bounds
    pub fn pixel(&self, x: i32, y: i32) -> [f32; 4] {
        match self.offset(x, y) {
            Some(i) => [
                self.pixels[i],
                self.pixels[i + 1],
                self.pixels[i + 2],
                self.pixels[i + 3],
            ],
            None => [0.0; 4],
        }
    }

    /// Write a pixel; writes outside the bounds are ignored
    pub fn set_pixel(&mut self, x: i32, y: i32, value: [f32; 4]) {
        if let Some(i) = self.offset(x, y) {
            self.pixels[i..i + CHANNELS].copy_from_slice(&value);
        }
    }

    pub fn fill(&mut self, color: [f32; 4]) {
        for px in self.pixels.chunks_exact_mut(CHANNELS) {
            px.copy_from_slice(&color);
        }
    }

    /// Mutable pixel rows, top of the rectangle first
    pub fn rows_mut(&mut self) -> impl Iterator<Item = (i32, &mut [f32])> {
        let y1 = self.bounds.y1;
        let stride = self.width().max(1) as usize * CHANNELS;
        self.pixels
            .chunks_exact_mut(stride)
            .enumerate()
            .map(move |(i, row)| (y1 + i as i32, row))
    }
}

/// Something an effect input can be connected to
///
/// Implemented by upstream nodes and by simple image sources.
pub trait ImageInput: Send + Sync {
    /// Format of the images this input produces, if it has one
    fn format(&self, context: &EvaluationContext) -> Option<Format>;

    /// Compute the image inside `region`
    fn image(&self, context: &EvaluationContext, region: Rect) -> PluginResult<Image>;
}

/// Shared handle to an input
pub type SharedImageInput = Arc<dyn ImageInput>;

/// An infinite single-colour source with a fixed format
#[derive(Clone, Debug, PartialEq)]
pub struct ConstantImage {
    pub format: Format,
    pub color: [f32; 4],
}

impl ConstantImage {
    pub fn new(format: Format, color: [f32; 4]) -> Self {
        Self { format, color }
    }
}

impl ImageInput for ConstantImage {
    fn format(&self, _context: &EvaluationContext) -> Option<Format> {
        Some(self.format)
    }

    fn image(&self, _context: &EvaluationContext, region: Rect) -> PluginResult<Image> {
        Ok(Image::filled(region, self.color)?.with_pixel_aspect(self.format.pixel_aspect))
    }
}

/// A declared input clip and whatever the node has connected to it
#[derive(Clone)]
pub struct ClipBinding {
    pub clip: ClipDescriptor,
    pub source: Option<SharedImageInput>,
}

impl ClipBinding {
    pub fn new(clip: ClipDescriptor, source: Option<SharedImageInput>) -> Self {
        Self { clip, source }
    }

    pub fn name(&self) -> &str {
        &self.clip.name
    }

    pub fn is_connected(&self) -> bool {
        self.source.is_some()
    }

    /// Upstream format, resolved on demand
    pub fn format(&self, context: &EvaluationContext) -> Option<Format> {
        self.source.as_ref().and_then(|s| s.format(context))
    }
}

impl std::fmt::Debug for ClipBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipBinding")
            .field("clip", &self.clip.name)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_access_uses_absolute_coordinates() {
        let mut image = Image::new(Rect::new(10, 20, 14, 22)).unwrap();
        assert_eq!(image.row_bytes(), 4 * 16);
        image.set_pixel(13, 21, [1.0, 0.5, 0.25, 1.0]);
        assert_eq!(image.pixel(13, 21), [1.0, 0.5, 0.25, 1.0]);
        assert_eq!(image.pixel(0, 0), [0.0; 4]);

        // Out-of-bounds writes are dropped
        image.set_pixel(100, 100, [1.0; 4]);
        assert_eq!(image.data().iter().filter(|v| **v != 0.0).count(), 4);
    }

    #[test]
    fn test_rows_mut_reports_absolute_rows() {
        let mut image = Image::new(Rect::new(0, 5, 2, 8)).unwrap();
        let rows: Vec<i32> = image.rows_mut().map(|(y, _)| y).collect();
        assert_eq!(rows, vec![5, 6, 7]);
    }

    #[test]
    fn test_oversized_image_is_rejected() {
        assert!(matches!(
            Image::new(Rect::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX)),
            Err(PluginError::InvalidFormat(_))
        ));
        assert!(matches!(
            Image::new(Rect::new(0, 0, 1 << 27, 1)),
            Err(PluginError::InvalidFormat(_))
        ));
        assert!(Image::new(Rect::new(0, 0, 0, 100)).unwrap().data().is_empty());
    }

    #[test]
    fn test_constant_image_input() {
        let input = ConstantImage::new(Format::new(8, 8), [0.2, 0.4, 0.6, 1.0]);
        let context = EvaluationContext::new();
        assert_eq!(input.format(&context), Some(Format::new(8, 8)));
        let image = input.image(&context, Rect::new(0, 0, 2, 2)).unwrap();
        assert_eq!(image.pixel(1, 1), [0.2, 0.4, 0.6, 1.0]);
    }
}
