//! Image decoding and normalization into the classifier's input tensor.
//!
//! The pixel convention is owned by the classifier: a model declares its
//! [`InputSpec`] and the pipeline builds its preprocessor from that, so the
//! two cannot drift apart.

use image::imageops::FilterType;
use image::{ImageError, ImageFormat};
use ndarray::{Array3, ArrayView3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{AnalysisError, ConfigError, Result};

/// Largest spatial size a model may declare.
pub const MAX_INPUT_DIMENSION: u32 = 4096;

/// Default cap on raw upload size (25 MiB).
pub const DEFAULT_MAX_INPUT_BYTES: usize = 25 * 1024 * 1024;

/// Raster formats accepted unless configured otherwise.
pub const DEFAULT_ACCEPTED_FORMATS: [ImageFormat; 6] = [
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Bmp,
    ImageFormat::Gif,
    ImageFormat::Tiff,
    ImageFormat::WebP,
];

/// Pixel intensity convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// `x / 255`, in `[0, 1]`.
    Unit,
    /// `x / 127.5 - 1`, in `[-1, 1]` (MobileNetV2 style).
    Signed,
}

impl Normalization {
    pub fn apply(self, value: u8) -> f32 {
        match self {
            Normalization::Unit => f32::from(value) / 255.0,
            Normalization::Signed => f32::from(value) / 127.5 - 1.0,
        }
    }

    /// Inclusive range every normalized value falls in.
    pub fn range(self) -> (f32, f32) {
        match self {
            Normalization::Unit => (0.0, 1.0),
            Normalization::Signed => (-1.0, 1.0),
        }
    }
}

/// Tensor geometry and pixel convention a classifier expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputSpec {
    pub width: u32,
    pub height: u32,
    pub normalization: Normalization,
}

impl Default for InputSpec {
    fn default() -> Self {
        Self {
            width: 224,
            height: 224,
            normalization: Normalization::Unit,
        }
    }
}

impl InputSpec {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        for (field, value) in [("input.width", self.width), ("input.height", self.height)] {
            if value == 0 || value > MAX_INPUT_DIMENSION {
                return Err(ConfigError::invalid(
                    field,
                    format!("must be within 1..={MAX_INPUT_DIMENSION}"),
                ));
            }
        }
        Ok(())
    }

    /// `[height, width, 3]`, the shape of tensors built for this spec.
    pub fn tensor_shape(&self) -> [usize; 3] {
        [self.height as usize, self.width as usize, 3]
    }
}

/// Normalized `[H, W, 3]` image tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor(Array3<f32>);

impl ImageTensor {
    pub fn from_array(array: Array3<f32>) -> Self {
        Self(array)
    }

    pub fn shape(&self) -> [usize; 3] {
        let dims = self.0.dim();
        [dims.0, dims.1, dims.2]
    }

    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.0.view()
    }

    pub fn into_inner(self) -> Array3<f32> {
        self.0
    }
}

/// Parse a format name such as `"jpeg"` or `"png"`.
pub fn parse_format(name: &str) -> std::result::Result<ImageFormat, ConfigError> {
    ImageFormat::from_extension(name.trim().to_ascii_lowercase()).ok_or_else(|| {
        ConfigError::invalid(
            "input.accepted_formats",
            format!("unknown image format: {name}"),
        )
    })
}

/// Decodes raw bytes and produces the tensor a classifier consumes.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    spec: InputSpec,
    accepted_formats: Vec<ImageFormat>,
    max_input_bytes: usize,
}

impl ImagePreprocessor {
    pub fn new(spec: InputSpec) -> std::result::Result<Self, ConfigError> {
        spec.validate()?;
        Ok(Self {
            spec,
            accepted_formats: DEFAULT_ACCEPTED_FORMATS.to_vec(),
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
        })
    }

    /// Replace the accepted container formats. Anything else is rejected
    /// as `UnsupportedFormat` before decoding.
    pub fn with_accepted_formats(mut self, formats: Vec<ImageFormat>) -> Self {
        self.accepted_formats = formats;
        self
    }

    /// Largest upload, in bytes, that will be decoded.
    pub fn with_max_input_bytes(mut self, max_input_bytes: usize) -> Self {
        self.max_input_bytes = max_input_bytes;
        self
    }

    /// Geometry and normalization of the tensors this preprocessor builds.
    pub fn spec(&self) -> &InputSpec {
        &self.spec
    }

    /// Whether `format` is in the accepted set.
    pub fn accepts(&self, format: ImageFormat) -> bool {
        self.accepted_formats.contains(&format)
    }

    /// Decode, convert to RGB, resize (no cropping) and normalize.
    pub fn preprocess(&self, bytes: &[u8]) -> Result<ImageTensor> {
        if bytes.is_empty() {
            return Err(AnalysisError::Decode("input is empty".to_string()));
        }
        if bytes.len() > self.max_input_bytes {
            return Err(AnalysisError::Decode(format!(
                "input of {} bytes exceeds the {} byte limit",
                bytes.len(),
                self.max_input_bytes
            )));
        }

        let format = image::guess_format(bytes).map_err(|_| {
            AnalysisError::Decode("input does not match any known image signature".to_string())
        })?;
        if !self.accepts(format) {
            return Err(AnalysisError::UnsupportedFormat(format!("{format:?}")));
        }

        let decoded = image::load_from_memory_with_format(bytes, format).map_err(|e| match e {
            ImageError::Unsupported(inner) => AnalysisError::UnsupportedFormat(inner.to_string()),
            other => AnalysisError::Decode(other.to_string()),
        })?;
        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(AnalysisError::Decode("image has zero area".to_string()));
        }

        debug!(
            format = ?format,
            width = decoded.width(),
            height = decoded.height(),
            "decoded input image"
        );

        let rgb = decoded.to_rgb8();
        let resized = image::imageops::resize(
            &rgb,
            self.spec.width,
            self.spec.height,
            FilterType::Triangle,
        );

        let normalization = self.spec.normalization;
        let [height, width, channels] = self.spec.tensor_shape();
        let tensor = Array3::from_shape_fn((height, width, channels), |(y, x, c)| {
            normalization.apply(resized.get_pixel(x as u32, y as u32)[c])
        });

        Ok(ImageTensor(tensor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::io::Cursor;

    fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    fn solid_png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb(color));
        encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)
    }

    #[test]
    fn resizes_to_model_resolution() {
        let pre = ImagePreprocessor::new(InputSpec::default()).unwrap();
        let tensor = pre.preprocess(&solid_png(640, 480, [10, 20, 30])).unwrap();
        assert_eq!(tensor.shape(), [224, 224, 3]);
    }

    #[test]
    fn unit_normalization_maps_to_zero_one() {
        let pre = ImagePreprocessor::new(InputSpec::default()).unwrap();
        let tensor = pre.preprocess(&solid_png(8, 8, [255, 0, 51])).unwrap();
        let view = tensor.view();
        assert!((view[[0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!(view[[0, 0, 1]].abs() < 1e-6);
        assert!((view[[3, 3, 2]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn signed_normalization_maps_to_minus_one_one() {
        let spec = InputSpec {
            width: 16,
            height: 16,
            normalization: Normalization::Signed,
        };
        let pre = ImagePreprocessor::new(spec).unwrap();
        let tensor = pre.preprocess(&solid_png(4, 4, [255, 0, 0])).unwrap();
        let view = tensor.view();
        assert!((view[[0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((view[[0, 0, 1]] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn grayscale_and_alpha_become_rgb() {
        let pre = ImagePreprocessor::new(InputSpec::default()).unwrap();

        let gray = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(5, 5, image::Luma([128])));
        let tensor = pre.preprocess(&encode(gray, ImageFormat::Png)).unwrap();
        assert_eq!(tensor.shape(), [224, 224, 3]);

        let rgba = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            5,
            5,
            image::Rgba([1, 2, 3, 0]),
        ));
        let tensor = pre.preprocess(&encode(rgba, ImageFormat::Png)).unwrap();
        assert_eq!(tensor.shape(), [224, 224, 3]);
    }

    #[test]
    fn malformed_bytes_fail_with_decode() {
        let pre = ImagePreprocessor::new(InputSpec::default()).unwrap();

        assert!(matches!(pre.preprocess(&[]), Err(AnalysisError::Decode(_))));
        assert!(matches!(
            pre.preprocess(b"definitely not an image"),
            Err(AnalysisError::Decode(_))
        ));

        let mut truncated = solid_png(32, 32, [1, 2, 3]);
        truncated.truncate(40);
        assert!(matches!(
            pre.preprocess(&truncated),
            Err(AnalysisError::Decode(_))
        ));
    }

    #[test]
    fn format_outside_accepted_set_is_unsupported() {
        let pre = ImagePreprocessor::new(InputSpec::default())
            .unwrap()
            .with_accepted_formats(vec![ImageFormat::Jpeg]);
        let err = pre.preprocess(&solid_png(4, 4, [0, 0, 0])).unwrap_err();
        assert!(matches!(err, AnalysisError::UnsupportedFormat(_)));
    }

    #[test]
    fn oversized_input_is_rejected() {
        let pre = ImagePreprocessor::new(InputSpec::default())
            .unwrap()
            .with_max_input_bytes(16);
        let err = pre.preprocess(&solid_png(4, 4, [0, 0, 0])).unwrap_err();
        assert!(err.to_string().contains("byte limit"));
    }

    #[test]
    fn rejects_degenerate_specs() {
        let spec = InputSpec {
            width: 0,
            height: 224,
            normalization: Normalization::Unit,
        };
        assert!(ImagePreprocessor::new(spec).is_err());
    }

    #[test]
    fn parses_format_names() {
        assert_eq!(parse_format("JPG").unwrap(), ImageFormat::Jpeg);
        assert_eq!(parse_format("png").unwrap(), ImageFormat::Png);
        assert!(parse_format("psd-ish").is_err());
    }
}
