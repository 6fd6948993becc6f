//! Image decoding and VGG16-style tensor preparation.

use crate::config::{ClassifierConfig, TensorLayout};
use crate::error::{Error, Result};
use image::{DynamicImage, ImageFormat, ImageReader, RgbImage, RgbaImage, imageops::FilterType};
use ndarray::Array4;
use std::path::Path;

const SUPPORTED_FORMATS: [ImageFormat; 5] = [
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Bmp,
    ImageFormat::Gif,
    ImageFormat::Tiff,
];

/// Turns an image file into the exact tensor the model was trained on.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    input_size: u32,
    bgr_mean: [f32; 3],
    layout: TensorLayout,
}

impl Preprocessor {
    pub fn new(cfg: &ClassifierConfig) -> Self {
        Self {
            input_size: cfg.input_size,
            bgr_mean: cfg.bgr_mean,
            layout: cfg.layout,
        }
    }

    pub fn input_size(&self) -> u32 {
        self.input_size
    }

    pub fn prepare(&self, path: &Path) -> Result<Array4<f32>> {
        let img = decode_image(path)?;
        Ok(self.tensor_from_image(&img))
    }

    /// RGB, nearest-neighbour resize, RGB→BGR, per-channel mean subtraction.
    pub fn tensor_from_image(&self, img: &DynamicImage) -> Array4<f32> {
        let size = self.input_size as usize;
        let resized = resize_to_square(img.to_rgb8(), self.input_size);
        let mut array = match self.layout {
            TensorLayout::Nhwc => Array4::<f32>::zeros((1, size, size, 3)),
            TensorLayout::Nchw => Array4::<f32>::zeros((1, 3, size, size)),
        };
        for (x, y, pixel) in resized.enumerate_pixels() {
            let [r, g, b] = pixel.0;
            let (y, x) = (y as usize, x as usize);
            let bgr = [b, g, r];
            for (c, value) in bgr.into_iter().enumerate() {
                let v = f32::from(value) - self.bgr_mean[c];
                match self.layout {
                    TensorLayout::Nhwc => array[[0, y, x, c]] = v,
                    TensorLayout::Nchw => array[[0, c, y, x]] = v,
                }
            }
        }
        array
    }
}

/// Decode a JPEG/PNG/BMP/GIF/TIFF file, sniffing the format from its content.
pub fn decode_image(path: &Path) -> Result<DynamicImage> {
    let decode_err = |reason: String| Error::ImageDecode {
        path: path.to_path_buf(),
        reason,
    };
    let reader = ImageReader::open(path)
        .map_err(|e| decode_err(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| decode_err(e.to_string()))?;
    match reader.format() {
        Some(format) if SUPPORTED_FORMATS.contains(&format) => {}
        Some(format) => return Err(decode_err(format!("unsupported format {format:?}"))),
        None => return Err(decode_err("unrecognized image format".to_string())),
    }
    reader.decode().map_err(|e| decode_err(e.to_string()))
}

/// Decode straight into a display bitmap that fits `max_side`, keeping aspect ratio.
pub fn decode_display_image(path: &Path, max_side: u32) -> Result<RgbaImage> {
    let img = decode_image(path)?;
    let fitted = if img.width() > max_side || img.height() > max_side {
        img.resize(max_side, max_side, FilterType::CatmullRom)
    } else {
        img
    };
    Ok(fitted.to_rgba8())
}

fn resize_to_square(img: RgbImage, size: u32) -> RgbImage {
    if img.dimensions() == (size, size) {
        return img;
    }
    image::imageops::resize(&img, size, size, FilterType::Nearest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use approx::assert_relative_eq;
    use image::{Rgb, Rgba, RgbaImage};
    use std::fs;
    use tempfile::tempdir;

    fn preprocessor(layout: TensorLayout) -> Preprocessor {
        Preprocessor::new(&ClassifierConfig {
            layout,
            ..ClassifierConfig::default()
        })
    }

    #[test]
    fn solid_color_becomes_mean_subtracted_bgr() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("solid.png");
        RgbImage::from_pixel(64, 48, Rgb([200, 100, 50])).save(&path)?;

        let tensor = preprocessor(TensorLayout::Nhwc).prepare(&path)?;
        assert_eq!(tensor.shape(), &[1, 224, 224, 3]);
        for (y, x) in [(0, 0), (111, 57), (223, 223)] {
            assert_relative_eq!(tensor[[0, y, x, 0]], 50.0 - 103.939, epsilon = 1e-4);
            assert_relative_eq!(tensor[[0, y, x, 1]], 100.0 - 116.779, epsilon = 1e-4);
            assert_relative_eq!(tensor[[0, y, x, 2]], 200.0 - 123.68, epsilon = 1e-4);
        }
        Ok(())
    }

    #[test]
    fn nchw_layout_puts_channels_first() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(224, 224, Rgb([10, 20, 30])));
        let tensor = preprocessor(TensorLayout::Nchw).tensor_from_image(&img);
        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
        assert_relative_eq!(tensor[[0, 0, 5, 9]], 30.0 - 103.939, epsilon = 1e-4);
        assert_relative_eq!(tensor[[0, 2, 5, 9]], 10.0 - 123.68, epsilon = 1e-4);
    }

    #[test]
    fn alpha_channel_is_dropped() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 0])));
        let tensor = preprocessor(TensorLayout::Nhwc).tensor_from_image(&img);
        assert_relative_eq!(tensor[[0, 0, 0, 2]], 255.0 - 123.68, epsilon = 1e-4);
        assert_relative_eq!(tensor[[0, 0, 0, 0]], -103.939, epsilon = 1e-4);
    }

    #[test]
    fn nearest_resize_keeps_hard_edges() {
        let mut src = RgbImage::from_pixel(2, 1, Rgb([0, 0, 0]));
        src.put_pixel(1, 0, Rgb([255, 255, 255]));
        let tensor =
            preprocessor(TensorLayout::Nhwc).tensor_from_image(&DynamicImage::ImageRgb8(src));
        let left = tensor[[0, 100, 0, 0]] + 103.939;
        let right = tensor[[0, 100, 223, 0]] + 103.939;
        assert_relative_eq!(left, 0.0, epsilon = 1e-3);
        assert_relative_eq!(right, 255.0, epsilon = 1e-3);
    }

    #[test]
    fn accepts_common_raster_formats() -> Result<()> {
        let dir = tempdir()?;
        let img = RgbImage::from_pixel(16, 16, Rgb([1, 2, 3]));
        for name in ["a.png", "b.jpg", "c.bmp", "d.gif", "e.tiff"] {
            let path = dir.path().join(name);
            img.save(&path)?;
            assert!(decode_image(&path).is_ok(), "{name} should decode");
        }
        Ok(())
    }

    #[test]
    fn format_is_sniffed_not_taken_from_extension() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("really_a_png.dat");
        RgbImage::from_pixel(4, 4, Rgb([9, 9, 9])).save_with_format(&path, ImageFormat::Png)?;
        assert!(decode_image(&path).is_ok());
        Ok(())
    }

    #[test]
    fn text_file_is_an_image_decode_error() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("notes.txt");
        fs::write(&path, "not an image")?;
        let err = decode_image(&path).unwrap_err();
        assert!(matches!(err, Error::ImageDecode { .. }));
        Ok(())
    }

    #[test]
    fn truncated_png_is_an_image_decode_error() -> Result<()> {
        let dir = tempdir()?;
        let good = dir.path().join("good.png");
        RgbImage::from_pixel(32, 32, Rgb([5, 6, 7])).save(&good)?;
        let bytes = fs::read(&good)?;
        let bad = dir.path().join("bad.png");
        fs::write(&bad, &bytes[..bytes.len() / 2])?;
        assert!(matches!(decode_image(&bad), Err(Error::ImageDecode { .. })));
        Ok(())
    }

    #[test]
    fn missing_file_is_an_image_decode_error() {
        let err = decode_image(Path::new("/nonexistent/bird.jpg")).unwrap_err();
        assert!(matches!(err, Error::ImageDecode { .. }));
    }

    #[test]
    fn display_image_fits_box_and_keeps_aspect() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("wide.png");
        RgbImage::from_pixel(800, 400, Rgb([0, 128, 255])).save(&path)?;
        let shown = decode_display_image(&path, 380)?;
        assert_eq!(shown.dimensions(), (380, 190));

        let small = dir.path().join("small.png");
        RgbImage::from_pixel(50, 30, Rgb([0, 0, 0])).save(&small)?;
        assert_eq!(decode_display_image(&small, 380)?.dimensions(), (50, 30));
        Ok(())
    }
}
