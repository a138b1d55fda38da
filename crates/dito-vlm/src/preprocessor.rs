use std::path::Path;

use candle_core::{DType, Device, Tensor};
use image::{imageops::FilterType, ImageReader, RgbImage};

use crate::error::BlipError;

/// Side of the square image the vision encoder expects.
pub const MODEL_IMAGE_SIZE: u32 = 384;

// CLIP normalization used by the BLIP processor
const IMAGE_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
const IMAGE_STD: [f32; 3] = [0.268_629_54, 0.261_302_6, 0.275_777_1];

/// Reads an image of any supported format as rgb8.
pub fn read_image_rgb8(file_path: impl AsRef<Path>) -> Result<RgbImage, BlipError> {
    let image = ImageReader::open(file_path)?
        .with_guessed_format()?
        .decode()?;
    Ok(image.into_rgb8())
}

/// Returns the size fitting in a `max_size` square while keeping the aspect ratio.
///
/// Sizes that already fit are returned unchanged.
pub fn fit_size(width: u32, height: u32, max_size: u32) -> (u32, u32) {
    let longest_edge = width.max(height);
    if longest_edge <= max_size {
        return (width, height);
    }

    let scale = max_size as f64 / longest_edge as f64;
    let scaled = |side: u32| ((side as f64 * scale).round() as u32).clamp(1, max_size);

    (scaled(width), scaled(height))
}

/// Shrinks the image so that its longest edge is at most `max_size`.
pub fn limit_image_size(image: RgbImage, max_size: u32) -> RgbImage {
    let (width, height) = fit_size(image.width(), image.height(), max_size);
    if (width, height) == image.dimensions() {
        return image;
    }
    image::imageops::resize(&image, width, height, FilterType::Lanczos3)
}

/// Converts an rgb8 image to the normalized `[1, 3, 384, 384]` input of the vision encoder.
pub fn image_to_tensor(image: &RgbImage, dtype: DType, device: &Device) -> Result<Tensor, BlipError> {
    let size = MODEL_IMAGE_SIZE as usize;
    let resized = image::imageops::resize(
        image,
        MODEL_IMAGE_SIZE,
        MODEL_IMAGE_SIZE,
        FilterType::CatmullRom,
    );

    let mean = Tensor::new(&IMAGE_MEAN, device)?.reshape((3, 1, 1))?;
    let std = Tensor::new(&IMAGE_STD, device)?.reshape((3, 1, 1))?;

    let image_t = Tensor::from_vec(resized.into_raw(), (size, size, 3), device)?
        .permute((2, 0, 1))?
        .to_dtype(DType::F32)?;

    let image_t = (image_t / 255.)?
        .broadcast_sub(&mean)?
        .broadcast_div(&std)?
        .to_dtype(dtype)?
        .unsqueeze(0)?;

    Ok(image_t)
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    #[test]
    fn fit_size_keeps_small_images() {
        assert_eq!(fit_size(200, 100, 384), (200, 100));
        assert_eq!(fit_size(384, 384, 384), (384, 384));
    }

    #[test]
    fn fit_size_scales_longest_edge() {
        assert_eq!(fit_size(1000, 500, 384), (384, 192));
        assert_eq!(fit_size(300, 900, 384), (128, 384));
        assert_eq!(fit_size(5000, 2, 384), (384, 1));
    }

    #[test]
    fn limit_image_size_resizes() {
        let image = RgbImage::from_pixel(768, 512, Rgb([10, 20, 30]));
        let image = limit_image_size(image, 384);
        assert_eq!(image.dimensions(), (384, 256));
    }

    #[test]
    fn tensor_is_normalized() -> Result<(), BlipError> {
        let image = RgbImage::from_pixel(100, 50, Rgb([255, 255, 255]));
        let image_t = image_to_tensor(&image, DType::F32, &Device::Cpu)?;

        assert_eq!(image_t.dims(), &[1, 3, 384, 384]);

        let values = image_t.flatten_all()?.to_vec1::<f32>()?;
        let expected_red = (1.0 - IMAGE_MEAN[0]) / IMAGE_STD[0];
        assert!((values[0] - expected_red).abs() < 1e-4);

        Ok(())
    }

    #[test]
    fn read_image_from_disk() -> Result<(), BlipError> {
        let tmp_dir = tempfile::tempdir()?;
        let file_path = tmp_dir.path().join("square.png");
        RgbImage::from_pixel(16, 8, Rgb([1, 2, 3])).save(&file_path)?;

        let image = read_image_rgb8(&file_path)?;
        assert_eq!(image.dimensions(), (16, 8));
        assert_eq!(image.get_pixel(0, 0), &Rgb([1, 2, 3]));

        Ok(())
    }

    #[test]
    fn read_invalid_image_fails() -> Result<(), BlipError> {
        let tmp_dir = tempfile::tempdir()?;
        let file_path = tmp_dir.path().join("fake.jpg");
        std::fs::write(&file_path, b"not an image")?;

        assert!(read_image_rgb8(&file_path).is_err());

        Ok(())
    }
}
