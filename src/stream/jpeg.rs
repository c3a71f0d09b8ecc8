// SPDX-License-Identifier: GPL-3.0-or-later
use bytes::{BufMut, Bytes, BytesMut};
use image::codecs::jpeg::JpegEncoder as ImageJpegEncoder;
use image::ColorType;
use tracing::trace;

#[cfg(feature = "mozjpeg")]
use mozjpeg::{ColorSpace, Compress};

use crate::error::EncodeError;
use crate::image_buffer::RenderedImage;
use crate::render::Quality;

#[cfg(feature = "mozjpeg")]
fn encode_jpeg_mozjpeg(
    data: &[u8],
    width: u32,
    height: u32,
    channels: u8,
    quality: Quality,
) -> Result<Bytes, EncodeError> {
    trace!("using mozjpeg to encode JPEG image");
    let color_space = if channels == 1 {
        ColorSpace::JCS_GRAYSCALE
    } else {
        ColorSpace::JCS_RGB
    };
    // mozjpeg reports errors by unwinding.
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let mut jpeg_encoder = Compress::new(color_space);
        jpeg_encoder.set_quality(quality.value() as f32);
        jpeg_encoder.set_mem_dest();
        jpeg_encoder.set_size(width as usize, height as usize);
        jpeg_encoder.start_compress();
        if !jpeg_encoder.write_scanlines(data) {
            return Err(EncodeError::Codec("unable to write all scanlines".to_string()));
        }
        jpeg_encoder.finish_compress();
        jpeg_encoder
            .data_to_vec()
            .map_err(|_| EncodeError::Codec("no compressed data produced".to_string()))
    }));
    match result {
        Ok(encoded) => encoded.map(Bytes::from),
        Err(_) => Err(EncodeError::Codec("mozjpeg aborted".to_string())),
    }
}

fn encode_jpeg_image(
    data: &[u8],
    width: u32,
    height: u32,
    channels: u8,
    quality: Quality,
) -> Result<Bytes, EncodeError> {
    trace!("using image crate to encode JPEG image");
    let color_type = if channels == 1 {
        ColorType::L8
    } else {
        ColorType::Rgb8
    };
    let mut jpeg_buf = BytesMut::new().writer();
    let mut encoder = ImageJpegEncoder::new_with_quality(&mut jpeg_buf, quality.value());
    encoder.encode(data, width, height, color_type)?;
    Ok(jpeg_buf.into_inner().freeze())
}

/// Encode raw 8-bit samples to JPEG.
///
/// `channels` must be 1 (grayscale) or 3 (RGB), and `data` must hold exactly
/// `width * height * channels` samples.
pub(crate) fn encode_raw(
    data: &[u8],
    width: u32,
    height: u32,
    channels: u8,
    quality: Quality,
) -> Result<Bytes, EncodeError> {
    if width == 0 || height == 0 {
        return Err(EncodeError::Empty);
    }
    if channels != 1 && channels != 3 {
        return Err(EncodeError::Codec(format!(
            "unsupported channel count {}",
            channels
        )));
    }
    let expected = width as usize * height as usize * channels as usize;
    if data.len() != expected {
        return Err(EncodeError::BufferSize {
            expected,
            actual: data.len(),
        });
    }
    if cfg!(feature = "mozjpeg") {
        #[cfg(feature = "mozjpeg")]
        return encode_jpeg_mozjpeg(data, width, height, channels, quality);
    }
    encode_jpeg_image(data, width, height, channels, quality)
}

pub(crate) fn encode_jpeg(image: &RenderedImage, quality: Quality) -> Result<Bytes, EncodeError> {
    encode_raw(
        image.as_bytes(),
        image.width(),
        image.height(),
        image.channels(),
        quality,
    )
}

#[cfg(test)]
mod jpeg_test {
    use std::convert::TryFrom;

    use image::{GenericImageView, GrayImage, Luma, Rgb, RgbImage};

    use super::{encode_jpeg, encode_raw};
    use crate::error::EncodeError;
    use crate::image_buffer::{RenderedImage, FRAME_HEIGHT, FRAME_WIDTH};
    use crate::render::Quality;

    const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];

    #[test]
    fn gray_image() {
        let image = GrayImage::from_fn(FRAME_WIDTH, FRAME_HEIGHT, |x, _| Luma([x as u8]));
        let encoded = encode_jpeg(&RenderedImage::Gray(image), Quality::default()).unwrap();
        assert_eq!(&encoded[..3], &JPEG_MAGIC);
        let decoded = image::load_from_memory(&encoded).unwrap();
        assert_eq!(decoded.dimensions(), (FRAME_WIDTH, FRAME_HEIGHT));
        assert_eq!(decoded.color(), image::ColorType::L8);
    }

    #[test]
    fn rgb_image() {
        let image = RgbImage::from_pixel(FRAME_WIDTH, FRAME_HEIGHT, Rgb([200, 40, 10]));
        let encoded = encode_jpeg(&RenderedImage::Rgb(image), Quality::default()).unwrap();
        let decoded = image::load_from_memory(&encoded).unwrap();
        assert_eq!(decoded.dimensions(), (FRAME_WIDTH, FRAME_HEIGHT));
        assert_eq!(decoded.color(), image::ColorType::Rgb8);
    }

    #[test]
    fn quality_changes_size() {
        let image = GrayImage::from_fn(FRAME_WIDTH, FRAME_HEIGHT, |x, y| {
            Luma([((x * 31) ^ (y * 17)) as u8])
        });
        let rendered = RenderedImage::Gray(image);
        let low = encode_jpeg(&rendered, Quality::try_from(10).unwrap()).unwrap();
        let high = encode_jpeg(&rendered, Quality::try_from(100).unwrap()).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn short_buffer() {
        let result = encode_raw(&[0u8; 10], 4, 4, 1, Quality::default());
        assert!(matches!(
            result,
            Err(EncodeError::BufferSize {
                expected: 16,
                actual: 10
            })
        ));
    }

    #[test]
    fn empty_image() {
        let result = encode_raw(&[], 0, 0, 3, Quality::default());
        assert!(matches!(result, Err(EncodeError::Empty)));
    }

    #[test]
    fn bad_channel_count() {
        let result = encode_raw(&[0u8; 32], 4, 4, 2, Quality::default());
        assert!(matches!(result, Err(EncodeError::Codec(_))));
    }
}
