//! Icon resolution for incoming notifications.
//!
//! Path hints win; otherwise a raw pixel buffer is decoded and cached as
//! `<cache>/<id>.png`.

use super::model::{HintValue, Hints, ImageData};
use crate::error::{Error, Result};
use image::{ImageFormat, Rgba, RgbaImage};
use std::path::PathBuf;

const PATH_HINTS: [&str; 2] = ["image-path", "image_path"];
const DATA_HINTS: [&str; 3] = ["image-data", "image_data", "icon_data"];

pub struct ImageCache {
    dir: PathBuf,
}

impl ImageCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Icon to show for `id`: a path hint, a freshly cached PNG, or `None`
    /// when the hints carry no image.
    pub fn resolve(&self, id: u32, hints: &Hints) -> Result<Option<String>> {
        for key in PATH_HINTS {
            if let Some(path) = hints.get(key).and_then(HintValue::as_str) {
                if !path.is_empty() {
                    return Ok(Some(path.to_string()));
                }
            }
        }

        let Some(data) = DATA_HINTS.iter().find_map(|key| match hints.get(*key) {
            Some(HintValue::Image(data)) => Some(data),
            _ => None,
        }) else {
            return Ok(None);
        };

        let image = decode(data)?;
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{id}.png"));
        image.save_with_format(&path, ImageFormat::Png)?;
        tracing::debug!(id, path = %path.display(), "Cached notification image");
        Ok(Some(path.to_string_lossy().into_owned()))
    }
}

/// Decodes an `image-data` buffer into RGBA, honoring the rowstride.
pub fn decode(data: &ImageData) -> Result<RgbaImage> {
    if data.width <= 0 || data.height <= 0 {
        return Err(Error::ImageDecode(format!(
            "invalid dimensions {}x{}",
            data.width, data.height
        )));
    }
    if data.bits_per_sample != 8 {
        return Err(Error::ImageDecode(format!(
            "unsupported bits per sample {}",
            data.bits_per_sample
        )));
    }
    let channels = match (data.channels, data.has_alpha) {
        (3, false) => 3usize,
        (4, _) => 4usize,
        (c, alpha) => {
            return Err(Error::ImageDecode(format!(
                "unsupported layout: {c} channels, alpha={alpha}"
            )))
        }
    };

    let (width, height) = (data.width as usize, data.height as usize);
    let row_len = width * channels;
    let rowstride = data.rowstride as usize;
    if data.rowstride <= 0 || rowstride < row_len {
        return Err(Error::ImageDecode(format!(
            "rowstride {} shorter than row of {} bytes",
            data.rowstride, row_len
        )));
    }
    let needed = rowstride * (height - 1) + row_len;
    if data.data.len() < needed {
        return Err(Error::ImageDecode(format!(
            "payload has {} bytes, expected at least {}",
            data.data.len(),
            needed
        )));
    }

    let mut image = RgbaImage::new(width as u32, height as u32);
    for y in 0..height {
        let row = &data.data[y * rowstride..y * rowstride + row_len];
        for (x, px) in row.chunks_exact(channels).enumerate() {
            let alpha = if channels == 4 && data.has_alpha { px[3] } else { u8::MAX };
            image.put_pixel(x as u32, y as u32, Rgba([px[0], px[1], px[2], alpha]));
        }
    }
    Ok(image)
}
