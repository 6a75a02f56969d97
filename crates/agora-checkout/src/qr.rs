//! QR rendering for the device-authorization URL.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Luma};
use qrcode::QrCode;

/// Smallest edge of the rendered image, in pixels.
const QR_MIN_SIZE: u32 = 200;

#[derive(Debug, thiserror::Error)]
pub enum QrRenderError {
    #[error("QR encoding failed: {0}")]
    Encode(#[from] qrcode::types::QrError),

    #[error("PNG encoding failed: {0}")]
    Png(#[from] image::ImageError),
}

/// Render the given data as a PNG suitable for inline display.
pub fn render_png(data: &str) -> Result<Vec<u8>, QrRenderError> {
    let code = QrCode::new(data.as_bytes())?;
    let rendered = code
        .render::<Luma<u8>>()
        .min_dimensions(QR_MIN_SIZE, QR_MIN_SIZE)
        .build();

    let mut png = Vec::new();
    DynamicImage::ImageLuma8(rendered).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}
