//! Page encoding: `DynamicImage` → PNG bytes with a derived file name.
//!
//! PNG is lossless, so the remote OCR model sees exactly the pixels pdfium
//! produced. Compression is set to the fastest level with no row filtering:
//! page images are uploaded once and discarded, so encode time matters more
//! than a few extra kilobytes.

use crate::error::StepError;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::DynamicImage;
use std::path::Path;
use tracing::debug;

/// MIME type of every encoded page.
pub const PAGE_IMAGE_MIME: &str = "image/png";

/// One encoded page, ready for upload or inference.
#[derive(Clone, PartialEq, Eq)]
pub struct PageImage {
    /// 1-indexed page number.
    pub page_num: usize,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for PageImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageImage")
            .field("page_num", &self.page_num)
            .field("file_name", &self.file_name)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Encode an image as PNG.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut buf, CompressionType::Fast, FilterType::NoFilter);
    img.write_with_encoder(encoder)?;
    debug!("Encoded {}x{} page → {} bytes", img.width(), img.height(), buf.len());
    Ok(buf)
}

/// `report.pdf`, page 3 → `report_page_3.png`.
pub fn page_file_name(pdf_name: &str, page_num: usize) -> String {
    let stem = Path::new(pdf_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string());
    format!("{stem}_page_{page_num}.png")
}

/// Encode rendered pages in order. Any encoding failure fails the batch.
pub fn encode_pages(images: &[DynamicImage], pdf_name: &str) -> Result<Vec<PageImage>, StepError> {
    images
        .iter()
        .enumerate()
        .map(|(idx, img)| {
            let page_num = idx + 1;
            let bytes = encode_png(img).map_err(|e| StepError::RasterisationFailed {
                page: page_num,
                detail: format!("PNG encoding failed: {e}"),
            })?;
            Ok(PageImage {
                page_num,
                file_name: page_file_name(pdf_name, page_num),
                bytes,
            })
        })
        .collect()
}
