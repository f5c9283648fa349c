//! PDF rasterisation: render every page to a `DynamicImage` via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which is CPU-bound and not
//! async-safe. `tokio::task::spawn_blocking` keeps the Tokio worker threads
//! free while pages are rasterised.
//!
//! ## Resolution
//!
//! Pages are scaled by a fixed factor of the PDF's 72-point user space. The
//! default factor of 2.0 gives ≈144 DPI, sharp enough for OCR while keeping
//! uploads small. There is no partial mode: if any page fails, the whole
//! document fails.

use crate::error::StepError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Environment variable naming a pdfium library file or the directory holding it.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Check the `%PDF` magic bytes before handing data to pdfium.
pub fn check_pdf_magic(name: &str, bytes: &[u8]) -> Result<(), StepError> {
    if bytes.starts_with(b"%PDF") {
        Ok(())
    } else {
        Err(StepError::NotAPdf {
            name: name.to_string(),
            magic: bytes.iter().take(4).copied().collect(),
        })
    }
}

/// Rasterise all pages of a PDF held in memory, in page order.
pub async fn render_pdf(
    name: &str,
    bytes: Vec<u8>,
    scale: f32,
) -> Result<Vec<DynamicImage>, StepError> {
    check_pdf_magic(name, &bytes)?;
    let name = name.to_string();

    tokio::task::spawn_blocking(move || render_blocking(&name, &bytes, scale))
        .await
        .map_err(|e| StepError::Internal(format!("Render task panicked: {e}")))?
}

/// Blocking implementation of page rendering.
fn render_blocking(name: &str, bytes: &[u8], scale: f32) -> Result<Vec<DynamicImage>, StepError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| StepError::CorruptPdf {
            name: name.to_string(),
            detail: format!("{e:?}"),
        })?;

    let pages = document.pages();
    let total = pages.len() as usize;
    info!("PDF '{}' loaded: {} pages", name, total);

    let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);
    let mut images = Vec::with_capacity(total);

    for (idx, page) in pages.iter().enumerate() {
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| StepError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{e:?}"),
            })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        images.push(image);
    }

    Ok(images)
}

/// Bind to a pdfium library.
///
/// Lookup order: `PDFIUM_LIB_PATH` (a library file or its directory), the
/// current directory, then the system library search path.
fn bind_pdfium() -> Result<Pdfium, StepError> {
    let bindings = match std::env::var(PDFIUM_LIB_PATH_ENV) {
        Ok(p) if !p.trim().is_empty() => {
            let path = Path::new(&p);
            if path.is_dir() {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))
            } else {
                Pdfium::bind_to_library(path)
            }
        }
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| StepError::PdfiumBindingFailed(format!("{e:?}")))?;

    Ok(Pdfium::new(bindings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_accepts_pdf_header() {
        assert!(check_pdf_magic("a.pdf", b"%PDF-1.7\n...").is_ok());
    }

    #[test]
    fn magic_rejects_other_bytes() {
        let err = check_pdf_magic("a.pdf", b"PK\x03\x04zip").unwrap_err();
        match err {
            StepError::NotAPdf { name, magic } => {
                assert_eq!(name, "a.pdf");
                assert_eq!(magic, b"PK\x03\x04".to_vec());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn magic_rejects_short_input() {
        assert!(check_pdf_magic("empty.pdf", b"").is_err());
    }

    #[tokio::test]
    async fn render_refuses_non_pdf_before_binding() {
        // Fails on the magic check, so no pdfium library is needed.
        let err = render_pdf("notes.txt", b"hello".to_vec(), 2.0)
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::NotAPdf { .. }));
    }
}
