//! PDF rasterisation: save the first page of a downloaded PDF as a JPEG.
//!
//! pdfium wraps a C++ library with thread-local state, so the work runs in
//! `spawn_blocking`. The longest edge of the rendered page is capped at
//! `max_rendered_pixels` regardless of the page's physical size.

use crate::error::FetchError;
use image::{DynamicImage, ImageFormat};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming an explicit pdfium library file.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Render page 1 of `pdf_path` into `dest` as JPEG.
///
/// Subsequent pages are ignored. A document with zero pages is
/// [`FetchError::NoPages`]. The returned errors carry an empty URL; the
/// caller fills it in.
pub async fn rasterise_first_page(
    pdf_path: &Path,
    dest: &Path,
    max_pixels: u32,
) -> Result<(), FetchError> {
    let pdf_path = pdf_path.to_path_buf();
    let dest = dest.to_path_buf();

    tokio::task::spawn_blocking(move || rasterise_blocking(&pdf_path, &dest, max_pixels))
        .await
        .map_err(|e| conversion(format!("render task panicked: {e}")))?
}

fn rasterise_blocking(pdf_path: &Path, dest: &Path, max_pixels: u32) -> Result<(), FetchError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| conversion(format!("{e:?}")))?;

    let pages = document.pages();
    if pages.len() == 0 {
        return Err(FetchError::NoPages { url: String::new() });
    }

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let page = pages.get(0).map_err(|e| conversion(format!("{e:?}")))?;
    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| conversion(format!("{e:?}")))?;
    let image = bitmap.as_image();
    debug!(
        "Rendered page 1 of {} → {}x{} px",
        pdf_path.display(),
        image.width(),
        image.height()
    );

    // JPEG has no alpha channel.
    DynamicImage::ImageRgb8(image.to_rgb8())
        .save_with_format(dest, ImageFormat::Jpeg)
        .map_err(|e| FetchError::Io {
            path: dest.to_path_buf(),
            detail: e.to_string(),
        })
}

/// Bind to pdfium: `$PDFIUM_LIB_PATH`, then the working directory, then the system library.
fn bind_pdfium() -> Result<Pdfium, FetchError> {
    let bindings = match std::env::var_os(PDFIUM_LIB_PATH_ENV) {
        Some(path) => Pdfium::bind_to_library(PathBuf::from(path)),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| {
        conversion(format!(
            "could not bind to pdfium ({e:?}); set {PDFIUM_LIB_PATH_ENV} to a libpdfium file"
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

fn conversion(detail: String) -> FetchError {
    FetchError::Conversion {
        url: String::new(),
        detail,
    }
}
