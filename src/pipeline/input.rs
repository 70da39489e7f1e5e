//! Image loading: resolve the configured path to a decoded image.
//!
//! The file is decoded up front so that a missing, unreadable or corrupt
//! image is reported before any inference call is made (and before any
//! output file is touched).

use crate::error::TimetableError;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A decoded timetable image.
pub struct TimetableImage {
    pub path: PathBuf,
    pub image: DynamicImage,
    /// Format detected from the file contents, if recognised.
    pub format: Option<ImageFormat>,
    /// Size of the file on disk.
    pub byte_len: usize,
}

impl TimetableImage {
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Load and decode the image at `path`.
///
/// # Errors
/// - [`TimetableError::MissingInput`] if nothing exists at `path`
/// - [`TimetableError::PermissionDenied`] if it cannot be read
/// - [`TimetableError::NotAnImage`] if it is a directory or does not decode
pub fn load_image(path: &Path) -> Result<TimetableImage, TimetableError> {
    if !path.exists() {
        return Err(TimetableError::MissingInput {
            path: path.to_path_buf(),
        });
    }
    if path.is_dir() {
        return Err(TimetableError::NotAnImage {
            path: path.to_path_buf(),
            detail: "is a directory".into(),
        });
    }

    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(TimetableError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(TimetableError::MissingInput {
                path: path.to_path_buf(),
            });
        }
        Err(e) => {
            return Err(TimetableError::NotAnImage {
                path: path.to_path_buf(),
                detail: e.to_string(),
            });
        }
    };

    let format = image::guess_format(&bytes).ok();
    let image = image::load_from_memory(&bytes).map_err(|e| TimetableError::NotAnImage {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    let (w, h) = image.dimensions();
    debug!(
        "Loaded image {} ({}x{}, {:?}, {} bytes)",
        path.display(),
        w,
        h,
        format,
        bytes.len()
    );

    Ok(TimetableImage {
        path: path.to_path_buf(),
        image,
        format,
        byte_len: bytes.len(),
    })
}
