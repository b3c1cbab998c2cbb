//! Source images: decoding from disk or taking an in-memory buffer.

use super::PixelBuffer;
use crate::error::LoadError;
use image::{ImageError, ImageReader};
use std::path::{Path, PathBuf};

/// Where an input image comes from
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Decode from a file; format is guessed from content
    Path(PathBuf),
    /// Already-decoded pixels, with a label used in reports
    Memory { label: String, buffer: PixelBuffer },
}

impl ImageSource {
    /// Human-readable name for reports and events
    pub fn label(&self) -> String {
        match self {
            ImageSource::Path(path) => path.display().to_string(),
            ImageSource::Memory { label, .. } => label.clone(),
        }
    }

    /// Produce an owned buffer for this source
    pub fn load(&self) -> Result<PixelBuffer, LoadError> {
        match self {
            ImageSource::Path(path) => load_image(path),
            ImageSource::Memory { buffer, .. } => Ok(buffer.clone()),
        }
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        ImageSource::Path(path)
    }
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        ImageSource::Path(path.to_path_buf())
    }
}

/// Decode an image file into a pixel buffer
pub fn load_image(path: &Path) -> Result<PixelBuffer, LoadError> {
    let reader = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| LoadError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

    let image = reader.decode().map_err(|e| match e {
        ImageError::IoError(source) => LoadError::Io {
            path: path.to_path_buf(),
            source,
        },
        other => LoadError::Decode {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    })?;

    if image.width() == 0 || image.height() == 0 {
        return Err(LoadError::EmptyImage {
            source_label: path.display().to_string(),
        });
    }

    PixelBuffer::from_dynamic(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn loads_png_from_disk() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("small.png");
        RgbImage::from_fn(3, 2, |x, _| Rgb([x as u8, 0, 200]))
            .save(&path)
            .unwrap();

        let buffer = load_image(&path).unwrap();

        assert_eq!((buffer.width(), buffer.height(), buffer.channels()), (3, 2, 3));
        assert_eq!(buffer.pixel(2, 1), &[2, 0, 200]);
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = load_image(Path::new("/nonexistent/photo.png"));
        assert!(matches!(result, Err(LoadError::Io { .. })));
    }

    #[test]
    fn garbage_file_is_decode_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("corrupt.jpg");
        fs::write(&path, b"this is not a valid image file").unwrap();

        let result = load_image(&path);
        assert!(matches!(result, Err(LoadError::Decode { .. })));
    }

    #[test]
    fn memory_source_clones_buffer() {
        let buffer = PixelBuffer::new(1, 1, 1, vec![42]).unwrap();
        let source = ImageSource::Memory {
            label: "inline".to_string(),
            buffer: buffer.clone(),
        };

        assert_eq!(source.label(), "inline");
        assert_eq!(source.load().unwrap(), buffer);
    }
}
