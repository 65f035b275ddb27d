//! Reading and writing ICS (Image Cytometry Standard) files.
//!
//! ICS files tag each axis with a name (`x`, `z`, `dim_4`, `RGB`, ...) and
//! store the axes in any order. Reading resolves the tags into a channel
//! axis and a canonical axis order, then copies the requested region into
//! a strided [`Image`]. Writing does the reverse.
//!
//! # Examples
//!
//! ```no_run
//! use icsio::{DataType, Image, WriteOptions};
//!
//! let mut image = Image::new(&[256, 256], 3, DataType::UInt8);
//! image.set_color_space("RGB");
//! icsio::write_ics(&image, "photo", &[], 0, &WriteOptions::default())?;
//!
//! let info = icsio::read_ics_info("photo.ics")?;
//! assert_eq!(info.sizes, vec![256, 256]);
//! assert_eq!(info.color_space, "RGB");
//!
//! let copy = icsio::read_ics("photo.ics")?;
//! assert_eq!(copy.tensor_elements(), 3);
//! # Ok::<(), icsio::Error>(())
//! ```

pub mod color;
pub mod container;
pub mod dims;
pub mod error;
pub mod image;
pub mod models;
pub mod reader;
pub mod region;
pub mod tensor;
pub mod units;
pub mod utils;
pub mod writer;

use std::path::Path;

pub use color::{ColorSpaceList, ColorSpaceRegistry, KnownColorSpaces};
pub use container::{Compression, IcsVersion};
pub use error::{Error, Result};
pub use image::{Image, Layout};
pub use models::{DataType, FileInformation, PixelSize, Sample};
pub use reader::{IcsCodec, ReadOptions};
pub use region::Range;
pub use tensor::{Tensor, TensorShape};
pub use units::{PhysicalQuantity, Units};
pub use writer::{WriteOptions, write_ics};

/// Reads a whole ICS file, recognizing the built-in color spaces.
pub fn read_ics(path: impl AsRef<Path>) -> Result<Image> {
    IcsCodec::default()
        .read(path, ReadOptions { fast: true })
        .map(|(image, _)| image)
}

/// Reads the header of an ICS file, recognizing the built-in color spaces.
pub fn read_ics_info(path: impl AsRef<Path>) -> Result<FileInformation> {
    IcsCodec::default().read_info(path)
}

/// True if `path` names an ICS file.
pub fn is_ics(path: impl AsRef<Path>) -> bool {
    IcsCodec::is_ics(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_scalar_image() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let values: Vec<f32> = (0..12 * 13).map(|v| v as f32 * 0.5).collect();
        let image = Image::from_samples(&[12, 13], 1, &values)?;
        let path = dir.path().join("scalar");
        write_ics(&image, &path, &[], 0, &WriteOptions::default())?;

        assert!(is_ics(dir.path().join("scalar.ics")));
        let copy = read_ics(&path)?;
        assert_eq!(copy.sizes(), &[12, 13]);
        assert_eq!(copy.data_type(), DataType::SFloat);
        assert_eq!(copy.samples::<f32>()?, values);
        Ok(())
    }

    #[test]
    fn test_info_matches_image() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let image = Image::new(&[20, 30, 11], 1, DataType::SInt16);
        let path = dir.path().join("volume.ics");
        write_ics(&image, &path, &["acquired\tbench".to_string()], 12, &WriteOptions::default())?;

        let info = read_ics_info(&path)?;
        assert_eq!(info.file_type, "ICS");
        assert_eq!(info.sizes, vec![20, 30, 11]);
        assert_eq!(info.tensor_elements, 1);
        assert_eq!(info.significant_bits, 12);
        assert!(info.color_space.is_empty());
        assert_eq!(info.history.last().map(String::as_str), Some("acquired\tbench"));
        Ok(())
    }
}
