//! ICS writing.

use std::path::Path;

use tracing::{debug, warn};

use crate::container::{Compression, IcsDataType, IcsVersion, IcsWriter};
use crate::error::{Error, Result};
use crate::image::Image;
use crate::models::DataType;
use crate::reader::TENSOR_HISTORY_KEY;
use crate::utils::{permute, sorted_indices};

/// Value of the `software` history line.
const SOFTWARE: &str = concat!("icsio ", env!("CARGO_PKG_VERSION"));

/// Options for writing an ICS file.
///
/// # Examples
///
/// ```
/// use icsio::{Compression, IcsVersion, WriteOptions};
///
/// let options = WriteOptions::from_flags(&["v1", "uncompressed"])?;
/// assert_eq!(options.version, IcsVersion::V1);
///
/// let options = WriteOptions::default().compression(Compression::Gzip).fast(true);
/// assert!(options.fast);
/// # Ok::<(), icsio::Error>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    pub version: IcsVersion,
    pub compression: Compression,
    /// Write the samples in one block, reordering the file axes to match
    /// the image's memory layout.
    pub fast: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self { version: IcsVersion::V2, compression: Compression::Gzip, fast: false }
    }
}

impl WriteOptions {
    /// Parses option flags: `v1`/`v2`, `uncompressed`/`gzip` and `fast`.
    pub fn from_flags<S: AsRef<str>>(flags: &[S]) -> Result<Self> {
        let mut options = Self::default();
        for flag in flags {
            match flag.as_ref() {
                "v1" => options.version = IcsVersion::V1,
                "v2" => options.version = IcsVersion::V2,
                "uncompressed" => options.compression = Compression::Uncompressed,
                "gzip" => options.compression = Compression::Gzip,
                "fast" => options.fast = true,
                other => return Err(Error::InvalidOption(other.to_string())),
            }
        }
        Ok(options)
    }

    pub fn version(mut self, version: IcsVersion) -> Self {
        self.version = version;
        self
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn fast(mut self, fast: bool) -> Self {
        self.fast = fast;
        self
    }
}

fn map_data_type(data_type: DataType) -> IcsDataType {
    match data_type {
        DataType::Bin | DataType::UInt8 => IcsDataType::Uint8,
        DataType::SInt8 => IcsDataType::Sint8,
        DataType::UInt16 => IcsDataType::Uint16,
        DataType::SInt16 => IcsDataType::Sint16,
        DataType::UInt32 => IcsDataType::Uint32,
        DataType::SInt32 => IcsDataType::Sint32,
        DataType::SFloat => IcsDataType::Real32,
        DataType::DFloat => IcsDataType::Real64,
        DataType::SComplex => IcsDataType::Complex32,
        DataType::DComplex => IcsDataType::Complex64,
    }
}

/// Writes `image` to `<path>.ics` (and `<path>.ids` for version 1).
///
/// An image with more than one tensor element gets its channels as an
/// extra last axis, tagged with the color space or `tensor`. Caller
/// `history` lines that are too long or contain line breaks are dropped.
/// `significant_bits` of 0 means the full width of the sample type.
pub fn write_ics(
    image: &Image,
    path: impl AsRef<Path>,
    history: &[String],
    significant_bits: usize,
    options: &WriteOptions,
) -> Result<()> {
    if !image.is_forged() {
        return Err(Error::InvalidImage("image is not forged".into()));
    }
    let data_type = image.data_type();
    let max_bits = data_type.max_significant_bits();
    let significant_bits = match significant_bits {
        0 => max_bits,
        bits => bits.min(max_bits),
    };

    let mut layout = image.layout_with_channels();
    let n_spatial = image.dimensionality();
    let has_channels = image.tensor_elements() > 1;
    let n_dims = layout.dimensionality();

    let mut ics = IcsWriter::create(path, options.version)?;
    ics.set_compression(options.compression);
    ics.set_layout(map_data_type(data_type), &layout.sizes);
    ics.set_significant_bits(significant_bits);

    if n_dims >= 5 {
        // default tag `probe` would read back as a channel axis
        ics.set_order(4, "dim_4")?;
    }
    if has_channels {
        let tag = if image.is_color() { image.color_space() } else { TENSOR_HISTORY_KEY };
        ics.set_order(n_dims - 1, tag)?;
    }

    if image.pixel_size().is_defined() {
        for ii in 0..n_spatial {
            let q = image.pixel_size().get(ii);
            ics.set_position(ii, 0.0, q.magnitude, Some(q.units.as_str()))?;
        }
    }
    if has_channels {
        ics.set_position(n_dims - 1, 0.0, 1.0, None)?;
        ics.add_history(Some(TENSOR_HISTORY_KEY), &image.tensor().to_descriptor())?;
    }

    let sizeof = data_type.size_of();
    let mut strided = true;
    if options.fast && layout.has_contiguous_data() && layout.has_positive_strides() {
        let order = sorted_indices(&layout.strides);
        layout.permute(&order);
        let dims = permute(ics.dims_mut(), &order);
        *ics.dims_mut() = dims;
        if layout.has_normal_strides() {
            debug!(?order, "writing all samples in one block");
            let start = layout.origin as usize * sizeof;
            let end = start + layout.number_of_samples() * sizeof;
            ics.set_data(&image.data()[start..end])?;
            strided = false;
        }
    }
    if strided {
        debug!(strides = ?layout.strides, "writing through strides");
        ics.set_data_with_strides(image.data(), layout, sizeof)?;
    }

    ics.add_history(Some("software"), SOFTWARE)?;
    for line in history {
        match ics.add_history(None, line) {
            Ok(()) => {}
            Err(e @ (Error::HistoryLineTooLong { .. } | Error::HistoryLineIllegal)) => {
                warn!(error = %e, "dropping history line");
            }
            Err(e) => return Err(e),
        }
    }
    ics.close()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::IcsReader;

    #[test]
    fn test_from_flags() {
        let options = WriteOptions::from_flags::<&str>(&[]).unwrap();
        assert_eq!(options, WriteOptions::default());
        let options = WriteOptions::from_flags(&["v1", "uncompressed", "fast"]).unwrap();
        assert_eq!(
            options,
            WriteOptions { version: IcsVersion::V1, compression: Compression::Uncompressed, fast: true }
        );
        assert!(matches!(WriteOptions::from_flags(&["compress"]), Err(Error::InvalidOption(s)) if s == "compress"));
    }

    #[test]
    fn test_header_tags_for_color_image() {
        let dir = tempfile::tempdir().unwrap();
        let mut image = Image::new(&[12, 11], 3, DataType::UInt8);
        image.set_color_space("RGB");
        let path = dir.path().join("rgb");
        write_ics(&image, &path, &[], 0, &WriteOptions::default()).unwrap();

        let ics = IcsReader::open(&path).unwrap();
        let header = ics.header();
        let tags: Vec<&str> = header.dims.iter().map(|d| d.order.as_str()).collect();
        assert_eq!(tags, vec!["x", "y", "RGB"]);
        assert_eq!(header.significant_bits, 8);
        assert_eq!(header.history[0], "tensor\tcolumn vector\t3\t1");
        assert!(header.history[1].starts_with("software\ticsio "));
    }

    #[test]
    fn test_fast_write_reorders_axes() {
        let dir = tempfile::tempdir().unwrap();
        let image = Image::new(&[12, 11], 3, DataType::UInt16);
        let path = dir.path().join("fast.ics");
        write_ics(&image, &path, &[], 0, &WriteOptions::default().fast(true)).unwrap();

        let ics = IcsReader::open(&path).unwrap();
        let tags: Vec<&str> = ics.header().dims.iter().map(|d| d.order.as_str()).collect();
        assert_eq!(tags, vec!["tensor", "x", "y"]);
        assert_eq!(ics.header().sizes(), vec![3, 12, 11]);
    }

    #[test]
    fn test_fifth_axis_tagged_numbered() {
        let dir = tempfile::tempdir().unwrap();
        let image = Image::new(&[11, 11, 11, 11, 11], 1, DataType::UInt8);
        let path = dir.path().join("five");
        write_ics(&image, &path, &[], 3, &WriteOptions::from_flags(&["uncompressed"]).unwrap()).unwrap();
        let ics = IcsReader::open(&path).unwrap();
        let tags: Vec<&str> = ics.header().dims.iter().map(|d| d.order.as_str()).collect();
        assert_eq!(tags, vec!["x", "y", "z", "t", "dim_4"]);
        assert_eq!(ics.header().significant_bits, 3);
    }

    #[test]
    fn test_unforged_image_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = write_ics(&Image::default(), dir.path().join("x"), &[], 0, &WriteOptions::default());
        assert!(matches!(result, Err(Error::InvalidImage(_))));
    }
}
