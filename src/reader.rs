//! ICS reading: header inspection and the read transfer engine.
//!
//! Samples are copied either in one block, when the destination can take
//! over the file layout, or one line at a time along the axis with the
//! smallest file stride. Lines are visited in increasing file offset, so
//! the file is never read backward.

use std::path::Path;

use tracing::{debug, trace, warn};

use crate::color::{ColorSpaceRegistry, KnownColorSpaces};
use crate::container::{IcsDataType, IcsHeader, IcsReader};
use crate::dims;
use crate::error::{Error, Result};
use crate::image::{Image, Layout, try_for_each_coordinate};
use crate::models::{DataType, FileInformation, PixelSize};
use crate::region::{Range, Region, normalize_channels, ranges_from_region};
use crate::tensor::Tensor;
use crate::units::{PhysicalQuantity, Units};
use crate::utils::dense_strides;

/// History key of the line that stores the tensor shape.
pub(crate) const TENSOR_HISTORY_KEY: &str = "tensor";

/// Options for reading pixel data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Read all samples in one block when the whole file is requested.
    pub fast: bool,
}

impl ReadOptions {
    /// Parses a mode string: `""` or `"fast"`.
    pub fn from_mode(mode: &str) -> Result<Self> {
        match mode {
            "" => Ok(Self { fast: false }),
            "fast" => Ok(Self { fast: true }),
            other => Err(Error::InvalidOption(other.to_string())),
        }
    }
}

/// Reads ICS files, resolving color-space axis names through a registry.
///
/// # Examples
///
/// ```no_run
/// use icsio::{IcsCodec, KnownColorSpaces, Range, ReadOptions};
///
/// let codec = IcsCodec::new(&KnownColorSpaces);
/// let info = codec.read_info("cells.ics")?;
/// println!("{:?} {}", info.sizes, info.data_type);
///
/// // every other pixel along x, all of y, first channel only
/// let mut image = icsio::Image::default();
/// codec.read_into(
///     &mut image,
///     "cells.ics",
///     &[Range::new(0, -1, 2), Range::default()],
///     Some(Range::single(0)),
///     ReadOptions::default(),
/// )?;
/// # Ok::<(), icsio::Error>(())
/// ```
#[derive(Clone, Copy)]
pub struct IcsCodec<'r> {
    registry: &'r dyn ColorSpaceRegistry,
}

impl Default for IcsCodec<'static> {
    fn default() -> Self {
        Self { registry: &KnownColorSpaces }
    }
}

impl std::fmt::Debug for IcsCodec<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IcsCodec").finish_non_exhaustive()
    }
}

/// Interpreted header of one open file.
#[derive(Debug, Clone)]
struct IcsInfo {
    file_info: FileInformation,
    /// Axis sizes in file order.
    file_sizes: Vec<usize>,
    /// Spatial axis `ii` of the image is file axis `order[ii]`.
    order: Vec<usize>,
    channel_axis: Option<usize>,
}

impl IcsInfo {
    fn file_strides(&self) -> (Vec<isize>, isize) {
        let file_strides = dense_strides(&self.file_sizes);
        let strides = self.order.iter().map(|&ii| file_strides[ii] as isize).collect();
        let tensor_stride = self.channel_axis.map_or(1, |c| file_strides[c] as isize);
        (strides, tensor_stride)
    }
}

fn map_data_type(data_type: IcsDataType, significant_bits: usize) -> DataType {
    match data_type {
        IcsDataType::Uint8 if significant_bits == 1 => DataType::Bin,
        IcsDataType::Uint8 => DataType::UInt8,
        IcsDataType::Sint8 => DataType::SInt8,
        IcsDataType::Uint16 => DataType::UInt16,
        IcsDataType::Sint16 => DataType::SInt16,
        IcsDataType::Uint32 => DataType::UInt32,
        IcsDataType::Sint32 => DataType::SInt32,
        IcsDataType::Real32 => DataType::SFloat,
        IcsDataType::Real64 => DataType::DFloat,
        IcsDataType::Complex32 => DataType::SComplex,
        IcsDataType::Complex64 => DataType::DComplex,
    }
}

fn pixel_quantity(scale: f64, units: &str) -> PhysicalQuantity {
    match Units::parse(units) {
        Ok(units) => PhysicalQuantity::new(scale, units),
        Err(e) => {
            warn!(units, error = %e, "unit string not understood, using a dimensionless pixel size");
            PhysicalQuantity::dimensionless(scale)
        }
    }
}

fn extract_info(ics: &IcsReader, registry: &dyn ColorSpaceRegistry) -> Result<IcsInfo> {
    let header: &IcsHeader = ics.header();
    if header.data_size() == usize::MAX {
        return Err(Error::HeaderParse("image sizes overflow".into()));
    }
    let file_sizes = header.sizes();
    let tags: Vec<&str> = header.dims.iter().map(|d| d.order.as_str()).collect();
    let semantics = dims::resolve(&tags, &file_sizes, registry)?;
    let found = semantics.channel.index;
    // a channel axis of size 1 stays in the image as its last spatial axis
    let channel_axis = found.filter(|&c| file_sizes[c] > 1);
    let mut order: Vec<usize> = semantics.order.into_iter().filter(|&ii| Some(ii) != found).collect();
    let mut color_space = semantics.channel.color_space;
    if let (Some(c), None) = (found, channel_axis) {
        debug!(axis = c, "channel axis has one element, keeping it as a spatial axis");
        order.push(c);
        color_space.clear();
    }

    let data_type = map_data_type(header.data_type, header.significant_bits);
    let max_bits = data_type.max_significant_bits();
    let significant_bits = match header.significant_bits {
        0 => max_bits,
        bits => bits.min(max_bits),
    };

    let pixel_size = PixelSize::new(
        order
            .iter()
            .map(|&ii| pixel_quantity(header.dims[ii].scale, &header.dims[ii].units))
            .collect(),
    );

    let file_info = FileInformation {
        name: ics.path().display().to_string(),
        file_type: "ICS".to_string(),
        number_of_images: 1,
        data_type,
        significant_bits,
        sizes: order.iter().map(|&ii| file_sizes[ii]).collect(),
        tensor_elements: channel_axis.map_or(1, |c| file_sizes[c]),
        color_space,
        pixel_size,
        history: header.history.clone(),
    };
    Ok(IcsInfo { file_info, file_sizes, order, channel_axis })
}

/// One axis of the generic transfer.
#[derive(Debug, Clone, Copy)]
struct LineAxis {
    count: usize,
    step: usize,
    file_stride: usize,
    dest_stride: isize,
}

/// Copies the requested samples line by line along the axis with the
/// smallest file stride.
fn read_lines(
    ics: &mut IcsReader,
    image: &mut Image,
    region: &Region,
    channels: Option<(&Range, isize)>,
    strides: &[isize],
) -> Result<()> {
    let sizeof = image.data_type().size_of();
    let mut base = 0usize;
    let mut axes = Vec::with_capacity(strides.len() + 1);
    for ((range, &stride), &dest_stride) in region.ranges.iter().zip(strides).zip(image.strides()) {
        base += range.offset() * stride as usize;
        axes.push(LineAxis { count: range.size(), step: range.step, file_stride: stride as usize, dest_stride });
    }
    if let Some((range, stride)) = channels {
        base += range.offset() * stride as usize;
        axes.push(LineAxis {
            count: range.size(),
            step: range.step,
            file_stride: stride as usize,
            dest_stride: image.tensor_stride(),
        });
    }

    // singleton axes only contribute to the base offset
    axes.retain(|a| a.count > 1);
    axes.sort_by_key(|a| a.file_stride);
    let processing = if axes.is_empty() {
        LineAxis { count: 1, step: 1, file_stride: 1, dest_stride: 0 }
    } else {
        axes.remove(0)
    };
    debug!(
        samples = processing.count,
        stride = processing.file_stride,
        outer_axes = axes.len(),
        "reading line by line"
    );

    let file_step = processing.step * processing.file_stride;
    let mut buffer = vec![0u8; ((processing.count - 1) * file_step + 1) * sizeof];
    let outer_sizes: Vec<usize> = axes.iter().map(|a| a.count).collect();
    let origin = image.layout().origin;
    let data = image.data_mut();
    let mut position = 0usize;

    try_for_each_coordinate(&outer_sizes, |coords| {
        let mut offset = base;
        let mut dest = origin;
        for (&c, axis) in coords.iter().zip(&axes) {
            offset += c * axis.step * axis.file_stride;
            dest += c as isize * axis.dest_stride;
        }
        let offset = offset * sizeof;
        if offset < position {
            return Err(Error::InternalConsistency(format!(
                "file offset moved backward from {} to {}",
                position, offset
            )));
        }
        trace!(offset, "reading line");
        ics.skip_data_block((offset - position) as u64)?;
        ics.read_data_block(&mut buffer)?;
        position = offset + buffer.len();

        for k in 0..processing.count {
            let src = k * file_step * sizeof;
            let dst = (dest + k as isize * processing.dest_stride) as usize * sizeof;
            data[dst..dst + sizeof].copy_from_slice(&buffer[src..src + sizeof]);
        }
        Ok(())
    })
}

fn restore_tensor_shape(image: &mut Image, history: &[String]) {
    let prefix = format!("{}\t", TENSOR_HISTORY_KEY);
    let Some(descriptor) = history.iter().find_map(|line| line.strip_prefix(prefix.as_str())) else {
        return;
    };
    match Tensor::from_descriptor(descriptor).and_then(|tensor| image.reshape_tensor(tensor)) {
        Ok(()) => debug!(descriptor, "restored tensor shape"),
        Err(e) => warn!(descriptor, error = %e, "ignoring tensor shape in history"),
    }
}

/// Reads the requested region of an open file into `image`.
fn transfer(
    ics: &mut IcsReader,
    info: &IcsInfo,
    image: &mut Image,
    request: &[Range],
    channels: Option<Range>,
    options: ReadOptions,
) -> Result<()> {
    let file_info = &info.file_info;
    let sizes = &file_info.sizes;
    let tensor_elements = file_info.tensor_elements;
    let data_type = file_info.data_type;

    let region = Region::normalize(request, sizes)?;
    let channels = normalize_channels(channels, tensor_elements)?;
    let all_channels = channels.start == 0 && channels.step == 1 && channels.size() == tensor_elements;
    let (strides, tensor_stride) = info.file_strides();

    let mut done = false;
    if options.fast && all_channels && region.is_full(sizes) {
        if image.is_forged()
            && (image.sizes() != sizes.as_slice()
                || image.tensor_elements() != tensor_elements
                || image.data_type() != data_type)
        {
            image.strip();
        }
        if !image.is_forged() {
            image.set_strides(strides.clone())?;
            image.set_tensor_stride(tensor_stride)?;
        }
        image.reforge(sizes, tensor_elements, data_type);

        let mut file_layout = Layout { sizes: sizes.clone(), strides: strides.clone(), origin: 0 };
        if tensor_elements > 1 {
            file_layout.sizes.push(tensor_elements);
            file_layout.strides.push(tensor_stride);
        }
        if image.layout_with_channels() == file_layout {
            debug!("reading all samples in one block");
            ics.read_data(image.data_mut())?;
            done = true;
        }
    } else {
        image.reforge(&region.sizes(), channels.size(), data_type);
    }
    if !done {
        let channel_axis = info.channel_axis.map(|_| (&channels, tensor_stride));
        read_lines(ics, image, &region, channel_axis, &strides)?;
    }

    image.mirror(&region.mirror);
    image.reshape_tensor(Tensor::vector(image.tensor_elements())?)?;
    if all_channels {
        image.set_color_space(file_info.color_space.clone());
        if tensor_elements > 1 {
            restore_tensor_shape(image, &file_info.history);
        }
    } else {
        image.set_color_space("");
    }
    image.set_pixel_size(file_info.pixel_size.clone());
    Ok(())
}

impl<'r> IcsCodec<'r> {
    pub fn new(registry: &'r dyn ColorSpaceRegistry) -> Self {
        Self { registry }
    }

    /// Reads the whole file into a new image.
    pub fn read(&self, path: impl AsRef<Path>, options: ReadOptions) -> Result<(Image, FileInformation)> {
        let mut image = Image::default();
        let info = self.read_into(&mut image, path, &[], None, options)?;
        Ok((image, info))
    }

    /// Reads a region of the file into `image`.
    ///
    /// `region` holds one range per image axis, a single range for all
    /// axes, or nothing for the whole image. `channels` selects a range of
    /// tensor elements. A reversed range reverses that axis of the result.
    ///
    /// `image` is reforged as needed. When `options.fast` is set and the
    /// whole file is requested, an unforged image takes over the file's
    /// strides so samples can be read in one block.
    pub fn read_into(
        &self,
        image: &mut Image,
        path: impl AsRef<Path>,
        region: &[Range],
        channels: Option<Range>,
        options: ReadOptions,
    ) -> Result<FileInformation> {
        let mut ics = IcsReader::open(path)?;
        let info = extract_info(&ics, self.registry)?;
        let result = transfer(&mut ics, &info, image, region, channels, options);
        let closed = ics.close();
        result?;
        closed?;
        Ok(info.file_info)
    }

    /// Reads a region given as origin, sizes and spacing arrays. Each array
    /// may be empty, hold one value for all axes, or one value per axis.
    #[allow(clippy::too_many_arguments)]
    pub fn read_region(
        &self,
        image: &mut Image,
        path: impl AsRef<Path>,
        origin: &[usize],
        sizes: &[usize],
        spacing: &[usize],
        channels: Option<Range>,
        options: ReadOptions,
    ) -> Result<FileInformation> {
        let path = path.as_ref();
        let info = self.read_info(path)?;
        let ranges = ranges_from_region(origin, sizes, spacing, &info.sizes)?;
        self.read_into(image, path, &ranges, channels, options)
    }

    /// Reads the header only.
    pub fn read_info(&self, path: impl AsRef<Path>) -> Result<FileInformation> {
        let mut ics = IcsReader::open(path)?;
        let info = extract_info(&ics, self.registry)?;
        ics.close()?;
        Ok(info.file_info)
    }

    /// True if `path` names an ICS file. Never fails.
    pub fn is_ics(path: impl AsRef<Path>) -> bool {
        IcsHeader::probe(path.as_ref()).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, header: &str, data: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(header.as_bytes()).unwrap();
        f.write_all(data).unwrap();
        path
    }

    #[test]
    fn test_read_options_from_mode() {
        assert_eq!(ReadOptions::from_mode("").unwrap(), ReadOptions { fast: false });
        assert_eq!(ReadOptions::from_mode("fast").unwrap(), ReadOptions { fast: true });
        assert!(matches!(ReadOptions::from_mode("quick"), Err(Error::InvalidOption(_))));
    }

    #[test]
    fn test_binary_from_significant_bits() {
        assert_eq!(map_data_type(IcsDataType::Uint8, 1), DataType::Bin);
        assert_eq!(map_data_type(IcsDataType::Uint8, 0), DataType::UInt8);
        assert_eq!(map_data_type(IcsDataType::Complex64, 0), DataType::DComplex);
    }

    #[test]
    fn test_big_endian_file_is_swapped() {
        let dir = tempfile::tempdir().unwrap();
        let header = "\t\nics_version\t2.0\nfilename\tbe\nlayout\tparameters\t3\nlayout\torder\tbits\tx\ty\n\
                      layout\tsizes\t16\t2\t2\nrepresentation\tformat\tinteger\nrepresentation\tsign\tunsigned\n\
                      representation\tcompression\tuncompressed\nrepresentation\tbyte_order\t2\t1\nend\n";
        let data = [0x01, 0x02, 0x00, 0x03, 0x10, 0x00, 0xff, 0xff];
        let path = write_file(dir.path(), "be.ics", header, &data);
        let (image, info) = IcsCodec::default().read(&path, ReadOptions::from_mode("fast").unwrap()).unwrap();
        assert_eq!(info.sizes, vec![2, 2]);
        assert_eq!(info.significant_bits, 16);
        assert_eq!(image.samples::<u16>().unwrap(), vec![0x0102, 0x0003, 0x1000, 0xffff]);
    }

    #[test]
    fn test_units_fall_back_to_dimensionless() {
        let dir = tempfile::tempdir().unwrap();
        let header = "\t\nics_version\t2.0\nlayout\torder\tbits\tx\ty\nlayout\tsizes\t8\t12\t12\n\
                      parameter\tscale\t1.0\t0.5\t2.0\nparameter\tunits\trelative\tfurlongs\tnm\nend\n";
        let path = write_file(dir.path(), "units.ics", header, &[0u8; 144]);
        let info = IcsCodec::default().read_info(&path).unwrap();
        assert_eq!(info.pixel_size.get(0), PhysicalQuantity::dimensionless(0.5));
        assert_eq!(info.pixel_size.get(1), PhysicalQuantity::new(2.0, Units::parse("nm").unwrap()));
        assert_eq!(info.significant_bits, 8);
    }

    #[test]
    fn test_significant_bits_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let header = "\t\nics_version\t2.0\nlayout\tsizes\t8\t11\nlayout\tsignificant_bits\t12\nend\n";
        let path = write_file(dir.path(), "bits.ics", header, &[0u8; 11]);
        let info = IcsCodec::default().read_info(&path).unwrap();
        assert_eq!(info.significant_bits, 8);
        assert_eq!(info.data_type, DataType::UInt8);
    }

    #[test]
    fn test_channel_axis_moved_last() {
        let dir = tempfile::tempdir().unwrap();
        // channel axis between an unnamed axis and x
        let header = "\t\nics_version\t2.0\nlayout\torder\tbits\tq\tRGB\tx\nlayout\tsizes\t8\t12\t3\t11\nend\n";
        let data: Vec<u8> = (0..=255).cycle().take(12 * 3 * 11).collect();
        let path = write_file(dir.path(), "rgb.ics", header, &data);
        let (image, info) = IcsCodec::default().read(&path, ReadOptions::default()).unwrap();
        assert_eq!(info.sizes, vec![11, 12]);
        assert_eq!(info.tensor_elements, 3);
        assert_eq!(info.color_space, "RGB");
        assert_eq!(image.sizes(), &[11, 12]);
        // file index = q + 12 * (c + 3 * x)
        let (x, q, c) = (4usize, 7usize, 2usize);
        assert_eq!(image.sample::<u8>(&[x, q], c).unwrap(), data[q + 12 * (c + 3 * x)]);
    }

    #[test]
    fn test_single_element_channel_axis_stays_spatial() {
        let dir = tempfile::tempdir().unwrap();
        let header = "\t\nics_version\t2.0\nlayout\torder\tbits\tx\tRGB\ty\nlayout\tsizes\t8\t4\t1\t3\nend\n";
        let data: Vec<u8> = (0..12).collect();
        let path = write_file(dir.path(), "one.ics", header, &data);
        let (image, info) = IcsCodec::default().read(&path, ReadOptions::default()).unwrap();
        assert_eq!(info.sizes, vec![4, 3, 1]);
        assert_eq!(info.tensor_elements, 1);
        assert_eq!(info.color_space, "");
        assert_eq!(info.pixel_size.len(), 3);
        assert_eq!(image.sizes(), &[4, 3, 1]);
        assert_eq!(image.sample::<u8>(&[2, 1, 0], 0).unwrap(), 6);
    }

    #[test]
    fn test_missing_file_is_not_ics() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!IcsCodec::is_ics(dir.path().join("none.ics")));
        let path = write_file(dir.path(), "text.ics", "hello world\n", &[]);
        assert!(!IcsCodec::is_ics(&path));
    }
}
