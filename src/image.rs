//! Strided tensor image.
//!
//! An [`Image`] owns its sample buffer and addresses it through an origin
//! and signed per-axis strides, all counted in samples. Mirroring and
//! permuting axes only rewrite strides; no samples move.

use byteorder::{ByteOrder, NativeEndian};

use crate::error::{Error, Result};
use crate::models::{DataType, PixelSize, Sample};
use crate::tensor::Tensor;
use crate::utils::{dense_strides, permute};

/// Sizes, strides and origin describing where samples live in a buffer.
///
/// This is the view the transfer engine manipulates: the channel axis can
/// be appended as a trailing axis, singleton axes removed, and axes
/// reordered, without touching the image itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub sizes: Vec<usize>,
    pub strides: Vec<isize>,
    pub origin: isize,
}

impl Layout {
    pub fn dimensionality(&self) -> usize {
        self.sizes.len()
    }

    pub fn number_of_samples(&self) -> usize {
        self.sizes.iter().product()
    }

    /// Offset in samples of the sample at `coords`.
    pub fn offset(&self, coords: &[usize]) -> isize {
        coords
            .iter()
            .zip(&self.strides)
            .fold(self.origin, |acc, (&c, &s)| acc + c as isize * s)
    }

    pub fn squeeze(&mut self, axis: usize) {
        self.sizes.remove(axis);
        self.strides.remove(axis);
    }

    pub fn permute(&mut self, order: &[usize]) {
        self.sizes = permute(&self.sizes, order);
        self.strides = permute(&self.strides, order);
    }

    pub fn has_positive_strides(&self) -> bool {
        self.strides.iter().all(|&s| s > 0)
    }

    /// True if the samples fill a block without gaps, in any axis order.
    pub fn has_contiguous_data(&self) -> bool {
        let mut axes: Vec<(usize, usize)> = self
            .sizes
            .iter()
            .zip(&self.strides)
            .filter(|&(&size, _)| size > 1)
            .map(|(&size, &stride)| (stride.unsigned_abs(), size))
            .collect();
        axes.sort();
        let mut expected = 1;
        for (stride, size) in axes {
            if stride != expected {
                return false;
            }
            expected *= size;
        }
        true
    }

    /// True if the strides are those of a dense array with the first axis
    /// varying fastest. Singleton axes are ignored.
    pub fn has_normal_strides(&self) -> bool {
        let mut expected = 1isize;
        for (&size, &stride) in self.sizes.iter().zip(&self.strides) {
            if size > 1 {
                if stride != expected {
                    return false;
                }
                expected *= size as isize;
            }
        }
        true
    }
}

/// An n-dimensional image whose pixels are tensors.
#[derive(Debug, Clone)]
pub struct Image {
    data: Vec<u8>,
    origin: isize,
    data_type: DataType,
    sizes: Vec<usize>,
    strides: Vec<isize>,
    tensor: Tensor,
    tensor_stride: isize,
    color_space: String,
    pixel_size: PixelSize,
    forged: bool,
}

impl Default for Image {
    /// A raw image: no sizes, no data.
    fn default() -> Self {
        Self {
            data: Vec::new(),
            origin: 0,
            data_type: DataType::UInt8,
            sizes: Vec::new(),
            strides: Vec::new(),
            tensor: Tensor::scalar(),
            tensor_stride: 1,
            color_space: String::new(),
            pixel_size: PixelSize::default(),
            forged: false,
        }
    }
}

impl Image {
    /// Allocates a zero-filled image with default strides: the channel axis
    /// varies fastest, then axis 0, axis 1, and so on.
    pub fn new(sizes: &[usize], tensor_elements: usize, data_type: DataType) -> Self {
        let mut image = Self::default();
        image.forge_new(sizes, tensor_elements.max(1), data_type);
        image
    }

    /// Builds an image from samples in default stride order.
    pub fn from_samples<T: Sample>(sizes: &[usize], tensor_elements: usize, samples: &[T]) -> Result<Self> {
        Self::from_bytes(sizes, tensor_elements, T::DATA_TYPE, bytemuck::cast_slice(samples).to_vec())
    }

    /// Builds an image from native-endian sample bytes in default stride order.
    pub fn from_bytes(sizes: &[usize], tensor_elements: usize, data_type: DataType, bytes: Vec<u8>) -> Result<Self> {
        let tensor_elements = tensor_elements.max(1);
        let expected = sizes.iter().product::<usize>() * tensor_elements * data_type.size_of();
        if bytes.len() != expected {
            return Err(Error::InvalidImage(format!(
                "expected {} bytes of {} samples, found {}",
                expected,
                data_type,
                bytes.len()
            )));
        }
        let mut image = Self::default();
        image.forge_new(sizes, tensor_elements, data_type);
        image.data = bytes;
        Ok(image)
    }

    fn forge_new(&mut self, sizes: &[usize], tensor_elements: usize, data_type: DataType) {
        self.sizes = sizes.to_vec();
        self.data_type = data_type;
        if self.tensor.elements() != tensor_elements {
            self.tensor = Tensor::vector(tensor_elements).unwrap_or_default();
        }
        self.forge();
    }

    /// Allocates the buffer, honoring strides set through
    /// [`set_strides`](Image::set_strides) if they fit the sizes.
    fn forge(&mut self) {
        let te = self.tensor.elements();
        if self.strides.len() != self.sizes.len() || self.tensor_stride == 0 {
            let mut all = vec![te];
            all.extend_from_slice(&self.sizes);
            let dense = dense_strides(&all);
            self.tensor_stride = 1;
            self.strides = dense[1..].iter().map(|&s| s as isize).collect();
        }
        let mut lowest = 0isize;
        let mut highest = 0isize;
        let extents = self
            .sizes
            .iter()
            .zip(&self.strides)
            .chain(std::iter::once((&te, &self.tensor_stride)));
        for (&size, &stride) in extents {
            let reach = (size.max(1) as isize - 1) * stride;
            if reach < 0 {
                lowest += reach;
            } else {
                highest += reach;
            }
        }
        self.origin = -lowest;
        let span = (highest - lowest + 1) as usize;
        self.data = vec![0u8; span * self.data_type.size_of()];
        self.forged = true;
    }

    pub fn is_forged(&self) -> bool {
        self.forged
    }

    /// Releases the sample buffer; sizes and metadata are kept.
    pub fn strip(&mut self) {
        self.data = Vec::new();
        self.strides.clear();
        self.tensor_stride = 1;
        self.origin = 0;
        self.forged = false;
    }

    /// Sets the strides to use when the image is next forged.
    pub fn set_strides(&mut self, strides: Vec<isize>) -> Result<()> {
        if self.forged {
            return Err(Error::InvalidImage("cannot change strides of a forged image".into()));
        }
        self.strides = strides;
        Ok(())
    }

    pub fn set_tensor_stride(&mut self, stride: isize) -> Result<()> {
        if self.forged {
            return Err(Error::InvalidImage("cannot change strides of a forged image".into()));
        }
        self.tensor_stride = stride;
        Ok(())
    }

    /// Makes the image forged with the given properties, reusing the buffer
    /// if it already matches.
    pub fn reforge(&mut self, sizes: &[usize], tensor_elements: usize, data_type: DataType) {
        let tensor_elements = tensor_elements.max(1);
        if self.forged
            && self.sizes == sizes
            && self.tensor.elements() == tensor_elements
            && self.data_type == data_type
        {
            return;
        }
        if self.forged {
            self.strip();
        }
        self.forge_new(sizes, tensor_elements, data_type);
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    pub fn tensor_stride(&self) -> isize {
        self.tensor_stride
    }

    pub fn dimensionality(&self) -> usize {
        self.sizes.len()
    }

    pub fn number_of_pixels(&self) -> usize {
        self.sizes.iter().product()
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    pub fn tensor_elements(&self) -> usize {
        self.tensor.elements()
    }

    /// Changes the tensor shape; the number of elements must not change.
    pub fn reshape_tensor(&mut self, tensor: Tensor) -> Result<()> {
        if tensor.elements() != self.tensor.elements() {
            return Err(Error::InvalidTensorShape(format!(
                "cannot reshape {} elements into {}",
                self.tensor.elements(),
                tensor.to_descriptor()
            )));
        }
        self.tensor = tensor;
        Ok(())
    }

    pub fn color_space(&self) -> &str {
        &self.color_space
    }

    pub fn set_color_space(&mut self, color_space: impl Into<String>) {
        self.color_space = color_space.into();
    }

    pub fn is_color(&self) -> bool {
        !self.color_space.is_empty()
    }

    pub fn pixel_size(&self) -> &PixelSize {
        &self.pixel_size
    }

    pub fn set_pixel_size(&mut self, pixel_size: PixelSize) {
        self.pixel_size = pixel_size;
    }

    /// Reverses the axes flagged in `mirror`.
    pub fn mirror(&mut self, mirror: &[bool]) {
        for (ii, _) in mirror.iter().enumerate().filter(|&(_, &m)| m) {
            if let (Some(&size), Some(stride)) = (self.sizes.get(ii), self.strides.get_mut(ii)) {
                self.origin += (size as isize - 1) * *stride;
                *stride = -*stride;
            }
        }
    }

    /// Reorders the spatial axes: new axis `ii` is old axis `order[ii]`.
    pub fn permute_dimensions(&mut self, order: &[usize]) -> Result<()> {
        crate::dims::check_permutation(order, self.sizes.len())
            .map_err(|_| Error::InvalidImage(format!("{:?} is not an axis permutation", order)))?;
        self.sizes = permute(&self.sizes, order);
        self.strides = permute(&self.strides, order);
        if self.pixel_size.is_defined() {
            let quantities: Vec<_> = order.iter().map(|&ii| self.pixel_size.get(ii)).collect();
            self.pixel_size = PixelSize::new(quantities);
        }
        Ok(())
    }

    /// Spatial layout of the image.
    pub fn layout(&self) -> Layout {
        Layout { sizes: self.sizes.clone(), strides: self.strides.clone(), origin: self.origin }
    }

    /// Spatial layout with the channel axis appended as the last axis when
    /// there is more than one channel.
    pub fn layout_with_channels(&self) -> Layout {
        let mut layout = self.layout();
        if self.tensor.elements() > 1 {
            layout.sizes.push(self.tensor.elements());
            layout.strides.push(self.tensor_stride);
        }
        layout
    }

    pub(crate) fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn sample_offset(&self, coords: &[usize], element: usize) -> Result<usize> {
        if !self.forged {
            return Err(Error::InvalidImage("image is not forged".into()));
        }
        if coords.len() != self.sizes.len() {
            return Err(Error::ArraySizeMismatch { expected: self.sizes.len(), found: coords.len() });
        }
        if element >= self.tensor.elements() {
            return Err(Error::IndexOutOfRange { index: element as isize, size: self.tensor.elements() });
        }
        for (&c, &size) in coords.iter().zip(&self.sizes) {
            if c >= size {
                return Err(Error::IndexOutOfRange { index: c as isize, size });
            }
        }
        let offset = self.layout().offset(coords) + element as isize * self.tensor_stride;
        Ok(offset as usize * self.data_type.size_of())
    }

    /// Native-endian bytes of one tensor element of the pixel at `coords`.
    pub fn sample_bytes(&self, coords: &[usize], element: usize) -> Result<&[u8]> {
        let start = self.sample_offset(coords, element)?;
        Ok(&self.data[start..start + self.data_type.size_of()])
    }

    pub fn sample<T: Sample>(&self, coords: &[usize], element: usize) -> Result<T> {
        self.check_type::<T>()?;
        Ok(bytemuck::pod_read_unaligned(self.sample_bytes(coords, element)?))
    }

    /// Value of a sample converted to `f64`; complex samples yield their real part.
    pub fn sample_as_f64(&self, coords: &[usize], element: usize) -> Result<f64> {
        let b = self.sample_bytes(coords, element)?;
        Ok(match self.data_type {
            DataType::Bin | DataType::UInt8 => b[0] as f64,
            DataType::SInt8 => b[0] as i8 as f64,
            DataType::UInt16 => NativeEndian::read_u16(b) as f64,
            DataType::SInt16 => NativeEndian::read_i16(b) as f64,
            DataType::UInt32 => NativeEndian::read_u32(b) as f64,
            DataType::SInt32 => NativeEndian::read_i32(b) as f64,
            DataType::SFloat | DataType::SComplex => NativeEndian::read_f32(b) as f64,
            DataType::DFloat | DataType::DComplex => NativeEndian::read_f64(b),
        })
    }

    /// All samples, channel varying fastest, then axis 0, axis 1, ...
    pub fn samples<T: Sample>(&self) -> Result<Vec<T>> {
        self.check_type::<T>()?;
        let mut out = Vec::with_capacity(self.number_of_pixels() * self.tensor_elements());
        let sizeof = self.data_type.size_of();
        let layout = self.layout();
        for_each_coordinate(&self.sizes, |coords| {
            let base = layout.offset(coords);
            for t in 0..self.tensor.elements() {
                let start = (base + t as isize * self.tensor_stride) as usize * sizeof;
                out.push(bytemuck::pod_read_unaligned(&self.data[start..start + sizeof]));
            }
        });
        Ok(out)
    }

    fn check_type<T: Sample>(&self) -> Result<()> {
        let matches = T::DATA_TYPE == self.data_type
            || (self.data_type == DataType::Bin && T::DATA_TYPE == DataType::UInt8);
        if matches {
            Ok(())
        } else {
            Err(Error::InvalidImage(format!(
                "requested {} samples from a {} image",
                T::DATA_TYPE,
                self.data_type
            )))
        }
    }
}

/// Visits every coordinate of `sizes`, axis 0 varying fastest.
pub(crate) fn for_each_coordinate(sizes: &[usize], mut f: impl FnMut(&[usize])) {
    let _ = try_for_each_coordinate::<()>(sizes, |coords| {
        f(coords);
        Ok(())
    });
}

/// Like [`for_each_coordinate`], stopping at the first error.
pub(crate) fn try_for_each_coordinate<E>(
    sizes: &[usize],
    mut f: impl FnMut(&[usize]) -> std::result::Result<(), E>,
) -> std::result::Result<(), E> {
    if sizes.iter().any(|&s| s == 0) {
        return Ok(());
    }
    let mut coords = vec![0usize; sizes.len()];
    loop {
        f(&coords)?;
        let mut axis = 0;
        loop {
            if axis == sizes.len() {
                return Ok(());
            }
            coords[axis] += 1;
            if coords[axis] < sizes[axis] {
                break;
            }
            coords[axis] = 0;
            axis += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_strides_interleave_channels() {
        let img = Image::new(&[4, 3], 3, DataType::UInt16);
        assert_eq!(img.strides(), &[3, 12]);
        assert_eq!(img.tensor_stride(), 1);
        assert_eq!(img.data().len(), 4 * 3 * 3 * 2);
        assert_eq!(img.layout_with_channels().sizes, vec![4, 3, 3]);
    }

    #[test]
    fn test_samples_round_trip() {
        let data: Vec<u16> = (0..24).collect();
        let img = Image::from_samples(&[4, 2], 3, &data).unwrap();
        assert_eq!(img.samples::<u16>().unwrap(), data);
        assert_eq!(img.sample::<u16>(&[1, 1], 2).unwrap(), 3 * 5 + 2);
        assert!(img.samples::<f32>().is_err());
    }

    #[test]
    fn test_mirror_reverses_axis() {
        let data: Vec<u8> = (0..6).collect();
        let mut img = Image::from_samples(&[3, 2], 1, &data).unwrap();
        img.mirror(&[true, false]);
        assert_eq!(img.samples::<u8>().unwrap(), vec![2, 1, 0, 5, 4, 3]);
        img.mirror(&[false, true]);
        assert_eq!(img.samples::<u8>().unwrap(), vec![5, 4, 3, 2, 1, 0]);
    }

    #[test]
    fn test_forge_with_requested_strides() {
        let mut img = Image::default();
        img.set_strides(vec![2, 1]).unwrap();
        img.reforge(&[3, 2], 1, DataType::SFloat);
        assert_eq!(img.strides(), &[2, 1]);
        assert!(img.set_strides(vec![1, 3]).is_err());
    }

    #[test]
    fn test_reforge_keeps_matching_buffer() {
        let data: Vec<i32> = (0..6).collect();
        let mut img = Image::from_samples(&[3, 2], 1, &data).unwrap();
        img.reforge(&[3, 2], 1, DataType::SInt32);
        assert_eq!(img.samples::<i32>().unwrap(), data);
        img.reforge(&[2, 2], 1, DataType::SInt32);
        assert_eq!(img.samples::<i32>().unwrap(), vec![0; 4]);
    }

    #[test]
    fn test_layout_predicates() {
        let img = Image::new(&[4, 5], 3, DataType::UInt8);
        let layout = img.layout_with_channels();
        assert!(layout.has_contiguous_data());
        assert!(!layout.has_normal_strides());
        let mut permuted = layout.clone();
        permuted.permute(&[2, 0, 1]);
        assert!(permuted.has_normal_strides());

        let mut mirrored = img.clone();
        mirrored.mirror(&[true, false]);
        assert!(!mirrored.layout().has_positive_strides());
        assert!(mirrored.layout_with_channels().has_contiguous_data());

        let cropped = Layout { sizes: vec![2, 2], strides: vec![1, 4], origin: 0 };
        assert!(!cropped.has_contiguous_data());
    }

    #[test]
    fn test_sample_as_f64() {
        let img = Image::from_samples(&[2], 1, &[-3i16, 7]).unwrap();
        assert_eq!(img.sample_as_f64(&[0], 0).unwrap(), -3.0);
        let img = Image::from_samples(&[1], 1, &[[1.5f32, -2.0]]).unwrap();
        assert_eq!(img.sample_as_f64(&[0], 0).unwrap(), 1.5);
    }

    #[test]
    fn test_for_each_coordinate_order() {
        let mut seen = Vec::new();
        for_each_coordinate(&[2, 2], |c| seen.push(c.to_vec()));
        assert_eq!(seen, vec![vec![0, 0], vec![1, 0], vec![0, 1], vec![1, 1]]);
        let mut count = 0;
        for_each_coordinate(&[], |_| count += 1);
        assert_eq!(count, 1);
    }
}
