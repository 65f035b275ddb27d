//! Sample types and the file metadata reported by the reader.

use serde::{Deserialize, Serialize};

use crate::units::PhysicalQuantity;

/// Sample data types an ICS image can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Binary, stored as one `u8` per sample with one significant bit.
    Bin,
    UInt8,
    UInt16,
    UInt32,
    SInt8,
    SInt16,
    SInt32,
    SFloat,
    DFloat,
    /// Complex with `f32` components.
    SComplex,
    /// Complex with `f64` components.
    DComplex,
}

impl DataType {
    /// Bytes per sample.
    pub fn size_of(&self) -> usize {
        match self {
            DataType::Bin | DataType::UInt8 | DataType::SInt8 => 1,
            DataType::UInt16 | DataType::SInt16 => 2,
            DataType::UInt32 | DataType::SInt32 | DataType::SFloat => 4,
            DataType::DFloat | DataType::SComplex => 8,
            DataType::DComplex => 16,
        }
    }

    /// Bytes per scalar component; complex samples hold two components.
    pub fn component_size(&self) -> usize {
        if self.is_complex() {
            self.size_of() / 2
        } else {
            self.size_of()
        }
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, DataType::SComplex | DataType::DComplex)
    }

    /// Number of significant bits a sample of this type can hold.
    pub fn max_significant_bits(&self) -> usize {
        match self {
            DataType::Bin => 1,
            DataType::SComplex => 32,
            DataType::DComplex => 64,
            other => other.size_of() * 8,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DataType::Bin => "bin",
            DataType::UInt8 => "uint8",
            DataType::UInt16 => "uint16",
            DataType::UInt32 => "uint32",
            DataType::SInt8 => "sint8",
            DataType::SInt16 => "sint16",
            DataType::SInt32 => "sint32",
            DataType::SFloat => "sfloat",
            DataType::DFloat => "dfloat",
            DataType::SComplex => "scomplex",
            DataType::DComplex => "dcomplex",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Element types that can be stored in an [`Image`](crate::Image).
pub trait Sample: bytemuck::Pod {
    const DATA_TYPE: DataType;
}

macro_rules! impl_sample {
    ($t:ty, $d:path) => {
        impl Sample for $t {
            const DATA_TYPE: DataType = $d;
        }
    };
}

impl_sample!(u8, DataType::UInt8);
impl_sample!(u16, DataType::UInt16);
impl_sample!(u32, DataType::UInt32);
impl_sample!(i8, DataType::SInt8);
impl_sample!(i16, DataType::SInt16);
impl_sample!(i32, DataType::SInt32);
impl_sample!(f32, DataType::SFloat);
impl_sample!(f64, DataType::DFloat);
impl_sample!([f32; 2], DataType::SComplex);
impl_sample!([f64; 2], DataType::DComplex);

/// Physical size of a pixel along each axis.
///
/// Axes beyond the stored entries repeat the last one, and an empty pixel
/// size is undefined (every axis is one dimensionless unit).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PixelSize {
    sizes: Vec<PhysicalQuantity>,
}

impl PixelSize {
    pub fn new(sizes: Vec<PhysicalQuantity>) -> Self {
        Self { sizes }
    }

    pub fn get(&self, axis: usize) -> PhysicalQuantity {
        match self.sizes.get(axis).or(self.sizes.last()) {
            Some(q) => q.clone(),
            None => PhysicalQuantity::pixel(),
        }
    }

    pub fn set(&mut self, axis: usize, quantity: PhysicalQuantity) {
        if axis >= self.sizes.len() {
            let fill = self.get(axis);
            self.sizes.resize(axis + 1, fill);
        }
        self.sizes[axis] = quantity;
    }

    /// True if any axis carries a size other than one dimensionless unit.
    pub fn is_defined(&self) -> bool {
        self.sizes.iter().any(|q| !q.is_pixel())
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    pub fn truncate(&mut self, len: usize) {
        self.sizes.truncate(len);
    }

    pub fn as_slice(&self) -> &[PhysicalQuantity] {
        &self.sizes
    }
}

/// Header information of an ICS file, in canonical axis order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInformation {
    /// Name of the header file that was opened.
    pub name: String,
    pub file_type: String,
    pub number_of_images: usize,
    pub data_type: DataType,
    pub significant_bits: usize,
    /// Spatial sizes in canonical order; the channel axis is not included.
    pub sizes: Vec<usize>,
    pub tensor_elements: usize,
    /// Color space of the channel axis, empty if none.
    pub color_space: String,
    pub pixel_size: PixelSize,
    pub history: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Units;

    #[test]
    fn test_data_type_sizes() {
        assert_eq!(DataType::Bin.size_of(), 1);
        assert_eq!(DataType::SComplex.size_of(), 8);
        assert_eq!(DataType::SComplex.component_size(), 4);
        assert_eq!(DataType::DComplex.max_significant_bits(), 64);
        assert_eq!(DataType::UInt16.max_significant_bits(), 16);
        assert_eq!(<[f64; 2] as Sample>::DATA_TYPE, DataType::DComplex);
    }

    #[test]
    fn test_pixel_size_repeats_last() {
        let mut ps = PixelSize::default();
        assert!(!ps.is_defined());
        let um = PhysicalQuantity::new(0.5, Units::parse("um").unwrap());
        ps.set(1, um.clone());
        assert_eq!(ps.len(), 2);
        assert!(ps.get(0).is_pixel());
        assert_eq!(ps.get(5), um);
        assert!(ps.is_defined());
    }
}
