//! Shape of the per-pixel tensor (the channel axis).

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How tensor elements are laid out along the channel axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TensorShape {
    ColVector,
    RowVector,
    ColMajorMatrix,
    RowMajorMatrix,
    DiagonalMatrix,
    SymmetricMatrix,
    UpperTriangularMatrix,
    LowerTriangularMatrix,
}

impl TensorShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            TensorShape::ColVector => "column vector",
            TensorShape::RowVector => "row vector",
            TensorShape::ColMajorMatrix => "column-major matrix",
            TensorShape::RowMajorMatrix => "row-major matrix",
            TensorShape::DiagonalMatrix => "diagonal matrix",
            TensorShape::SymmetricMatrix => "symmetric matrix",
            TensorShape::UpperTriangularMatrix => "upper triangular matrix",
            TensorShape::LowerTriangularMatrix => "lower triangular matrix",
        }
    }
}

impl FromStr for TensorShape {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        const ALL: [TensorShape; 8] = [
            TensorShape::ColVector,
            TensorShape::RowVector,
            TensorShape::ColMajorMatrix,
            TensorShape::RowMajorMatrix,
            TensorShape::DiagonalMatrix,
            TensorShape::SymmetricMatrix,
            TensorShape::UpperTriangularMatrix,
            TensorShape::LowerTriangularMatrix,
        ];
        ALL.into_iter()
            .find(|shape| shape.as_str() == s)
            .ok_or_else(|| Error::InvalidTensorShape(format!("unknown shape '{}'", s)))
    }
}

impl std::fmt::Display for TensorShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A 0-D, 1-D or 2-D tensor shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tensor {
    shape: TensorShape,
    elements: usize,
    rows: usize,
}

impl Default for Tensor {
    fn default() -> Self {
        Self::scalar()
    }
}

impl Tensor {
    pub fn scalar() -> Self {
        Self { shape: TensorShape::ColVector, elements: 1, rows: 1 }
    }

    pub fn vector(n: usize) -> Result<Self> {
        if n == 0 {
            return Err(Error::InvalidTensorShape("number of vector elements must be non-zero".into()));
        }
        Ok(Self { shape: TensorShape::ColVector, elements: n, rows: n })
    }

    pub fn matrix(rows: usize, columns: usize) -> Result<Self> {
        Self::new(TensorShape::ColMajorMatrix, rows, columns)
    }

    /// Builds a tensor of the given shape. Matrices with a single row or
    /// column become vectors.
    pub fn new(shape: TensorShape, rows: usize, columns: usize) -> Result<Self> {
        if rows == 0 || columns == 0 {
            return Err(Error::InvalidTensorShape("number of rows and columns must be non-zero".into()));
        }
        let square = |what: &str| {
            if rows == columns {
                Ok(())
            } else {
                Err(Error::InvalidTensorShape(format!("a {} must be square", what)))
            }
        };
        let tensor = match shape {
            TensorShape::ColVector => {
                if columns != 1 {
                    return Err(Error::InvalidTensorShape("a column vector can have only one column".into()));
                }
                Self { shape, elements: rows, rows }
            }
            TensorShape::RowVector => {
                if rows != 1 {
                    return Err(Error::InvalidTensorShape("a row vector can have only one row".into()));
                }
                Self { shape, elements: columns, rows: 1 }
            }
            TensorShape::ColMajorMatrix | TensorShape::RowMajorMatrix => {
                Self { shape, elements: rows.saturating_mul(columns), rows }.corrected()
            }
            TensorShape::DiagonalMatrix => {
                square("diagonal matrix")?;
                Self { shape, elements: rows, rows }
            }
            TensorShape::SymmetricMatrix => {
                square("symmetric matrix")?;
                Self { shape, elements: rows.saturating_mul(rows.saturating_add(1)) / 2, rows }
            }
            TensorShape::UpperTriangularMatrix | TensorShape::LowerTriangularMatrix => {
                square("triangular matrix")?;
                Self { shape, elements: rows.saturating_mul(rows.saturating_add(1)) / 2, rows }
            }
        };
        Ok(tensor)
    }

    fn corrected(mut self) -> Self {
        if self.rows == 1 {
            self.shape = TensorShape::RowVector;
        } else if self.rows == self.elements {
            self.shape = TensorShape::ColVector;
        }
        self
    }

    pub fn shape(&self) -> TensorShape {
        self.shape
    }

    pub fn elements(&self) -> usize {
        self.elements
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        match self.shape {
            TensorShape::ColVector => 1,
            TensorShape::RowVector => self.elements,
            TensorShape::ColMajorMatrix | TensorShape::RowMajorMatrix => self.elements / self.rows,
            _ => self.rows,
        }
    }

    pub fn is_scalar(&self) -> bool {
        self.elements == 1
    }

    /// Encodes as `"<shape>\t<rows>\t<columns>"`.
    pub fn to_descriptor(&self) -> String {
        format!("{}\t{}\t{}", self.shape, self.rows, self.columns())
    }

    /// Decodes the output of [`to_descriptor`](Tensor::to_descriptor).
    /// Fields past the third are ignored.
    pub fn from_descriptor(s: &str) -> Result<Self> {
        let mut fields = s.split('\t');
        let mut next = |what: &str| {
            fields
                .next()
                .ok_or_else(|| Error::InvalidTensorShape(format!("missing {} in '{}'", what, s)))
        };
        let shape: TensorShape = next("shape")?.parse()?;
        let rows = parse_count(next("rows")?)?;
        let columns = parse_count(next("columns")?)?;
        Self::new(shape, rows, columns)
    }
}

fn parse_count(s: &str) -> Result<usize> {
    s.trim()
        .parse()
        .map_err(|_| Error::InvalidTensorShape(format!("'{}' is not a count", s)))
}
