//! Lightweight wrapper for buffer shapes and dimension bookkeeping.

use std::fmt;

use crate::error::{ArenaError, ArenaResult};

/// Stores the logical dimensions of a buffer.
///
/// A shape with no dimensions describes a scalar holding exactly one element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Constructs a new shape from the provided dimensions.
    ///
    /// Panics if any dimension is zero; see [`Shape::try_new`].
    pub fn new<D: Into<Vec<usize>>>(dims: D) -> Self {
        match Self::try_new(dims) {
            Ok(shape) => shape,
            Err(err) => panic!("{err}"),
        }
    }

    /// Fallible counterpart of [`Shape::new`].
    pub fn try_new<D: Into<Vec<usize>>>(dims: D) -> ArenaResult<Self> {
        let shape = Shape { dims: dims.into() };
        shape.validate()?;
        Ok(shape)
    }

    /// Fails with [`ArenaError::InvalidShape`] if any dimension is zero.
    ///
    /// The `From` conversions do not check; `Buffer::new` does.
    pub fn validate(&self) -> ArenaResult<()> {
        if self.dims.iter().all(|&dim| dim > 0) {
            Ok(())
        } else {
            Err(ArenaError::InvalidShape {
                dims: self.dims.clone(),
            })
        }
    }

    /// Shape of a rank-0 buffer.
    pub fn scalar() -> Self {
        Shape { dims: Vec::new() }
    }

    /// Borrow the raw dimension slice for downstream calculations.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Returns the rank (number of axes) of the shape.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// Computes the total number of elements implied by the shape.
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape { dims }
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape {
            dims: dims.to_vec(),
        }
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Shape {
            dims: dims.to_vec(),
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.dims)
    }
}

#[cfg(test)]
mod tests {
    use super::Shape;
    use crate::error::ArenaError;

    #[test]
    fn scalar_has_one_element() {
        let shape = Shape::scalar();
        assert_eq!(shape.rank(), 0);
        assert_eq!(shape.num_elements(), 1);
        assert_eq!(shape.to_string(), "[]");
    }

    #[test]
    fn element_count_is_product_of_dims() {
        let shape = Shape::from([2, 3, 4]);
        assert_eq!(shape.rank(), 3);
        assert_eq!(shape.num_elements(), 24);
        assert_eq!(shape.to_string(), "[2, 3, 4]");
    }

    #[test]
    #[should_panic(expected = "shape dimensions must be positive")]
    fn zero_dimension_is_rejected() {
        let _ = Shape::new(vec![2, 0]);
    }

    #[test]
    fn try_new_reports_zero_dimension() {
        assert_eq!(
            Shape::try_new(vec![3, 0]),
            Err(ArenaError::InvalidShape { dims: vec![3, 0] })
        );
        assert!(Shape::from([3, 0]).validate().is_err());
        assert!(Shape::try_new(vec![3, 1]).is_ok());
    }
}
