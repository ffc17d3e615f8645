use crate::{MlErr, Result};

/// Hands out consecutive chunks of a flat parameter slice, one per model component.
///
/// Components take their parameters in declaration order, so the same walk over a
/// `Sequential` or a `Block` always yields the same chunks.
pub struct ParamIter<'p> {
    rest: &'p [f32],
}

impl<'p> ParamIter<'p> {
    /// Creates a new `ParamIter`.
    ///
    /// # Arguments
    /// * `params` - The whole parameter slice.
    ///
    /// # Returns
    /// A new `ParamIter` instance.
    pub fn new(params: &'p [f32]) -> Self {
        Self { rest: params }
    }

    /// Takes the next `n` parameters.
    ///
    /// # Arguments
    /// * `n` - The amount of parameters to take.
    ///
    /// # Returns
    /// The parameter chunk or an error if there aren't `n` parameters left.
    pub fn take(&mut self, n: usize) -> Result<&'p [f32]> {
        if n > self.rest.len() {
            return Err(MlErr::SizeMismatch {
                what: "parameters",
                got: self.rest.len(),
                expected: n,
            });
        }

        let (head, tail) = self.rest.split_at(n);
        self.rest = tail;
        Ok(head)
    }
}

/// The mutable counterpart of `ParamIter`, used to walk a gradient buffer.
pub struct GradIter<'g> {
    rest: &'g mut [f32],
}

impl<'g> GradIter<'g> {
    /// Creates a new `GradIter`.
    ///
    /// # Arguments
    /// * `grad` - The whole gradient slice.
    ///
    /// # Returns
    /// A new `GradIter` instance.
    pub fn new(grad: &'g mut [f32]) -> Self {
        Self { rest: grad }
    }

    /// Takes the next `n` gradient entries.
    ///
    /// # Arguments
    /// * `n` - The amount of entries to take.
    ///
    /// # Returns
    /// The gradient chunk or an error if there aren't `n` entries left.
    pub fn take(&mut self, n: usize) -> Result<&'g mut [f32]> {
        if n > self.rest.len() {
            return Err(MlErr::SizeMismatch {
                what: "gradient",
                got: self.rest.len(),
                expected: n,
            });
        }

        let rest = std::mem::take(&mut self.rest);
        let (head, tail) = rest.split_at_mut(n);
        self.rest = tail;
        Ok(head)
    }
}
