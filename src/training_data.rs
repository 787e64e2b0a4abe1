use crate::errors::{GprError, Result};
use ndarray::{s, Array2, ArrayBase, ArrayView2, Data, Ix1, Ix2};

/// Minimal number of rows allocated on first growth
const MIN_CAPACITY: usize = 8;

/// Append-only store of training samples with fixed input and output dimensions.
///
/// Samples are stored row-wise in buffers whose capacity doubles when full,
/// only the first `len()` rows are live.
#[derive(Clone, Debug)]
pub struct TrainingData {
    /// (capacity, input_dim) buffer
    inputs: Array2<f64>,
    /// (capacity, output_dim) buffer
    outputs: Array2<f64>,
    /// Number of live rows
    n_data: usize,
}

impl TrainingData {
    /// Create an empty store for `input_dim` inputs and `output_dim` outputs.
    /// Both dimensions have to be non zero.
    pub fn new(input_dim: usize, output_dim: usize) -> Result<Self> {
        if input_dim == 0 || output_dim == 0 {
            return Err(GprError::DimensionMismatch(format!(
                "input and output dimensions should be non zero, got ({input_dim}, {output_dim})"
            )));
        }
        Ok(TrainingData {
            inputs: Array2::zeros((0, input_dim)),
            outputs: Array2::zeros((0, output_dim)),
            n_data: 0,
        })
    }

    /// Number of training samples
    pub fn len(&self) -> usize {
        self.n_data
    }

    /// Whether no training sample is stored
    pub fn is_empty(&self) -> bool {
        self.n_data == 0
    }

    /// Input and output dimensions
    pub fn dims(&self) -> (usize, usize) {
        (self.inputs.ncols(), self.outputs.ncols())
    }

    /// Number of samples the store can hold before reallocating
    pub fn capacity(&self) -> usize {
        self.inputs.nrows()
    }

    /// Training inputs as a (n, input_dim) view
    pub fn inputs(&self) -> ArrayView2<f64> {
        self.inputs.slice(s![..self.n_data, ..])
    }

    /// Training outputs as a (n, output_dim) view
    pub fn outputs(&self) -> ArrayView2<f64> {
        self.outputs.slice(s![..self.n_data, ..])
    }

    /// Append one sample
    pub fn push(
        &mut self,
        input: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        output: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Result<()> {
        let (input_dim, output_dim) = self.dims();
        if input.len() != input_dim || output.len() != output_dim {
            return Err(GprError::DimensionMismatch(format!(
                "sample should be ({input_dim}, {output_dim}) sized, got ({}, {})",
                input.len(),
                output.len()
            )));
        }
        self.reserve(1);
        self.inputs.row_mut(self.n_data).assign(input);
        self.outputs.row_mut(self.n_data).assign(output);
        self.n_data += 1;
        Ok(())
    }

    /// Append samples given as (m, input_dim) inputs and (m, output_dim) outputs.
    /// Nothing is appended when shapes are inconsistent.
    pub fn append(
        &mut self,
        inputs: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        outputs: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ) -> Result<()> {
        if inputs.nrows() != outputs.nrows() {
            return Err(GprError::DimensionMismatch(format!(
                "inputs and outputs should have the same number of samples, got {} and {}",
                inputs.nrows(),
                outputs.nrows()
            )));
        }
        let (input_dim, output_dim) = self.dims();
        if inputs.ncols() != input_dim || outputs.ncols() != output_dim {
            return Err(GprError::DimensionMismatch(format!(
                "samples should be ({input_dim}, {output_dim}) sized, got ({}, {})",
                inputs.ncols(),
                outputs.ncols()
            )));
        }
        let m = inputs.nrows();
        self.reserve(m);
        let (start, end) = (self.n_data, self.n_data + m);
        self.inputs.slice_mut(s![start..end, ..]).assign(inputs);
        self.outputs.slice_mut(s![start..end, ..]).assign(outputs);
        self.n_data += m;
        Ok(())
    }

    /// Remove all samples, dimensions and allocated capacity are kept
    pub fn clear(&mut self) {
        self.n_data = 0;
    }

    /// Ensure room for `additional` more samples, growing capacity geometrically
    fn reserve(&mut self, additional: usize) {
        let required = self.n_data + additional;
        if required <= self.capacity() {
            return;
        }
        let capacity = required.max(2 * self.capacity()).max(MIN_CAPACITY);
        self.inputs = Self::regrow(&self.inputs, self.n_data, capacity);
        self.outputs = Self::regrow(&self.outputs, self.n_data, capacity);
    }

    fn regrow(buffer: &Array2<f64>, n_data: usize, capacity: usize) -> Array2<f64> {
        let mut grown = Array2::zeros((capacity, buffer.ncols()));
        grown
            .slice_mut(s![..n_data, ..])
            .assign(&buffer.slice(s![..n_data, ..]));
        grown
    }
}
