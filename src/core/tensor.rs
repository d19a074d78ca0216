// Copyright (C) 2024 Bellande Artificial Intelligence Computer Vision Research Innovation Center, Ronaldson Bellande

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use crate::core::error::BellandeError;

/// Dense row-major `f32` tensor produced by the transform pipelines.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    pub data: Vec<f32>,
    pub shape: Vec<usize>,
}

impl Tensor {
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Self {
        let size: usize = shape.iter().product();
        assert_eq!(data.len(), size, "Data size does not match shape");

        Tensor { data, shape }
    }

    pub fn from_shape_vec(data: Vec<f32>, shape: Vec<usize>) -> Result<Self, BellandeError> {
        let size: usize = shape.iter().product();
        if data.len() != size {
            return Err(BellandeError::ShapeMismatch(format!(
                "{} elements cannot fill shape {:?}",
                data.len(),
                shape
            )));
        }

        Ok(Tensor { data, shape })
    }

    pub fn zeros(shape: &[usize]) -> Self {
        let size = shape.iter().product();
        Tensor::new(vec![0.0; size], shape.to_vec())
    }

    // Data access methods
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    // Calculate stride for the current shape
    pub fn stride(&self) -> Vec<usize> {
        compute_strides(&self.shape)
    }

    pub fn permute(&self, dims: &[usize]) -> Result<Tensor, BellandeError> {
        if dims.len() != self.shape.len() {
            return Err(BellandeError::InvalidShape(format!(
                "Permutation dimensions must match tensor dimensions: expected {}, got {}",
                self.shape.len(),
                dims.len()
            )));
        }

        let mut seen = vec![false; dims.len()];
        let mut new_shape = vec![0; self.shape.len()];
        for (i, &dim) in dims.iter().enumerate() {
            if dim >= self.shape.len() || seen[dim] {
                return Err(BellandeError::InvalidShape(format!(
                    "Invalid permutation dimension: {}",
                    dim
                )));
            }
            seen[dim] = true;
            new_shape[i] = self.shape[dim];
        }

        let mut new_data = vec![0.0; self.data.len()];
        let strides = self.stride();
        let new_strides = compute_strides(&new_shape);

        for (i, &value) in self.data.iter().enumerate() {
            let old_indices = get_indices(i, &strides, &self.shape);
            let mut new_indices = vec![0; old_indices.len()];
            for (j, &dim) in dims.iter().enumerate() {
                new_indices[j] = old_indices[dim];
            }
            new_data[get_flat_index(&new_indices, &new_strides)] = value;
        }

        Ok(Tensor::new(new_data, new_shape))
    }

    /// Stacks equally shaped tensors along a new leading batch dimension.
    pub fn stack(tensors: &[Tensor]) -> Result<Tensor, BellandeError> {
        let Some(first) = tensors.first() else {
            return Err(BellandeError::InvalidParameter(
                "Cannot stack an empty list of tensors".into(),
            ));
        };
        let base_shape = first.shape();

        for (i, tensor) in tensors.iter().enumerate().skip(1) {
            if tensor.shape() != base_shape {
                return Err(BellandeError::ShapeMismatch(format!(
                    "tensor 0 has shape {:?} but tensor {} has shape {:?}",
                    base_shape,
                    i,
                    tensor.shape()
                )));
            }
        }

        let mut new_shape = vec![tensors.len()];
        new_shape.extend(base_shape);

        let mut result_data = Vec::with_capacity(new_shape.iter().product());
        for tensor in tensors {
            result_data.extend_from_slice(&tensor.data);
        }

        Ok(Tensor::new(result_data, new_shape))
    }
}

fn compute_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

fn get_indices(flat_idx: usize, strides: &[usize], shape: &[usize]) -> Vec<usize> {
    let mut indices = vec![0; shape.len()];
    let mut remaining = flat_idx;
    for i in 0..shape.len() {
        indices[i] = remaining / strides[i];
        remaining %= strides[i];
    }
    indices
}

fn get_flat_index(indices: &[usize], strides: &[usize]) -> usize {
    indices
        .iter()
        .zip(strides.iter())
        .map(|(&idx, &stride)| idx * stride)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permute_hwc_to_chw() {
        // 2x2 image, 3 channels, channel-last
        let data: Vec<f32> = (0..12).map(|x| x as f32).collect();
        let hwc = Tensor::new(data, vec![2, 2, 3]);

        let chw = hwc.permute(&[2, 0, 1]).unwrap();

        assert_eq!(chw.shape(), &[3, 2, 2]);
        assert_eq!(&chw.data()[0..4], &[0.0, 3.0, 6.0, 9.0]);
        assert_eq!(&chw.data()[4..8], &[1.0, 4.0, 7.0, 10.0]);
    }

    #[test]
    fn permute_rejects_repeated_axis() {
        let tensor = Tensor::zeros(&[2, 3]);
        assert!(tensor.permute(&[0, 0]).is_err());
        assert!(tensor.permute(&[0]).is_err());
    }

    #[test]
    fn stack_adds_batch_dimension() {
        let a = Tensor::zeros(&[3, 4, 4]);
        let b = Tensor::new(vec![1.0; 48], vec![3, 4, 4]);
        let batch = Tensor::stack(&[a, b]).unwrap();
        assert_eq!(batch.shape(), &[2, 3, 4, 4]);
        assert_eq!(batch.data()[47], 0.0);
        assert_eq!(batch.data()[48], 1.0);

        let mismatched = Tensor::stack(&[Tensor::zeros(&[1]), Tensor::zeros(&[2])]);
        assert!(matches!(mismatched, Err(BellandeError::ShapeMismatch(_))));
    }
}
