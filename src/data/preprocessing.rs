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

use crate::core::{error::BellandeError, tensor::Tensor};
use crate::data::augmentation::Transform;
use image::RgbImage;

/// Per-channel CIFAR statistics on the `[0, 1]` scale.
pub const CIFAR_MEAN: [f32; 3] = [125.3 / 255.0, 123.0 / 255.0, 113.9 / 255.0];
pub const CIFAR_STD: [f32; 3] = [63.0 / 255.0, 62.1 / 255.0, 66.7 / 255.0];

/// Converts an RGB image to a `(3, H, W)` tensor scaled to `[0, 1]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToTensor;

impl ToTensor {
    pub fn convert(&self, image: &RgbImage) -> Result<Tensor, BellandeError> {
        let (width, height) = image.dimensions();
        let hwc = Tensor::from_shape_vec(
            image.as_raw().iter().map(|&v| v as f32 / 255.0).collect(),
            vec![height as usize, width as usize, 3],
        )?;
        hwc.permute(&[2, 0, 1])
    }

    pub fn name(&self) -> &str {
        "ToTensor"
    }
}

pub struct Normalize {
    mean: Vec<f32>,
    std: Vec<f32>,
}

impl Normalize {
    pub fn new(mean: Vec<f32>, std: Vec<f32>) -> Self {
        assert_eq!(mean.len(), std.len());
        assert!(std.iter().all(|&s| s > 0.0));
        Normalize { mean, std }
    }

    pub fn mean(&self) -> &[f32] {
        &self.mean
    }

    pub fn std(&self) -> &[f32] {
        &self.std
    }
}

/// The fixed normalization used for every CIFAR pipeline.
pub fn cifar10_normalization() -> Normalize {
    Normalize::new(CIFAR_MEAN.to_vec(), CIFAR_STD.to_vec())
}

impl Transform for Normalize {
    fn apply(&self, tensor: &Tensor) -> Result<Tensor, BellandeError> {
        // (C, H, W) or (N, C, H, W)
        let (batch_size, channels, height, width) = match *tensor.shape() {
            [c, h, w] => (1, c, h, w),
            [n, c, h, w] => (n, c, h, w),
            _ => {
                return Err(BellandeError::InvalidShape(format!(
                    "Normalize expects a 3D or 4D tensor, got {:?}",
                    tensor.shape()
                )))
            }
        };

        if channels != self.mean.len() {
            return Err(BellandeError::ShapeMismatch(format!(
                "Normalize has {} channels, tensor has {}",
                self.mean.len(),
                channels
            )));
        }

        let plane = height * width;
        let mut normalized = tensor.data.clone();
        for b in 0..batch_size {
            for c in 0..channels {
                let start = (b * channels + c) * plane;
                for value in &mut normalized[start..start + plane] {
                    *value = (*value - self.mean[c]) / self.std[c];
                }
            }
        }

        Ok(Tensor::new(normalized, tensor.shape.clone()))
    }

    fn name(&self) -> &str {
        "Normalize"
    }
}
