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
use crate::data::augmentation::{
    Compose, ImageTransform, RandomHorizontalFlip, RandomResizedCrop, Resize, Transform,
};
use crate::data::preprocessing::{cifar10_normalization, ToTensor};
use crate::utilities::config::ImageSize;
use image::RgbImage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformKind {
    /// Training-time augmentation.
    Augmented,
    /// Deterministic evaluation preprocessing.
    Default,
}

/// Image stages, tensor conversion, then tensor stages.
pub struct TransformPipeline {
    kind: TransformKind,
    image_size: ImageSize,
    image_stages: Vec<Box<dyn ImageTransform>>,
    to_tensor: ToTensor,
    tensor_stages: Compose,
}

impl TransformPipeline {
    pub fn build(kind: TransformKind, image_size: ImageSize) -> Self {
        let image_stages: Vec<Box<dyn ImageTransform>> = match kind {
            TransformKind::Augmented => vec![
                Box::new(RandomResizedCrop::new(image_size)),
                Box::new(RandomHorizontalFlip::new(0.5)),
            ],
            TransformKind::Default => vec![Box::new(Resize::new(image_size))],
        };

        TransformPipeline {
            kind,
            image_size,
            image_stages,
            to_tensor: ToTensor,
            tensor_stages: Compose::new(vec![Box::new(cifar10_normalization())]),
        }
    }

    pub fn kind(&self) -> TransformKind {
        self.kind
    }

    pub fn image_size(&self) -> ImageSize {
        self.image_size
    }

    pub fn apply(&self, image: &RgbImage) -> Result<Tensor, BellandeError> {
        let mut current = image.clone();
        for stage in &self.image_stages {
            current = stage.apply(&current)?;
        }

        let tensor = self.to_tensor.convert(&current)?;
        self.tensor_stages.apply(&tensor)
    }

    /// Applies the pipeline to each image and stacks the results into `(N, 3, H, W)`.
    pub fn apply_batch(&self, images: &[RgbImage]) -> Result<Tensor, BellandeError> {
        let tensors = images
            .iter()
            .map(|image| self.apply(image))
            .collect::<Result<Vec<Tensor>, BellandeError>>()?;
        Tensor::stack(&tensors)
    }

    pub fn stage_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.image_stages.iter().map(|s| s.name()).collect();
        names.push(self.to_tensor.name());
        names.extend(self.tensor_stages.names());
        names
    }
}
