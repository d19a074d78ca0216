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

use crate::core::{error::BellandeError, random, tensor::Tensor};
use crate::utilities::config::ImageSize;
use image::imageops::{self, FilterType};
use image::RgbImage;

/// Trait for tensor transformations
pub trait Transform: Send + Sync {
    fn apply(&self, tensor: &Tensor) -> Result<Tensor, BellandeError>;
    fn name(&self) -> &str;
}

/// Trait for transformations on decoded images, applied before tensor conversion
pub trait ImageTransform: Send + Sync {
    fn apply(&self, image: &RgbImage) -> Result<RgbImage, BellandeError>;
    fn name(&self) -> &str;
}

pub struct Compose {
    transforms: Vec<Box<dyn Transform>>,
}

impl Compose {
    pub fn new(transforms: Vec<Box<dyn Transform>>) -> Self {
        Compose { transforms }
    }

    pub fn names(&self) -> Vec<&str> {
        self.transforms.iter().map(|t| t.name()).collect()
    }
}

impl Transform for Compose {
    fn apply(&self, tensor: &Tensor) -> Result<Tensor, BellandeError> {
        let mut current = tensor.clone();
        for transform in &self.transforms {
            current = transform.apply(&current)?;
        }
        Ok(current)
    }

    fn name(&self) -> &str {
        "Compose"
    }
}

/// Crop of random area and aspect ratio, resized bilinearly to the target size.
pub struct RandomResizedCrop {
    size: ImageSize,
    scale: (f64, f64),
    ratio: (f64, f64),
    attempts: usize,
}

impl RandomResizedCrop {
    pub fn new(size: ImageSize) -> Self {
        RandomResizedCrop {
            size,
            scale: (0.08, 1.0),
            ratio: (3.0 / 4.0, 4.0 / 3.0),
            attempts: 10,
        }
    }

    pub fn with_scale(mut self, low: f64, high: f64) -> Self {
        assert!(low > 0.0 && low <= high);
        self.scale = (low, high);
        self
    }

    pub fn with_ratio(mut self, low: f64, high: f64) -> Self {
        assert!(low > 0.0 && low <= high);
        self.ratio = (low, high);
        self
    }

    /// Picks the crop window as `(top, left, height, width)`.
    pub fn sample_window(&self, height: u32, width: u32) -> (u32, u32, u32, u32) {
        let area = (height as f64) * (width as f64);
        let log_ratio = (self.ratio.0.ln(), self.ratio.1.ln());

        for _ in 0..self.attempts {
            let target_area = area * random::uniform(self.scale.0, self.scale.1);
            let aspect = random::uniform(log_ratio.0, log_ratio.1).exp();

            let w = (target_area * aspect).sqrt().round() as u32;
            let h = (target_area / aspect).sqrt().round() as u32;

            if w > 0 && h > 0 && w <= width && h <= height {
                let top = random::gen_index(height - h);
                let left = random::gen_index(width - w);
                return (top, left, h, w);
            }
        }

        // Fallback to a center crop clamped to the ratio range
        let in_ratio = width as f64 / height as f64;
        let (h, w) = if in_ratio < self.ratio.0 {
            let h = (width as f64 / self.ratio.0).round() as u32;
            (h.clamp(1, height), width)
        } else if in_ratio > self.ratio.1 {
            let w = (height as f64 * self.ratio.1).round() as u32;
            (height, w.clamp(1, width))
        } else {
            (height, width)
        };
        ((height - h) / 2, (width - w) / 2, h, w)
    }
}

impl ImageTransform for RandomResizedCrop {
    fn apply(&self, image: &RgbImage) -> Result<RgbImage, BellandeError> {
        let (height, width) = (image.height(), image.width());
        if height == 0 || width == 0 {
            return Err(BellandeError::InvalidShape(
                "Cannot crop an empty image".to_string(),
            ));
        }

        let (top, left, h, w) = self.sample_window(height, width);
        let (out_h, out_w) = self.size.crop_dims();
        let cropped = imageops::crop_imm(image, left, top, w, h).to_image();

        Ok(imageops::resize(&cropped, out_w, out_h, FilterType::Triangle))
    }

    fn name(&self) -> &str {
        "RandomResizedCrop"
    }
}

pub struct RandomHorizontalFlip {
    p: f64,
}

impl RandomHorizontalFlip {
    pub fn new(p: f64) -> Self {
        assert!((0.0..=1.0).contains(&p));
        RandomHorizontalFlip { p }
    }
}

impl ImageTransform for RandomHorizontalFlip {
    fn apply(&self, image: &RgbImage) -> Result<RgbImage, BellandeError> {
        if random::bernoulli(self.p) {
            Ok(imageops::flip_horizontal(image))
        } else {
            Ok(image.clone())
        }
    }

    fn name(&self) -> &str {
        "RandomHorizontalFlip"
    }
}

/// Bilinear resize. A single edge scales the shorter side and keeps the aspect ratio.
pub struct Resize {
    size: ImageSize,
}

impl Resize {
    pub fn new(size: ImageSize) -> Self {
        Resize { size }
    }
}

impl ImageTransform for Resize {
    fn apply(&self, image: &RgbImage) -> Result<RgbImage, BellandeError> {
        let (height, width) = (image.height(), image.width());
        let (out_h, out_w) = self.size.resize_dims(height, width);
        if (out_h, out_w) == (height, width) {
            return Ok(image.clone());
        }

        Ok(imageops::resize(image, out_w, out_h, FilterType::Triangle))
    }

    fn name(&self) -> &str {
        "Resize"
    }
}
