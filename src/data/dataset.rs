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
use image::RgbImage;
use ndarray::{Array1, Array4};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Split {
    Train,
    Eval,
}

/// Trait defining the interface for loaded datasets
pub trait Dataset: Send + Sync {
    fn len(&self) -> usize;
    fn get(&self, index: usize) -> Result<(RgbImage, i64), BellandeError>;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn num_classes(&self) -> usize;
}

/// On-disk dataset that can fetch itself and read one split into memory.
pub trait DatasetSource: Send + Sync {
    fn download(&self) -> Result<(), BellandeError>;

    /// Returns `(N, H, W, C)` images and `N` labels, loading class metadata on the way.
    fn load(&mut self, split: Split) -> Result<(Array4<u8>, Array1<i64>), BellandeError>;
}
