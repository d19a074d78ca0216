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

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BellandeError {
    /// A shard or metadata file is missing or its checksum does not match.
    #[error("Dataset not found or corrupted ({path:?}): {reason}. Use download to re-download the dataset.")]
    DataIntegrity { path: PathBuf, reason: String },

    /// A shard deserialized fine but does not have the expected fields or layout.
    #[error("Malformed shard {path:?}: {reason}")]
    MalformedShard { path: PathBuf, reason: String },

    #[error("Pickle error at byte {offset}: {reason}")]
    Pickle { offset: u64, reason: String },

    #[error("Invalid tensor shape: {0}")]
    InvalidShape(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Index out of bounds: {index} >= {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("Download error: {0}")]
    Download(String),

    #[error("Image error: {0}")]
    ImageError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<ndarray::ShapeError> for BellandeError {
    fn from(error: ndarray::ShapeError) -> Self {
        BellandeError::InvalidShape(error.to_string())
    }
}

impl From<image::ImageError> for BellandeError {
    fn from(error: image::ImageError) -> Self {
        BellandeError::ImageError(error.to_string())
    }
}

impl From<ureq::Error> for BellandeError {
    fn from(error: ureq::Error) -> Self {
        BellandeError::Download(error.to_string())
    }
}

impl From<serde_yaml::Error> for BellandeError {
    fn from(error: serde_yaml::Error) -> Self {
        BellandeError::SerializationError(error.to_string())
    }
}

impl From<serde_json::Error> for BellandeError {
    fn from(error: serde_json::Error) -> Self {
        BellandeError::SerializationError(error.to_string())
    }
}
