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
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Native CIFAR resolution.
pub const NATIVE_IMAGE_SIZE: u32 = 32;

/// Target resolution of the transform pipelines.
///
/// A single edge (`image_size: 64`) crops to a square and resizes the shorter
/// side of an image; a pair (`image_size: [48, 64]`) is an exact height and width.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(untagged)]
pub enum ImageSize {
    Edge(u32),
    Exact([u32; 2]),
}

impl ImageSize {
    pub fn exact(height: u32, width: u32) -> Self {
        ImageSize::Exact([height, width])
    }

    pub fn is_native(&self) -> bool {
        match *self {
            ImageSize::Edge(edge) => edge == NATIVE_IMAGE_SIZE,
            ImageSize::Exact([h, w]) => h == NATIVE_IMAGE_SIZE && w == NATIVE_IMAGE_SIZE,
        }
    }

    /// Output `(height, width)` of a crop stage.
    pub fn crop_dims(&self) -> (u32, u32) {
        match *self {
            ImageSize::Edge(edge) => (edge, edge),
            ImageSize::Exact([h, w]) => (h, w),
        }
    }

    /// Output `(height, width)` of a resize stage applied to an `height` x `width` image.
    pub fn resize_dims(&self, height: u32, width: u32) -> (u32, u32) {
        match *self {
            ImageSize::Exact([h, w]) => (h, w),
            ImageSize::Edge(edge) => {
                if height == 0 || width == 0 {
                    return (edge, edge);
                }
                if height <= width {
                    let long = (edge as u64 * width as u64 / height as u64) as u32;
                    (edge, long)
                } else {
                    let long = (edge as u64 * height as u64 / width as u64) as u32;
                    (long, edge)
                }
            }
        }
    }

    fn validate(&self) -> Result<(), BellandeError> {
        let (h, w) = self.crop_dims();
        if h == 0 || w == 0 {
            return Err(BellandeError::InvalidConfiguration(
                "Image size must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ImageSize {
    fn default() -> Self {
        ImageSize::Edge(NATIVE_IMAGE_SIZE)
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let (h, w) = self.crop_dims();
        write!(f, "{}x{}", h, w)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Configuration {
    pub image_size: ImageSize,

    // Forwarded to the training harness
    pub batch_size: usize,

    pub data: DataConfig,
    pub system: SystemConfig,

    // Custom parameters
    pub parameters: HashMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding the extracted distribution folder.
    pub root: PathBuf,
    /// Fetch the archive when the shards are missing or corrupted.
    pub download: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SystemConfig {
    pub num_workers: usize,
    /// Seeds the augmentation random source on the constructing thread.
    pub seed: Option<u64>,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            root: PathBuf::from("data"),
            download: false,
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        SystemConfig {
            num_workers: num_cpus::get(),
            seed: None,
        }
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            image_size: ImageSize::default(),
            batch_size: 128,
            data: DataConfig::default(),
            system: SystemConfig::default(),
            parameters: HashMap::new(),
        }
    }
}

impl Configuration {
    /// Reads a YAML file, or JSON when the extension is `.json`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, BellandeError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: Configuration = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => serde_yaml::from_str(&content)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, BellandeError> {
        let config: Configuration = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), BellandeError> {
        let path = path.as_ref();
        let content = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            _ => serde_yaml::to_string(self)?,
        };
        fs::write(path, content)?;
        Ok(())
    }

    pub fn with_image_size(mut self, image_size: ImageSize) -> Self {
        self.image_size = image_size;
        self
    }

    pub fn with_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.data.root = root.into();
        self
    }

    pub fn validate(&self) -> Result<(), BellandeError> {
        self.image_size.validate()?;

        if self.batch_size == 0 {
            return Err(BellandeError::InvalidConfiguration(
                "Batch size must be greater than 0".into(),
            ));
        }

        if self.system.num_workers == 0 {
            return Err(BellandeError::InvalidConfiguration(
                "Number of workers must be greater than 0".into(),
            ));
        }

        if self.data.root.as_os_str().is_empty() {
            return Err(BellandeError::InvalidConfiguration(
                "Data root cannot be empty".into(),
            ));
        }

        Ok(())
    }

    pub fn merge(&mut self, other: &Configuration) {
        // Merge only non-default values from other configuration
        let defaults = Configuration::default();
        if other.image_size != defaults.image_size {
            self.image_size = other.image_size;
        }
        if other.batch_size != defaults.batch_size {
            self.batch_size = other.batch_size;
        }
        if other.data.root != defaults.data.root {
            self.data.root = other.data.root.clone();
        }
        if other.data.download {
            self.data.download = true;
        }
        if other.system.seed.is_some() {
            self.system.seed = other.system.seed;
        }

        self.parameters.extend(other.parameters.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_edge_and_pair() {
        let config = Configuration::from_yaml_str("image_size: 64\n").unwrap();
        assert_eq!(config.image_size, ImageSize::Edge(64));
        assert_eq!(config.batch_size, 128);

        let config = Configuration::from_yaml_str("image_size: [48, 64]\n").unwrap();
        assert_eq!(config.image_size, ImageSize::exact(48, 64));
        assert_eq!(config.image_size.crop_dims(), (48, 64));
    }

    #[test]
    fn rejects_zero_image_size() {
        let result = Configuration::from_yaml_str("image_size: 0\n");
        assert!(matches!(
            result,
            Err(BellandeError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn native_size_detection() {
        assert!(ImageSize::Edge(32).is_native());
        assert!(ImageSize::exact(32, 32).is_native());
        assert!(!ImageSize::Edge(64).is_native());
        assert!(!ImageSize::exact(32, 64).is_native());
    }

    #[test]
    fn resize_keeps_aspect_ratio_for_single_edge() {
        assert_eq!(ImageSize::Edge(64).resize_dims(32, 32), (64, 64));
        assert_eq!(ImageSize::Edge(16).resize_dims(32, 64), (16, 32));
        assert_eq!(ImageSize::Edge(16).resize_dims(64, 32), (32, 16));
        assert_eq!(ImageSize::exact(10, 20).resize_dims(32, 32), (10, 20));
    }

    #[test]
    fn merge_overrides_non_default_fields() {
        let mut base = Configuration::default();
        let mut other = Configuration::default().with_image_size(ImageSize::Edge(224));
        other.system.seed = Some(3);
        other
            .parameters
            .insert("experiment".to_string(), "baseline".to_string());

        base.merge(&other);

        assert_eq!(base.image_size, ImageSize::Edge(224));
        assert_eq!(base.system.seed, Some(3));
        assert_eq!(base.parameters["experiment"], "baseline");
    }

    #[test]
    fn json_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datamodule.json");
        let config = Configuration::default().with_image_size(ImageSize::exact(40, 40));

        config.save(&path).unwrap();
        let loaded = Configuration::from_file(&path).unwrap();

        assert_eq!(loaded, config);
    }
}
