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
use crate::data::dataset::Split;
use crate::data::numpy::{byte_payload, NumpyArray};
use crate::data::pickle::{self, PickleValue, StringDecoding};
use ndarray::{Array1, Array4};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const CHANNELS: usize = 3;
pub const IMAGE_HEIGHT: usize = 32;
pub const IMAGE_WIDTH: usize = 32;
pub const SAMPLE_BYTES: usize = CHANNELS * IMAGE_HEIGHT * IMAGE_WIDTH;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardDescriptor {
    pub file_name: String,
    /// Lowercase hex MD5 of the file.
    pub checksum: String,
}

impl ShardDescriptor {
    pub fn new(file_name: &str, checksum: &str) -> Self {
        ShardDescriptor {
            file_name: file_name.to_string(),
            checksum: checksum.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveDescriptor {
    pub url: String,
    pub file_name: String,
    pub checksum: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaDescriptor {
    pub file_name: String,
    /// Mapping key holding the class names.
    pub key: String,
    pub checksum: String,
}

/// Everything needed to locate, verify and fetch one CIFAR distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardManifest {
    pub base_folder: String,
    pub archive: ArchiveDescriptor,
    pub train: Vec<ShardDescriptor>,
    pub test: Vec<ShardDescriptor>,
    pub meta: MetaDescriptor,
    pub num_classes: usize,
}

impl ShardManifest {
    pub fn cifar100() -> Self {
        ShardManifest {
            base_folder: "cifar-100-python".to_string(),
            archive: ArchiveDescriptor {
                url: "https://www.cs.toronto.edu/~kriz/cifar-100-python.tar.gz".to_string(),
                file_name: "cifar-100-python.tar.gz".to_string(),
                checksum: "eb9058c3a382ffc7106e4002c42a8d85".to_string(),
            },
            train: vec![ShardDescriptor::new(
                "train",
                "16019d7e3df5f24257cddd939b257f8d",
            )],
            test: vec![ShardDescriptor::new(
                "test",
                "f0ef6b0ae62326f3e7ffdfab6717acfc",
            )],
            meta: MetaDescriptor {
                file_name: "meta".to_string(),
                key: "fine_label_names".to_string(),
                checksum: "7973b15100ade9c7d40fb424638fde48".to_string(),
            },
            num_classes: 100,
        }
    }

    pub fn cifar10() -> Self {
        ShardManifest {
            base_folder: "cifar-10-batches-py".to_string(),
            archive: ArchiveDescriptor {
                url: "https://www.cs.toronto.edu/~kriz/cifar-10-python.tar.gz".to_string(),
                file_name: "cifar-10-python.tar.gz".to_string(),
                checksum: "c58f30108f718f92721af3b95e74349a".to_string(),
            },
            train: vec![
                ShardDescriptor::new("data_batch_1", "c99cafc152244af753f735de768cd75f"),
                ShardDescriptor::new("data_batch_2", "d4bba439e000b95fd0a9bffe97cbabec"),
                ShardDescriptor::new("data_batch_3", "54ebc095f3ab1f0389bbae665268c751"),
                ShardDescriptor::new("data_batch_4", "634d18415352ddfa80567beed471001a"),
                ShardDescriptor::new("data_batch_5", "482c414d41f54cd18b22e5b47cb7c3cb"),
            ],
            test: vec![ShardDescriptor::new(
                "test_batch",
                "40351d587109b95175f43aff81a1287e",
            )],
            meta: MetaDescriptor {
                file_name: "batches.meta".to_string(),
                key: "label_names".to_string(),
                checksum: "5ff9c542aee3614f3951f8cda6e48888".to_string(),
            },
            num_classes: 10,
        }
    }

    pub fn shards(&self, split: Split) -> &[ShardDescriptor] {
        match split {
            Split::Train => &self.train,
            Split::Eval => &self.test,
        }
    }
}

/// Label field names, tried in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKey {
    Plain,
    Fine,
}

pub const LABEL_KEYS: [LabelKey; 2] = [LabelKey::Plain, LabelKey::Fine];

impl LabelKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelKey::Plain => "labels",
            LabelKey::Fine => "fine_labels",
        }
    }
}

/// Class names in label order, with the reverse lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassMetadata {
    pub names: Vec<String>,
    pub class_to_idx: HashMap<String, usize>,
}

impl ClassMetadata {
    pub fn new(names: Vec<String>) -> Self {
        let class_to_idx = names
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();
        ClassMetadata {
            names,
            class_to_idx,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Hex MD5 of a file, computed in chunks.
pub fn file_md5<P: AsRef<Path>>(path: P) -> Result<String, BellandeError> {
    let mut file = File::open(path)?;
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; 1 << 20];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        context.consume(&buffer[..read]);
    }
    Ok(format!("{:x}", context.compute()))
}

/// Fails with `DataIntegrity` when `path` is missing or its MD5 differs from `checksum`.
pub fn check_integrity(path: &Path, checksum: &str) -> Result<(), BellandeError> {
    if !path.is_file() {
        return Err(BellandeError::DataIntegrity {
            path: path.to_path_buf(),
            reason: "file not found".to_string(),
        });
    }

    let actual = file_md5(path)?;
    if !actual.eq_ignore_ascii_case(checksum) {
        return Err(BellandeError::DataIntegrity {
            path: path.to_path_buf(),
            reason: format!("checksum {} does not match expected {}", actual, checksum),
        });
    }
    Ok(())
}

/// Reads the pickled shards of one distribution folder.
#[derive(Debug, Clone)]
pub struct ShardLoader {
    folder: PathBuf,
    manifest: ShardManifest,
    decoding: StringDecoding,
}

impl ShardLoader {
    pub fn new<P: AsRef<Path>>(root: P, manifest: ShardManifest) -> Self {
        ShardLoader {
            folder: root.as_ref().join(&manifest.base_folder),
            manifest,
            decoding: StringDecoding::Latin1,
        }
    }

    pub fn with_decoding(mut self, decoding: StringDecoding) -> Self {
        self.decoding = decoding;
        self
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn manifest(&self) -> &ShardManifest {
        &self.manifest
    }

    /// Verifies every shard of `split` in list order, stopping at the first failure.
    pub fn check_integrity(&self, split: Split) -> Result<(), BellandeError> {
        for descriptor in self.manifest.shards(split) {
            check_integrity(&self.folder.join(&descriptor.file_name), &descriptor.checksum)?;
        }
        Ok(())
    }

    pub fn check_metadata(&self) -> Result<(), BellandeError> {
        let meta = &self.manifest.meta;
        check_integrity(&self.folder.join(&meta.file_name), &meta.checksum)
    }

    /// True when both splits and the metadata file pass verification.
    pub fn is_intact(&self) -> bool {
        self.check_integrity(Split::Train).is_ok()
            && self.check_integrity(Split::Eval).is_ok()
            && self.check_metadata().is_ok()
    }

    /// Loads all shards of `split` as `(N, 32, 32, 3)` images and `N` labels.
    pub fn load(&self, split: Split) -> Result<(Array4<u8>, Array1<i64>), BellandeError> {
        self.check_integrity(split)?;

        let descriptors = self.manifest.shards(split);
        info!(
            "Loading {} shard(s) for {:?} split from {:?}",
            descriptors.len(),
            split,
            self.folder
        );

        let mut pixels = Vec::new();
        let mut labels = Vec::new();
        for descriptor in descriptors {
            let path = self.folder.join(&descriptor.file_name);
            let (shard_pixels, shard_labels) = self.read_shard(&path)?;
            debug!(
                "Decoded {:?}: {} samples",
                descriptor.file_name,
                shard_labels.len()
            );

            if pixels.is_empty() {
                pixels = shard_pixels;
            } else {
                pixels.extend_from_slice(&shard_pixels);
            }
            labels.extend(shard_labels);
        }

        let count = labels.len();
        let images = Array4::from_shape_vec((count, CHANNELS, IMAGE_HEIGHT, IMAGE_WIDTH), pixels)?
            .permuted_axes([0, 2, 3, 1])
            .as_standard_layout()
            .into_owned();

        info!("Loaded {} samples for {:?} split", count, split);
        Ok((images, Array1::from(labels)))
    }

    /// Reads the class names from the metadata file.
    pub fn load_metadata(&self) -> Result<ClassMetadata, BellandeError> {
        let meta = &self.manifest.meta;
        let path = self.folder.join(&meta.file_name);
        self.check_metadata()?;

        let value = pickle::from_path(&path, self.decoding).map_err(|e| malformed(&path, e))?;
        let names = value
            .get(&meta.key)
            .and_then(PickleValue::as_sequence)
            .ok_or_else(|| malformed(&path, format!("missing {:?} field", meta.key)))?
            .iter()
            .map(|name| {
                name.as_text()
                    .map(|text| text.into_owned())
                    .ok_or_else(|| malformed(&path, "class name is not a string"))
            })
            .collect::<Result<Vec<String>, BellandeError>>()?;

        info!("Loaded {} class names from {:?}", names.len(), path);
        Ok(ClassMetadata::new(names))
    }

    fn read_shard(&self, path: &Path) -> Result<(Vec<u8>, Vec<i64>), BellandeError> {
        let mut entry = pickle::from_path(path, self.decoding).map_err(|e| match e {
            BellandeError::IOError(io) => BellandeError::IOError(io),
            other => malformed(path, other),
        })?;
        if !matches!(entry, PickleValue::Dict(_)) {
            return Err(malformed(
                path,
                format!("expected a mapping, found {}", entry.type_name()),
            ));
        }

        let data = entry
            .remove("data")
            .ok_or_else(|| malformed(path, "missing \"data\" field"))?;
        let pixels = if NumpyArray::is_array(&data) {
            NumpyArray::from_pickle(data)
                .and_then(NumpyArray::into_bytes)
                .map_err(|e| malformed(path, e))?
        } else {
            let bytes = byte_payload(data).map_err(|e| malformed(path, format!("\"data\" field: {}", e)))?;
            Arc::try_unwrap(bytes).unwrap_or_else(|shared| (*shared).clone())
        };
        if pixels.len() % SAMPLE_BYTES != 0 {
            return Err(malformed(
                path,
                format!(
                    "{} image bytes is not a whole number of {}-byte samples",
                    pixels.len(),
                    SAMPLE_BYTES
                ),
            ));
        }
        let samples = pixels.len() / SAMPLE_BYTES;

        let (key, value) = LABEL_KEYS
            .iter()
            .find_map(|key| entry.get(key.as_str()).map(|value| (key, value)))
            .ok_or_else(|| {
                let tried: Vec<&str> = LABEL_KEYS.iter().map(LabelKey::as_str).collect();
                malformed(path, format!("no label field, tried {:?}", tried))
            })?;
        let labels = decode_labels(value).map_err(|reason| {
            malformed(path, format!("{:?} field: {}", key.as_str(), reason))
        })?;

        if labels.len() != samples {
            return Err(malformed(
                path,
                format!("{} labels for {} samples", labels.len(), samples),
            ));
        }
        let num_classes = self.manifest.num_classes as i64;
        if let Some(bad) = labels.iter().find(|&&l| l < 0 || l >= num_classes) {
            return Err(malformed(
                path,
                format!("label {} outside [0, {})", bad, num_classes),
            ));
        }

        Ok((pixels, labels))
    }
}

fn decode_labels(value: &PickleValue) -> Result<Vec<i64>, String> {
    match value {
        PickleValue::List(items) | PickleValue::Tuple(items) => items
            .iter()
            .map(|item| {
                item.as_int()
                    .ok_or_else(|| format!("label of type {} is not an integer", item.type_name()))
            })
            .collect(),
        PickleValue::Object { .. } => NumpyArray::from_pickle(value.clone())
            .and_then(|array| array.to_i64())
            .map_err(|e| e.to_string()),
        other => Err(format!("{} is not a label sequence", other.type_name())),
    }
}

fn malformed<E: ToString>(path: &Path, reason: E) -> BellandeError {
    BellandeError::MalformedShard {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
