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
use crate::data::dataset::{Dataset, DatasetSource, Split};
use crate::data::download::ArchiveDownloader;
use crate::data::pipeline::TransformPipeline;
use crate::data::shard::{ClassMetadata, ShardLoader, ShardManifest};
use image::RgbImage;
use ndarray::{Array1, Array4, Axis};
use std::path::{Path, PathBuf};
use tracing::info;

/// The CIFAR distribution on disk under `root`.
pub struct Cifar100 {
    root: PathBuf,
    loader: ShardLoader,
    downloader: ArchiveDownloader,
    classes: Option<ClassMetadata>,
}

impl Cifar100 {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self::with_manifest(root, ShardManifest::cifar100())
    }

    /// Uses another manifest, e.g. [`ShardManifest::cifar10`].
    pub fn with_manifest<P: AsRef<Path>>(root: P, manifest: ShardManifest) -> Self {
        let root = root.as_ref().to_path_buf();
        Cifar100 {
            downloader: ArchiveDownloader::new(root.clone(), manifest.archive.clone()),
            loader: ShardLoader::new(&root, manifest),
            root,
            classes: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn loader(&self) -> &ShardLoader {
        &self.loader
    }

    pub fn manifest(&self) -> &ShardManifest {
        self.loader.manifest()
    }

    /// Class names, available after the first successful `load`.
    pub fn classes(&self) -> Option<&ClassMetadata> {
        self.classes.as_ref()
    }

    /// Loads `split` into an in-memory dataset.
    pub fn into_dataset(mut self, split: Split) -> Result<Cifar100Dataset, BellandeError> {
        let (images, labels) = self.load(split)?;
        Ok(Cifar100Dataset {
            split,
            images,
            labels,
            classes: self.classes.take().unwrap_or_default(),
            num_classes: self.loader.manifest().num_classes,
        })
    }
}

impl DatasetSource for Cifar100 {
    fn download(&self) -> Result<(), BellandeError> {
        if self.loader.is_intact() {
            info!("Files already downloaded and verified in {:?}", self.loader.folder());
            return Ok(());
        }

        self.downloader.download_and_extract()?;

        // Surface which file is still bad after extraction
        self.loader.check_integrity(Split::Train)?;
        self.loader.check_integrity(Split::Eval)?;
        self.loader.check_metadata()
    }

    fn load(&mut self, split: Split) -> Result<(Array4<u8>, Array1<i64>), BellandeError> {
        let loaded = self.loader.load(split)?;
        self.classes = Some(self.loader.load_metadata()?);
        Ok(loaded)
    }
}

/// One split of CIFAR held in memory as `(N, 32, 32, 3)` bytes.
pub struct Cifar100Dataset {
    split: Split,
    images: Array4<u8>,
    labels: Array1<i64>,
    classes: ClassMetadata,
    num_classes: usize,
}

impl Cifar100Dataset {
    /// Opens `split` under `root`, downloading first when asked.
    pub fn open<P: AsRef<Path>>(root: P, split: Split, download: bool) -> Result<Self, BellandeError> {
        let source = Cifar100::new(root);
        if download {
            source.download()?;
        }
        source.into_dataset(split)
    }

    pub fn split(&self) -> Split {
        self.split
    }

    pub fn images(&self) -> &Array4<u8> {
        &self.images
    }

    pub fn labels(&self) -> &Array1<i64> {
        &self.labels
    }

    pub fn classes(&self) -> &ClassMetadata {
        &self.classes
    }

    pub fn get_transformed(
        &self,
        index: usize,
        pipeline: &TransformPipeline,
    ) -> Result<(Tensor, i64), BellandeError> {
        let (image, label) = self.get(index)?;
        Ok((pipeline.apply(&image)?, label))
    }
}

impl Dataset for Cifar100Dataset {
    fn len(&self) -> usize {
        self.labels.len()
    }

    fn get(&self, index: usize) -> Result<(RgbImage, i64), BellandeError> {
        if index >= self.len() {
            return Err(BellandeError::IndexOutOfBounds {
                index,
                len: self.len(),
            });
        }

        let sample = self.images.index_axis(Axis(0), index);
        let (height, width, _) = sample.dim();
        let pixels: Vec<u8> = sample.iter().copied().collect();
        let image = RgbImage::from_raw(width as u32, height as u32, pixels).ok_or_else(|| {
            BellandeError::ImageError(format!("sample {} does not fill a {}x{} image", index, height, width))
        })?;

        Ok((image, self.labels[index]))
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}
