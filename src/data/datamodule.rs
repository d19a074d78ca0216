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

use crate::core::{error::BellandeError, random};
use crate::data::cifar100::{Cifar100, Cifar100Dataset};
use crate::data::dataset::{DatasetSource, Split};
use crate::data::pipeline::{TransformKind, TransformPipeline};
use crate::data::shard::ShardManifest;
use crate::utilities::config::{Configuration, ImageSize};
use tracing::{info, warn};

pub const NUM_CLASSES: usize = 100;
pub const NUM_VAL: usize = 0;

pub const NON_NATIVE_SIZE_WARNING: &str = "image size is not the standard 32x32 for CIFAR. \
     Please adjust image_size if this was not your intention.";

/// What a training harness needs from a dataset module.
pub trait DataModule {
    fn num_classes(&self) -> usize;
    fn num_val(&self) -> usize;
    fn prepare_data(&self) -> Result<(), BellandeError>;
    fn setup(&mut self) -> Result<(), BellandeError>;
    fn augmented_transforms(&self) -> TransformPipeline;
    fn default_transforms(&self) -> TransformPipeline;
}

pub struct Cifar100DataModule {
    config: Configuration,
    manifest: ShardManifest,
    warnings: Vec<String>,
    train: Option<Cifar100Dataset>,
    test: Option<Cifar100Dataset>,
}

impl Cifar100DataModule {
    pub fn new(config: Configuration) -> Result<Self, BellandeError> {
        Self::with_manifest(config, ShardManifest::cifar100())
    }

    pub fn with_manifest(config: Configuration, manifest: ShardManifest) -> Result<Self, BellandeError> {
        config.validate()?;

        if let Some(seed) = config.system.seed {
            random::set_seed(seed);
        }

        let mut warnings = Vec::new();
        if !config.image_size.is_native() {
            warn!("{} (image_size = {})", NON_NATIVE_SIZE_WARNING, config.image_size);
            warnings.push(NON_NATIVE_SIZE_WARNING.to_string());
        }

        Ok(Cifar100DataModule {
            config,
            manifest,
            warnings,
            train: None,
            test: None,
        })
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn image_size(&self) -> ImageSize {
        self.config.image_size
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    pub fn num_workers(&self) -> usize {
        self.config.system.num_workers
    }

    /// Warnings raised at construction.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn train_dataset(&self) -> Option<&Cifar100Dataset> {
        self.train.as_ref()
    }

    pub fn test_dataset(&self) -> Option<&Cifar100Dataset> {
        self.test.as_ref()
    }

    fn source(&self) -> Cifar100 {
        Cifar100::with_manifest(&self.config.data.root, self.manifest.clone())
    }
}

impl DataModule for Cifar100DataModule {
    fn num_classes(&self) -> usize {
        self.manifest.num_classes
    }

    fn num_val(&self) -> usize {
        NUM_VAL
    }

    fn prepare_data(&self) -> Result<(), BellandeError> {
        if self.config.data.download {
            self.source().download()?;
        }
        Ok(())
    }

    fn setup(&mut self) -> Result<(), BellandeError> {
        self.train = None;
        self.test = None;
        let train = self.source().into_dataset(Split::Train)?;
        let test = self.source().into_dataset(Split::Eval)?;
        self.train = Some(train);
        self.test = Some(test);
        info!(
            "CIFAR-100 ready: {} train / {} test samples",
            self.train.as_ref().map_or(0, |d| d.labels().len()),
            self.test.as_ref().map_or(0, |d| d.labels().len())
        );
        Ok(())
    }

    fn augmented_transforms(&self) -> TransformPipeline {
        TransformPipeline::build(TransformKind::Augmented, self.config.image_size)
    }

    fn default_transforms(&self) -> TransformPipeline {
        TransformPipeline::build(TransformKind::Default, self.config.image_size)
    }
}
