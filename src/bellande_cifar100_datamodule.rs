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
use std::path::Path;

pub mod core;
pub mod data;
pub mod utilities;

pub use crate::data::datamodule::{Cifar100DataModule, DataModule};
pub use crate::data::dataset::{Dataset, DatasetSource, Split};
pub use crate::data::pipeline::{TransformKind, TransformPipeline};
pub use crate::utilities::config::{Configuration, ImageSize};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const MODULE_NAME: &str = "Bellande CIFAR-100 DataModule";

/// Builds the data module from a YAML or JSON configuration file.
pub fn from_config_file<P: AsRef<Path>>(config_path: P) -> Result<Cifar100DataModule, BellandeError> {
    let config = Configuration::from_file(config_path)?;
    Cifar100DataModule::new(config)
}

pub fn get_version() -> &'static str {
    VERSION
}

pub fn get_name() -> &'static str {
    MODULE_NAME
}

pub fn system_info() -> String {
    format!(
        "{} v{}\n\
        CPU Threads: {}",
        MODULE_NAME,
        VERSION,
        num_cpus::get(),
    )
}
