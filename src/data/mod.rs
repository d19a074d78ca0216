pub mod augmentation;
pub mod cifar100;
pub mod datamodule;
pub mod dataset;
pub mod download;
pub mod numpy;
pub mod pickle;
pub mod pipeline;
pub mod preprocessing;
pub mod shard;
