// Copyright (C) 2025 Bellande Artificial Intelligence Computer Vision Research Innovation Center, Ronaldson Bellande

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

use std::error::Error;
use std::fs;
use std::path::Path;

use bellande_cifar100_datamodule::{
    core::error::BellandeError,
    data::cifar100::Cifar100,
    data::shard::{
        file_md5, ArchiveDescriptor, MetaDescriptor, ShardDescriptor, ShardLoader, ShardManifest,
        SAMPLE_BYTES,
    },
    Cifar100DataModule, Configuration, DataModule, Dataset, DatasetSource, ImageSize, Split,
};
use tempfile::TempDir;

const BASE_FOLDER: &str = "cifar-100-python";

/// Minimal protocol 2 writer producing the same opcodes as Python 2 `cPickle`.
struct PickleWriter {
    buf: Vec<u8>,
}

impl PickleWriter {
    fn new() -> Self {
        PickleWriter {
            buf: vec![0x80, 2],
        }
    }

    fn op(&mut self, code: u8) {
        self.buf.push(code);
    }

    fn string(&mut self, bytes: &[u8]) {
        if bytes.len() < 256 {
            self.buf.push(b'U');
            self.buf.push(bytes.len() as u8);
        } else {
            self.buf.push(b'T');
            self.buf.extend((bytes.len() as u32).to_le_bytes());
        }
        self.buf.extend_from_slice(bytes);
    }

    fn int(&mut self, value: i64) {
        match value {
            0..=0xff => {
                self.buf.push(b'K');
                self.buf.push(value as u8);
            }
            0x100..=0xffff => {
                self.buf.push(b'M');
                self.buf.extend((value as u16).to_le_bytes());
            }
            _ => {
                self.buf.push(b'J');
                self.buf.extend((value as i32).to_le_bytes());
            }
        }
    }

    fn global(&mut self, module: &str, name: &str) {
        self.buf.push(b'c');
        self.buf.extend(format!("{}\n{}\n", module, name).into_bytes());
    }

    fn int_list(&mut self, values: &[i64]) {
        self.op(b']');
        self.op(b'(');
        for &v in values {
            self.int(v);
        }
        self.op(b'e');
    }

    /// Python 3 `str`.
    fn unicode(&mut self, text: &str) {
        self.buf.push(b'X');
        self.buf.extend((text.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(text.as_bytes());
    }

    /// Python 3 `bytes` below protocol 3: `_codecs.encode(text, 'latin1')`.
    fn latin1_bytes(&mut self, bytes: &[u8]) {
        self.global("_codecs", "encode");
        let text: String = bytes.iter().map(|&b| b as char).collect();
        self.unicode(&text);
        self.unicode("latin1");
        self.op(0x86);
        self.op(b'R');
    }

    fn dtype_u1(&mut self) {
        self.global("numpy", "dtype");
        self.string(b"u1");
        self.int(0);
        self.int(1);
        self.op(0x87);
        self.op(b'R');
        self.op(b'(');
        self.int(3);
        self.string(b"|");
        self.op(b'N');
        self.op(b'N');
        self.op(b'N');
        self.int(-1);
        self.int(-1);
        self.int(0);
        self.op(b't');
        self.op(b'b');
    }

    /// `numpy.ndarray` of `uint8` with shape `(rows, cols)`.
    fn uint8_array(&mut self, rows: usize, cols: usize, data: &[u8], latin1: bool) {
        self.global("numpy.core.multiarray", "_reconstruct");
        self.global("numpy", "ndarray");
        self.int(0);
        self.op(0x85);
        self.string(b"b");
        self.op(0x87);
        self.op(b'R');

        self.op(b'(');
        self.int(1);
        self.int(rows as i64);
        self.int(cols as i64);
        self.op(0x86);
        self.dtype_u1();
        self.op(0x89);
        if latin1 {
            self.latin1_bytes(data);
        } else {
            self.string(data);
        }
        self.op(b't');
        self.op(b'b');
    }

    /// Protocol 5 `numpy.ndarray` with the buffer in-band as a `bytearray`.
    fn uint8_frombuffer(&mut self, rows: usize, cols: usize, data: &[u8]) {
        self.global("numpy._core.numeric", "_frombuffer");
        self.op(b'(');
        self.buf.push(0x96);
        self.buf.extend((data.len() as u64).to_le_bytes());
        self.buf.extend_from_slice(data);
        self.dtype_u1();
        self.int(rows as i64);
        self.int(cols as i64);
        self.op(0x86);
        self.unicode("C");
        self.op(b't');
        self.op(b'R');
    }

    fn finish(mut self) -> Vec<u8> {
        self.op(b'.');
        self.buf
    }
}

enum Pixels<'a> {
    Raw(&'a [u8]),
    Numpy(&'a [u8]),
    /// ndarray written by Python 3 at protocol 2
    NumpyLatin1(&'a [u8]),
    /// ndarray written at protocol 5
    NumpyBuffer(&'a [u8]),
}

fn shard(pixels: Pixels, label_fields: &[(&str, &[i64])]) -> Vec<u8> {
    let mut w = PickleWriter::new();
    w.op(b'}');
    w.op(b'(');
    w.string(b"batch_label");
    w.string(b"training batch 1 of 1");
    w.string(b"data");
    match pixels {
        Pixels::Raw(bytes) => w.string(bytes),
        Pixels::Numpy(bytes) => w.uint8_array(bytes.len() / SAMPLE_BYTES, SAMPLE_BYTES, bytes, false),
        Pixels::NumpyLatin1(bytes) => w.uint8_array(bytes.len() / SAMPLE_BYTES, SAMPLE_BYTES, bytes, true),
        Pixels::NumpyBuffer(bytes) => w.uint8_frombuffer(bytes.len() / SAMPLE_BYTES, SAMPLE_BYTES, bytes),
    }
    for (key, labels) in label_fields {
        w.string(key.as_bytes());
        w.int_list(labels);
    }
    w.op(b'u');
    w.finish()
}

fn meta(key: &str, count: usize) -> Vec<u8> {
    let mut w = PickleWriter::new();
    w.op(b'}');
    w.op(b'(');
    w.string(key.as_bytes());
    w.op(b']');
    w.op(b'(');
    for i in 0..count {
        w.string(format!("class_{}", i).as_bytes());
    }
    w.op(b'e');
    w.op(b'u');
    w.finish()
}

/// Channel-first bytes where every value encodes its sample, channel, row and column.
fn pixel(sample: usize, channel: usize, row: usize, col: usize) -> u8 {
    ((sample * 61 + channel * 17 + row * 3 + col) % 256) as u8
}

fn samples(first: usize, count: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(count * SAMPLE_BYTES);
    for s in first..first + count {
        for c in 0..3 {
            for r in 0..32 {
                for col in 0..32 {
                    data.push(pixel(s, c, r, col));
                }
            }
        }
    }
    data
}

fn write(folder: &Path, name: &str, contents: &[u8]) -> ShardDescriptor {
    let path = folder.join(name);
    fs::write(&path, contents).unwrap();
    ShardDescriptor::new(name, &file_md5(&path).unwrap())
}

struct Fixture {
    dir: TempDir,
    manifest: ShardManifest,
}

impl Fixture {
    fn folder(dir: &TempDir) -> std::path::PathBuf {
        let folder = dir.path().join(BASE_FOLDER);
        fs::create_dir_all(&folder).unwrap();
        folder
    }

    fn new(train: Vec<(&str, Vec<u8>)>, test: Vec<(&str, Vec<u8>)>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let folder = Self::folder(&dir);

        let train = train
            .iter()
            .map(|(name, contents)| write(&folder, name, contents))
            .collect();
        let test = test
            .iter()
            .map(|(name, contents)| write(&folder, name, contents))
            .collect();
        let meta_descriptor = write(&folder, "meta", &meta("fine_label_names", 100));

        let manifest = ShardManifest {
            base_folder: BASE_FOLDER.to_string(),
            archive: ArchiveDescriptor {
                url: "http://127.0.0.1:9/cifar-100-python.tar.gz".to_string(),
                file_name: "cifar-100-python.tar.gz".to_string(),
                checksum: "0".repeat(32),
            },
            train,
            test,
            meta: MetaDescriptor {
                file_name: meta_descriptor.file_name,
                key: "fine_label_names".to_string(),
                checksum: meta_descriptor.checksum,
            },
            num_classes: 100,
        };

        Fixture { dir, manifest }
    }

    fn standard() -> Self {
        Fixture::new(
            vec![
                ("train_a", shard(Pixels::Raw(&samples(0, 2)), &[("labels", &[0, 1])])),
                ("train_b", shard(Pixels::Numpy(&samples(2, 2)), &[("labels", &[2, 3])])),
            ],
            vec![("test", shard(Pixels::Numpy(&samples(10, 3)), &[("fine_labels", &[99, 0, 42])]))],
        )
    }

    fn loader(&self) -> ShardLoader {
        ShardLoader::new(self.dir.path(), self.manifest.clone())
    }

    fn config(&self, image_size: ImageSize) -> Configuration {
        Configuration::default()
            .with_root(self.dir.path())
            .with_image_size(image_size)
    }
}

#[test]
fn two_shards_concatenate_in_order() -> Result<(), Box<dyn Error>> {
    let fixture = Fixture::standard();

    let (images, labels) = fixture.loader().load(Split::Train)?;

    assert_eq!(images.shape(), &[4, 32, 32, 3]);
    assert_eq!(labels.to_vec(), vec![0, 1, 2, 3]);
    for (s, r, col, c) in [(0, 0, 0, 0), (1, 5, 7, 2), (2, 31, 0, 1), (3, 16, 31, 2)] {
        assert_eq!(images[[s, r, col, c]], pixel(s, c, r, col));
    }
    Ok(())
}

#[test]
fn eval_split_reads_its_own_list() -> Result<(), Box<dyn Error>> {
    let fixture = Fixture::standard();

    let (images, labels) = fixture.loader().load(Split::Eval)?;

    assert_eq!(images.shape(), &[3, 32, 32, 3]);
    assert_eq!(labels.to_vec(), vec![99, 0, 42]);
    Ok(())
}

#[test]
fn python3_array_encodings_decode_like_legacy_shards() -> Result<(), Box<dyn Error>> {
    let fixture = Fixture::new(
        vec![
            ("protocol_2", shard(Pixels::NumpyLatin1(&samples(0, 2)), &[("labels", &[0, 1])])),
            ("protocol_5", shard(Pixels::NumpyBuffer(&samples(2, 2)), &[("labels", &[2, 3])])),
        ],
        vec![],
    );

    let (images, labels) = fixture.loader().load(Split::Train)?;

    assert_eq!(images.shape(), &[4, 32, 32, 3]);
    assert_eq!(labels.to_vec(), vec![0, 1, 2, 3]);
    for (s, r, col, c) in [(0, 3, 9, 1), (1, 31, 31, 2), (2, 0, 4, 0), (3, 20, 11, 1)] {
        assert_eq!(images[[s, r, col, c]], pixel(s, c, r, col));
    }
    Ok(())
}

#[test]
fn plain_labels_win_over_fine_labels() -> Result<(), Box<dyn Error>> {
    let both = shard(
        Pixels::Raw(&samples(0, 2)),
        &[("fine_labels", &[7, 8]), ("coarse_labels", &[1, 1]), ("labels", &[5, 6])],
    );
    let fixture = Fixture::new(vec![("train", both)], vec![]);

    let (_, labels) = fixture.loader().load(Split::Train)?;

    assert_eq!(labels.to_vec(), vec![5, 6]);
    Ok(())
}

#[test]
fn integrity_is_checked_before_any_shard_is_read() {
    // the first shard is undecodable, the second fails its checksum
    let mut fixture = Fixture::new(
        vec![
            ("train_a", b"not a pickle".to_vec()),
            ("train_b", shard(Pixels::Raw(&samples(0, 1)), &[("fine_labels", &[0])])),
        ],
        vec![],
    );
    fixture.manifest.train[1].checksum = "f".repeat(32);

    let err = fixture.loader().load(Split::Train).unwrap_err();

    match err {
        BellandeError::DataIntegrity { path, .. } => assert!(path.ends_with("train_b")),
        other => panic!("expected an integrity error, got {}", other),
    }
}

#[test]
fn missing_shard_names_the_download_remedy() {
    let mut fixture = Fixture::standard();
    fixture
        .manifest
        .train
        .insert(0, ShardDescriptor::new("data_batch_0", "0123456789abcdef0123456789abcdef"));

    let err = fixture.loader().load(Split::Train).unwrap_err();

    assert!(matches!(err, BellandeError::DataIntegrity { .. }));
    assert!(err.to_string().contains("download"));
}

#[test]
fn shard_without_labels_is_malformed() {
    let unlabeled = shard(Pixels::Raw(&samples(0, 1)), &[("coarse_labels", &[3])]);
    let fixture = Fixture::new(vec![("train", unlabeled)], vec![]);

    let err = fixture.loader().load(Split::Train).unwrap_err();

    assert!(matches!(err, BellandeError::MalformedShard { .. }));
}

#[test]
fn label_count_must_match_samples() {
    let short = shard(Pixels::Raw(&samples(0, 2)), &[("fine_labels", &[3])]);
    let fixture = Fixture::new(vec![("train", short)], vec![]);

    let err = fixture.loader().load(Split::Train).unwrap_err();

    assert!(matches!(err, BellandeError::MalformedShard { .. }));
}

#[test]
fn metadata_is_loaded_with_the_split() -> Result<(), Box<dyn Error>> {
    let fixture = Fixture::standard();
    let mut source = Cifar100::with_manifest(fixture.dir.path(), fixture.manifest.clone());
    assert!(source.classes().is_none());

    source.load(Split::Eval)?;

    let classes = source.classes().ok_or("classes not loaded")?;
    assert_eq!(classes.len(), 100);
    assert_eq!(classes.class_to_idx["class_42"], 42);
    Ok(())
}

#[test]
fn download_is_skipped_when_files_verify() -> Result<(), Box<dyn Error>> {
    let fixture = Fixture::standard();
    let source = Cifar100::with_manifest(fixture.dir.path(), fixture.manifest.clone());

    // the archive url is unreachable
    source.download()?;
    Ok(())
}

#[test]
fn failed_setup_leaves_no_datasets() -> Result<(), Box<dyn Error>> {
    let mut fixture = Fixture::standard();
    fixture.manifest.test[0].checksum = "f".repeat(32);
    let mut module =
        Cifar100DataModule::with_manifest(fixture.config(ImageSize::Edge(32)), fixture.manifest.clone())?;

    let err = module.setup().unwrap_err();

    assert!(matches!(err, BellandeError::DataIntegrity { .. }));
    assert!(module.train_dataset().is_none());
    assert!(module.test_dataset().is_none());
    Ok(())
}

#[test]
fn datamodule_end_to_end() -> Result<(), Box<dyn Error>> {
    let fixture = Fixture::standard();
    let mut module =
        Cifar100DataModule::with_manifest(fixture.config(ImageSize::Edge(32)), fixture.manifest.clone())?;

    assert_eq!(module.num_classes(), 100);
    assert_eq!(module.num_val(), 0);
    assert!(module.warnings().is_empty());

    module.prepare_data()?;
    module.setup()?;

    let train = module.train_dataset().ok_or("train split missing")?;
    let test = module.test_dataset().ok_or("test split missing")?;
    assert_eq!(train.len(), 4);
    assert_eq!(test.len(), 3);
    assert_eq!(train.classes().names[0], "class_0");

    let (image, label) = train.get(3)?;
    assert_eq!(label, 3);
    assert_eq!(image.dimensions(), (32, 32));
    assert_eq!(image.get_pixel(4, 9).0, [pixel(3, 0, 9, 4), pixel(3, 1, 9, 4), pixel(3, 2, 9, 4)]);

    assert!(matches!(
        train.get(4),
        Err(BellandeError::IndexOutOfBounds { index: 4, len: 4 })
    ));

    let pipeline = module.default_transforms();
    let (first, _) = test.get_transformed(1, &pipeline)?;
    let (second, _) = test.get_transformed(1, &pipeline)?;
    assert_eq!(first.shape(), &[3, 32, 32]);
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn non_native_size_warns_once_and_resizes() -> Result<(), Box<dyn Error>> {
    let fixture = Fixture::standard();
    let mut module =
        Cifar100DataModule::with_manifest(fixture.config(ImageSize::Edge(64)), fixture.manifest.clone())?;
    assert_eq!(module.warnings().len(), 1);

    module.setup()?;
    assert_eq!(module.warnings().len(), 1);

    let train = module.train_dataset().ok_or("train split missing")?;
    let (augmented, _) = train.get_transformed(0, &module.augmented_transforms())?;
    let (default, _) = train.get_transformed(0, &module.default_transforms())?;
    assert_eq!(augmented.shape(), &[3, 64, 64]);
    assert_eq!(default.shape(), &[3, 64, 64]);
    Ok(())
}

#[test]
fn seeded_modules_augment_identically() -> Result<(), Box<dyn Error>> {
    let fixture = Fixture::standard();
    let mut config = fixture.config(ImageSize::Edge(32));
    config.system.seed = Some(17);

    let mut module = Cifar100DataModule::with_manifest(config.clone(), fixture.manifest.clone())?;
    module.setup()?;
    let (first, _) = module
        .train_dataset()
        .ok_or("train split missing")?
        .get_transformed(2, &module.augmented_transforms())?;

    let mut module = Cifar100DataModule::with_manifest(config, fixture.manifest.clone())?;
    module.setup()?;
    let (second, _) = module
        .train_dataset()
        .ok_or("train split missing")?
        .get_transformed(2, &module.augmented_transforms())?;

    assert_eq!(first, second);
    Ok(())
}

#[test]
fn builds_from_config_file() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("cifar100.yaml");
    fs::write(&path, "image_size: 64\nbatch_size: 256\ndata:\n  root: /tmp/cifar\n")?;

    let module = bellande_cifar100_datamodule::from_config_file(&path)?;

    assert_eq!(module.image_size(), ImageSize::Edge(64));
    assert_eq!(module.batch_size(), 256);
    assert_eq!(module.warnings().len(), 1);
    Ok(())
}
