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
use crate::data::shard::{check_integrity, ArchiveDescriptor};
use crate::utilities::progress::ProgressBar;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tar::Archive;
use tracing::info;

/// Fetches a `.tar.gz` distribution archive and unpacks it under `root`.
#[derive(Debug, Clone)]
pub struct ArchiveDownloader {
    root: PathBuf,
    archive: ArchiveDescriptor,
    show_progress: bool,
}

impl ArchiveDownloader {
    pub fn new<P: Into<PathBuf>>(root: P, archive: ArchiveDescriptor) -> Self {
        ArchiveDownloader {
            root: root.into(),
            archive,
            show_progress: true,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn archive_path(&self) -> PathBuf {
        self.root.join(&self.archive.file_name)
    }

    /// Downloads the archive unless a verified copy is already present, then extracts it.
    pub fn download_and_extract(&self) -> Result<(), BellandeError> {
        let path = self.archive_path();
        if check_integrity(&path, &self.archive.checksum).is_ok() {
            info!("Using already downloaded and verified archive {:?}", path);
        } else {
            self.fetch(&path)?;
        }

        extract_archive(&path, &self.root)
    }

    fn fetch(&self, path: &Path) -> Result<(), BellandeError> {
        fs::create_dir_all(&self.root)?;
        info!("Downloading {} to {:?}", self.archive.url, path);

        let response = ureq::get(&self.archive.url).call()?;
        let total = response
            .header("Content-Length")
            .and_then(|len| len.parse::<u64>().ok())
            .unwrap_or(0);

        self.store(response.into_reader(), total, path)?;
        info!("Downloaded and verified {:?}", path);
        Ok(())
    }

    /// Writes the stream beside `path` and renames it into place once its checksum matches.
    /// The partial file is removed on any failure.
    fn store<R: Read>(&self, reader: R, total: u64, path: &Path) -> Result<(), BellandeError> {
        let partial = path.with_extension("part");
        let written = self.write_partial(reader, total, &partial);
        let actual = match written {
            Ok(digest) => format!("{:x}", digest),
            Err(e) => {
                let _ = fs::remove_file(&partial);
                return Err(e);
            }
        };

        if !actual.eq_ignore_ascii_case(&self.archive.checksum) {
            fs::remove_file(&partial)?;
            return Err(BellandeError::Download(format!(
                "checksum {} of {} does not match expected {}",
                actual, self.archive.url, self.archive.checksum
            )));
        }

        fs::rename(&partial, path)?;
        Ok(())
    }

    /// Streams `reader` into `partial`, returning the MD5 of what was written.
    fn write_partial<R: Read>(&self, mut reader: R, total: u64, partial: &Path) -> Result<md5::Digest, BellandeError> {
        let mut writer = BufWriter::new(File::create(partial)?);
        let mut context = md5::Context::new();
        let mut progress = self.show_progress.then(|| ProgressBar::new(total));
        let mut buffer = vec![0u8; 64 * 1024];

        loop {
            let read = reader.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            context.consume(&buffer[..read]);
            writer.write_all(&buffer[..read])?;
            if let Some(bar) = progress.as_mut() {
                bar.update(read as u64);
            }
        }
        writer.flush()?;
        if let Some(bar) = progress.as_mut() {
            bar.finish();
        }
        Ok(context.compute())
    }
}

/// Unpacks a gzip-compressed tarball into `destination`.
pub fn extract_archive(archive: &Path, destination: &Path) -> Result<(), BellandeError> {
    info!("Extracting {:?} to {:?}", archive, destination);
    let file = BufReader::new(File::open(archive)?);
    let mut archive = Archive::new(GzDecoder::new(file));
    archive.unpack(destination)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn write_tarball(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        for (name, contents) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *contents).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn extracts_nested_entries() {
        let dir = tempfile::tempdir().unwrap();
        let tarball = dir.path().join("bundle.tar.gz");
        write_tarball(
            &tarball,
            &[("cifar-100-python/meta", b"meta"), ("cifar-100-python/test", b"test")],
        );

        let out = dir.path().join("out");
        extract_archive(&tarball, &out).unwrap();

        assert_eq!(fs::read(out.join("cifar-100-python/meta")).unwrap(), b"meta");
        assert_eq!(fs::read(out.join("cifar-100-python/test")).unwrap(), b"test");
    }

    #[test]
    fn verified_archive_is_not_fetched_again() {
        let dir = tempfile::tempdir().unwrap();
        let tarball = dir.path().join("bundle.tar.gz");
        write_tarball(&tarball, &[("folder/train", b"train")]);
        let checksum = crate::data::shard::file_md5(&tarball).unwrap();

        // the url is unreachable, so this only succeeds without a fetch
        let downloader = ArchiveDownloader::new(
            dir.path(),
            ArchiveDescriptor {
                url: "http://127.0.0.1:9/bundle.tar.gz".to_string(),
                file_name: "bundle.tar.gz".to_string(),
                checksum,
            },
        )
        .with_progress(false);

        downloader.download_and_extract().unwrap();
        assert_eq!(fs::read(dir.path().join("folder/train")).unwrap(), b"train");
    }

    /// Yields one chunk, then fails like a dropped connection.
    struct BrokenStream {
        sent: bool,
    }

    impl Read for BrokenStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.sent {
                return Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"));
            }
            self.sent = true;
            buf[..4].copy_from_slice(b"part");
            Ok(4)
        }
    }

    #[test]
    fn interrupted_stream_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = ArchiveDownloader::new(
            dir.path(),
            ArchiveDescriptor {
                url: "http://127.0.0.1:9/bundle.tar.gz".to_string(),
                file_name: "bundle.tar.gz".to_string(),
                checksum: "0".repeat(32),
            },
        )
        .with_progress(false);
        let path = downloader.archive_path();
        let partial = path.with_extension("part");

        let err = downloader.store(BrokenStream { sent: false }, 0, &path).unwrap_err();
        assert!(matches!(err, BellandeError::IOError(_)));
        assert!(!partial.exists());
        assert!(!path.exists());

        // a complete stream with the wrong checksum is discarded as well
        let err = downloader.store(&b"payload"[..], 7, &path).unwrap_err();
        assert!(matches!(err, BellandeError::Download(_)));
        assert!(!partial.exists());
    }
}
