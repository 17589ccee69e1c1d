//! Filesystem cache bin: one `.bin`/`.meta` file pair per entry, the entry
//! timestamp being the data file's mtime.

use super::{CacheBin, CacheEntry};
use anyhow::{Context, Result};
use log::warn;
use std::{
	fs::{File, create_dir_all, read, read_dir, write},
	path::{Path, PathBuf},
	time::SystemTime,
};
use tilefetch_core::{Blob, Config};

/// A cache bin persisted under one directory.
pub struct DiskCacheBin {
	path: PathBuf,
}

impl DiskCacheBin {
	pub fn new(path: impl Into<PathBuf>) -> Result<DiskCacheBin> {
		let path = path.into();
		create_dir_all(&path).with_context(|| format!("while creating cache directory {path:?}"))?;
		Ok(DiskCacheBin { path })
	}

	/// Builds a safe file name: alphanumerics and a few punctuation
	/// characters pass through, everything else is `%`-hex encoded.
	fn entry_path(&self, key: &str, extension: &str) -> PathBuf {
		let name: String = key
			.bytes()
			.map(|b| {
				if (b as char).is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-' {
					(b as char).to_string()
				} else {
					format!("%{b:02x}")
				}
			})
			.collect();
		self.path.join(format!("{name}.{extension}"))
	}

	fn read_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
		let data_path = self.entry_path(key, "bin");
		if !data_path.exists() {
			return Ok(None);
		}
		let data = read(&data_path).with_context(|| format!("while reading {data_path:?}"))?;
		let stamp = data_path.metadata()?.modified()?;

		let meta_path = self.entry_path(key, "meta");
		let meta = if meta_path.exists() {
			Config::from_json(&String::from_utf8(read(&meta_path)?)?)?
		} else {
			Config::new("response")
		};

		Ok(Some(CacheEntry::hit(Blob::from(data), meta, stamp)))
	}
}

impl CacheBin for DiskCacheBin {
	fn read(&self, key: &str) -> CacheEntry {
		match self.read_entry(key) {
			Ok(Some(entry)) => entry,
			Ok(None) => CacheEntry::miss(),
			Err(error) => {
				warn!("cache read failed for \"{key}\": {error}");
				CacheEntry::error()
			}
		}
	}

	fn write(&self, key: &str, data: &Blob, meta: &Config) -> Result<()> {
		write(self.entry_path(key, "meta"), meta.to_json_string())?;
		write(self.entry_path(key, "bin"), data.as_slice())?;
		Ok(())
	}

	fn touch(&self, key: &str) -> Result<()> {
		let data_path = self.entry_path(key, "bin");
		let file = File::options()
			.write(true)
			.open(&data_path)
			.with_context(|| format!("cannot touch missing cache entry \"{key}\""))?;
		file.set_modified(SystemTime::now())?;
		Ok(())
	}

	fn read_metadata(&self, key: &str) -> Option<Config> {
		let meta_path = self.entry_path(key, "meta");
		let text = String::from_utf8(read(meta_path).ok()?).ok()?;
		Config::from_json(&text).ok()
	}

	fn entry_count(&self) -> usize {
		count_data_files(&self.path).unwrap_or(0)
	}
}

fn count_data_files(path: &Path) -> Result<usize> {
	let mut count = 0;
	for entry in read_dir(path)? {
		let entry = entry?;
		if entry.path().extension().is_some_and(|e| e == "bin") {
			count += 1;
		}
	}
	Ok(count)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;
	use tempfile::TempDir;

	fn new_bin() -> (TempDir, DiskCacheBin) {
		let dir = tempfile::tempdir().expect("tempdir");
		let bin = DiskCacheBin::new(dir.path().join("cache")).unwrap();
		(dir, bin)
	}

	#[test]
	fn entry_path_encodes_non_alnum() {
		let (_tmp, bin) = new_bin();
		let path = bin.entry_path("http://ex/a b.png", "bin");
		assert_eq!(
			path.file_name().unwrap().to_str().unwrap(),
			"http%3a%2f%2fex%2fa%20b.png.bin"
		);
	}

	#[test]
	fn write_read_roundtrip() {
		let (_tmp, bin) = new_bin();
		let mut meta = Config::new("response");
		meta.set("content-type", "image/png");
		bin.write("http://ex/a.png", &Blob::from(&[1u8, 2, 3]), &meta).unwrap();

		let entry = bin.read("http://ex/a.png");
		assert!(entry.is_hit());
		assert_eq!(entry.data.unwrap().as_slice(), &[1, 2, 3]);
		assert_eq!(entry.meta.unwrap().get("content-type"), Some("image/png"));
		assert_eq!(bin.entry_count(), 1);
	}

	#[test]
	fn miss_and_touch_missing() {
		let (_tmp, bin) = new_bin();
		assert!(!bin.read("absent").is_hit());
		assert!(bin.touch("absent").is_err());
	}

	#[test]
	fn touch_updates_mtime_only() {
		let (_tmp, bin) = new_bin();
		bin.write("k", &Blob::from("payload"), &Config::new("response")).unwrap();
		let before = bin.read("k").stamp.unwrap();

		std::thread::sleep(Duration::from_millis(20));
		bin.touch("k").unwrap();

		let entry = bin.read("k");
		assert!(entry.stamp.unwrap() > before);
		assert_eq!(entry.data.unwrap().as_str().unwrap(), "payload");
	}
}
