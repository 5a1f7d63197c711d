use std::{
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use log::{debug, info};
use rmp_serde::{Deserializer, Serializer};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    offset_store::{GetResult, OffsetError, OffsetStore, PutResult, SubscriberOffset},
    utils::now_epoc_millis,
};

const FILE_EXTENSION: &str = "offset";
const TEMP_EXTENSION: &str = "offset.tmp";

/// Longest hex encoded stem used as is, longer stems are replaced by a digest so the
/// file name stays well inside the usual 255 byte limit
const MAX_HEX_STEM_LENGTH: usize = 200;

/// Keeps one MessagePack file per (topic, subscriber) in a directory. A new value is
/// written to a temporary file, synced and then renamed over the old one, so readers
/// see either the previous offset or the new one and never a partial write.
pub struct FileSystemOffsetStore {
    directory: PathBuf,
}

impl FileSystemOffsetStore {
    pub fn new(directory: &Path) -> Result<Self, OffsetError> {
        fs::create_dir_all(directory).map_err(|err| OffsetError::Error {
            msg: format!("Unable to create {}: {err}", directory.display()),
        })?;
        info!("FileSystemOffsetStore: Using {}", directory.display());

        Ok(Self {
            directory: directory.to_owned(),
        })
    }

    /// Reads the whole record, including when it was committed
    pub fn load(self: &Self, topic: &str, subscriber: &str) -> Result<Option<SubscriberOffset>, OffsetError> {
        let path = self.file_path(topic, subscriber, FILE_EXTENSION);
        let buffer = match fs::read(&path) {
            Ok(buffer) => buffer,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(OffsetError::Error {
                    msg: format!("Unable to read {}: {err}", path.display()),
                })
            }
        };

        let corrupt = |msg: String| OffsetError::Corrupt {
            topic: topic.to_owned(),
            subscriber: subscriber.to_owned(),
            msg,
        };

        let mut deserializer = Deserializer::new(&buffer[..]);
        let offset: SubscriberOffset =
            Deserialize::deserialize(&mut deserializer).map_err(|err| corrupt(format!("{err}")))?;

        if offset.topic != topic || offset.subscriber != subscriber {
            return Err(corrupt(format!(
                "file contains the offset for {}/{}",
                offset.topic, offset.subscriber
            )));
        }

        Ok(Some(offset))
    }

    fn file_path(self: &Self, topic: &str, subscriber: &str, extension: &str) -> PathBuf {
        self.directory.join(format!("{}.{extension}", file_stem(topic, subscriber)))
    }

    fn write_file(path: &Path, buffer: &[u8]) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_all(buffer)?;
        file.sync_all()
    }

    /// Makes the rename itself durable
    #[cfg(unix)]
    fn sync_directory(self: &Self) -> std::io::Result<()> {
        File::open(&self.directory)?.sync_all()
    }

    #[cfg(not(unix))]
    fn sync_directory(self: &Self) -> std::io::Result<()> {
        Ok(())
    }
}

// Topic and subscriber names are arbitrary strings, hex keeps them safe as file names
fn to_hex(name: &str) -> String {
    name.bytes().map(|byte| format!("{byte:02x}")).collect()
}

// The record inside the file names its topic and subscriber, so `load` detects a
// digest collision as a corrupt file
fn file_stem(topic: &str, subscriber: &str) -> String {
    let stem = format!("{}-{}", to_hex(topic), to_hex(subscriber));
    if stem.len() <= MAX_HEX_STEM_LENGTH {
        return stem;
    }

    let mut hasher = Sha256::new();
    hasher.update(topic.as_bytes());
    hasher.update([0u8]);
    hasher.update(subscriber.as_bytes());
    format!("sha256-{:x}", hasher.finalize())
}

impl OffsetStore for FileSystemOffsetStore {
    fn get(self: &Self, topic: &str, subscriber: &str) -> GetResult {
        Ok(self.load(topic, subscriber)?.map(|offset| offset.last_id))
    }

    fn put(self: &Self, topic: &str, subscriber: &str, message_id: &str) -> PutResult {
        let offset = SubscriberOffset::new(topic, subscriber, message_id, now_epoc_millis());

        let mut buffer = Vec::new();
        let mut serializer = Serializer::new(&mut buffer);
        offset
            .serialize(&mut serializer)
            .map_err(|err| OffsetError::Error { msg: format!("{err}") })?;

        let temp_path = self.file_path(topic, subscriber, TEMP_EXTENSION);
        let path = self.file_path(topic, subscriber, FILE_EXTENSION);

        Self::write_file(&temp_path, &buffer).map_err(|err| OffsetError::Error {
            msg: format!("Unable to write {}: {err}", temp_path.display()),
        })?;
        fs::rename(&temp_path, &path).map_err(|err| OffsetError::Error {
            msg: format!("Unable to replace {}: {err}", path.display()),
        })?;
        self.sync_directory().map_err(|err| OffsetError::Error {
            msg: format!("Unable to sync {}: {err}", self.directory.display()),
        })?;

        #[cfg(debug_assertions)]
        debug!(
            "FileSystemOffsetStore: {topic}/{subscriber} => {message_id} at {}",
            offset.committed_at()
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{file_stem, FileSystemOffsetStore, MAX_HEX_STEM_LENGTH};
    use crate::offset_store::{OffsetError, OffsetStore};

    #[test]
    fn should_keep_short_names_readable() {
        assert_eq!(file_stem("t", "s"), "74-73");
    }

    #[test]
    fn should_digest_long_names() {
        let topic = "program-status-".repeat(10);
        let stem = file_stem(&topic, "runtime-monitor");

        assert!(stem.starts_with("sha256-"));
        assert_eq!(stem.len(), "sha256-".len() + 64);
        assert_ne!(stem, file_stem(&topic, "other-monitor"));
        assert_ne!(file_stem(&"a".repeat(MAX_HEX_STEM_LENGTH), "b"), file_stem(&"a".repeat(MAX_HEX_STEM_LENGTH), "c"));
    }

    #[test]
    fn should_store_offsets_for_long_names() {
        let directory = tempfile::tempdir().unwrap();
        let store = FileSystemOffsetStore::new(directory.path()).unwrap();
        let topic = "t".repeat(300);
        let subscriber = "s".repeat(300);

        store.put(&topic, &subscriber, "7").unwrap();

        assert_eq!(store.get(&topic, &subscriber).unwrap(), Some("7".to_owned()));
        assert_eq!(store.get(&topic, "s").unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn should_report_directory_sync_failure() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("offsets");
        let store = FileSystemOffsetStore::new(&path).unwrap();

        std::fs::remove_dir_all(&path).unwrap();

        assert!(store.sync_directory().is_err());
        assert!(matches!(store.put("t", "s", "1"), Err(OffsetError::Error { .. })));
    }
}
