/// Byte fetching for sound files
///
/// Loading is asynchronous: the bus hands a [`FetchReply`] to the loader and
/// picks up the finished [`FetchResult`] on its next `update`. Decoding stays
/// on the bus thread.
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::RwLock;

use super::emitter::EmitId;
use super::sound::SoundId;
use crate::error::AudioError;

/// Who asked for a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requester {
    Sound(SoundId),
    Emit(EmitId),
}

/// A completed fetch, delivered to the bus
#[derive(Debug)]
pub struct FetchResult {
    pub path: String,
    pub requester: Requester,
    pub bytes: Result<Arc<Vec<u8>>, AudioError>,
}

/// One-shot reply slot handed to a [`SoundLoader`]
#[derive(Debug)]
pub struct FetchReply {
    sender: Sender<FetchResult>,
    path: String,
    requester: Requester,
}

impl FetchReply {
    pub(crate) fn new(sender: Sender<FetchResult>, path: &str, requester: Requester) -> Self {
        Self {
            sender,
            path: path.to_string(),
            requester,
        }
    }

    /// Path that was requested
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Deliver the fetched bytes (or the failure) to the bus
    pub fn send(self, bytes: Result<Arc<Vec<u8>>, AudioError>) {
        let result = FetchResult {
            path: self.path,
            requester: self.requester,
            bytes,
        };

        // The bus may already be gone; nothing is waiting for the result then
        if self.sender.send(result).is_err() {
            tracing::debug!("Dropped fetch result, bus no longer listening");
        }
    }
}

/// Source of raw sound file bytes
pub trait SoundLoader {
    /// Start fetching `path`; answer through `reply` from any thread
    fn fetch(&self, path: &str, reply: FetchReply);
}

/// Reads files below a root directory on the rayon thread pool
#[derive(Debug, Clone)]
pub struct FileLoader {
    root: PathBuf,
}

impl FileLoader {
    /// Create a new loader resolving paths against `root`
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for FileLoader {
    fn default() -> Self {
        Self::new(".")
    }
}

impl SoundLoader for FileLoader {
    fn fetch(&self, path: &str, reply: FetchReply) {
        let full_path = self.root.join(path);

        rayon::spawn(move || {
            let bytes = match std::fs::read(&full_path) {
                Ok(bytes) => {
                    tracing::info!("Read {} ({} bytes)", full_path.display(), bytes.len());
                    Ok(Arc::new(bytes))
                }
                Err(e) => Err(AudioError::LoadFailed {
                    path: full_path.display().to_string(),
                    source: Box::new(e),
                }),
            };
            reply.send(bytes);
        });
    }
}

/// Serves preloaded bytes from memory, answering immediately
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    files: Arc<RwLock<HashMap<String, Arc<Vec<u8>>>>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the bytes served for `path`
    pub fn insert(&self, path: &str, bytes: Vec<u8>) {
        self.files.write().insert(path.to_string(), Arc::new(bytes));
    }

    pub fn remove(&self, path: &str) -> bool {
        self.files.write().remove(path).is_some()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.read().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

impl SoundLoader for MemoryLoader {
    fn fetch(&self, path: &str, reply: FetchReply) {
        let bytes = self.files.read().get(path).cloned();

        match bytes {
            Some(bytes) => reply.send(Ok(bytes)),
            None => reply.send(Err(AudioError::LoadFailed {
                path: path.to_string(),
                source: Box::new(io::Error::new(io::ErrorKind::NotFound, "not registered")),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::time::Duration;

    fn requester() -> Requester {
        Requester::Emit(EmitId(7))
    }

    #[test]
    fn test_memory_loader_replies_immediately() {
        let (sender, receiver) = unbounded();
        let loader = MemoryLoader::new();
        loader.insert("a.wav", vec![1, 2, 3]);

        loader.fetch("a.wav", FetchReply::new(sender, "a.wav", requester()));
        let result = receiver.try_recv().unwrap();

        assert_eq!(result.path, "a.wav");
        assert_eq!(result.requester, requester());
        assert_eq!(result.bytes.unwrap().as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_memory_loader_missing_path() {
        let (sender, receiver) = unbounded();
        let loader = MemoryLoader::new();

        loader.fetch("missing.wav", FetchReply::new(sender, "missing.wav", requester()));
        let result = receiver.try_recv().unwrap();
        assert!(matches!(result.bytes, Err(AudioError::LoadFailed { .. })));
    }

    #[test]
    fn test_memory_loader_shared_table() {
        let loader = MemoryLoader::new();
        let clone = loader.clone();
        clone.insert("b.wav", vec![0]);

        assert!(loader.contains("b.wav"));
        assert_eq!(loader.len(), 1);
        assert!(loader.remove("b.wav"));
        assert!(clone.is_empty());
    }

    #[test]
    fn test_file_loader_reports_missing_file() {
        let (sender, receiver) = unbounded();
        let loader = FileLoader::new(std::env::temp_dir());

        loader.fetch(
            "soundbus-does-not-exist.wav",
            FetchReply::new(sender, "soundbus-does-not-exist.wav", requester()),
        );
        let result = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(result.bytes.is_err());
    }

    #[test]
    fn test_reply_to_dropped_bus_is_ignored() {
        let (sender, receiver) = unbounded();
        drop(receiver);
        FetchReply::new(sender, "x", requester()).send(Ok(Arc::new(Vec::new())));
    }
}
