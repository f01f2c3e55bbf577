use std::{
    collections::VecDeque,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};

use serde::{Deserialize, Serialize};

use crate::{CoreError, MAX_PENDING_FILE_BYTES, message::InboundMessage};

#[derive(Debug, Default, Serialize, Deserialize)]
struct PendingFile {
    #[serde(default)]
    entries: Vec<InboundMessage>,
}

/// Messages waiting for the app to become active.
///
/// Bounded FIFO; with a capacity of 1 a new message replaces the undelivered one.
/// When a path is configured every mutation is written through to disk before
/// returning, so the content survives the process being suspended or restarted.
#[derive(Debug)]
pub struct PendingStore {
    capacity: usize,
    path: Option<PathBuf>,
    entries: Mutex<VecDeque<InboundMessage>>,
}

impl PendingStore {
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            path: None,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Opens the store at `path`, loading whatever a previous process left behind.
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> Result<Self, CoreError> {
        let path = path.into();
        let capacity = capacity.max(1);
        let mut entries: VecDeque<InboundMessage> = load_pending_from_path(&path)?.into();
        while entries.len() > capacity {
            entries.pop_front();
        }

        Ok(Self {
            capacity,
            path: Some(path),
            entries: Mutex::new(entries),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Appends `message`, evicting the oldest entry when full.
    ///
    /// The in-memory copy is updated even when the disk write fails, so the message
    /// is still drained by this process. Returns the evicted entry, if any.
    pub fn push(&self, message: InboundMessage) -> Result<Option<InboundMessage>, CoreError> {
        let mut entries = self.lock();
        let evicted = if entries.len() >= self.capacity {
            entries.pop_front()
        } else {
            None
        };
        entries.push_back(message);
        self.persist(&entries)?;
        Ok(evicted)
    }

    /// Oldest-first copy of the outstanding messages.
    pub fn snapshot(&self) -> Vec<InboundMessage> {
        self.lock().iter().cloned().collect()
    }

    pub fn clear(&self) -> Result<(), CoreError> {
        let mut entries = self.lock();
        if entries.is_empty() {
            return Ok(());
        }
        entries.clear();
        self.persist(&entries)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<InboundMessage>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, entries: &VecDeque<InboundMessage>) -> Result<(), CoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = PendingFile {
            entries: entries.iter().cloned().collect(),
        };
        save_pending_to_path(path, &file)
    }
}

fn load_pending_from_path(path: &Path) -> Result<Vec<InboundMessage>, CoreError> {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(CoreError::StoreRead {
                path: path.to_owned(),
                source,
            });
        }
    };
    if meta.len() > MAX_PENDING_FILE_BYTES {
        return Err(CoreError::StoreTooLarge {
            size: meta.len(),
            max: MAX_PENDING_FILE_BYTES,
        });
    }

    let data = fs::read_to_string(path).map_err(|source| CoreError::StoreRead {
        path: path.to_owned(),
        source,
    })?;
    let file: PendingFile =
        serde_json::from_str(&data).map_err(|err| CoreError::Serialization(err.to_string()))?;
    Ok(file.entries)
}

fn save_pending_to_path(path: &Path, file: &PendingFile) -> Result<(), CoreError> {
    let write_err = |source: io::Error| CoreError::StoreWrite {
        path: path.to_owned(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(write_err)?;
    }

    let payload =
        serde_json::to_vec_pretty(file).map_err(|err| CoreError::Serialization(err.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    let mut out = fs::File::create(&tmp).map_err(write_err)?;
    out.write_all(&payload).map_err(write_err)?;
    out.sync_all().map_err(write_err)?;
    drop(out);

    fs::rename(&tmp, path).map_err(write_err)
}
