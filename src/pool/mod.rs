//! Credential pool: the durable, concurrency-safe set of upstream tokens.
//!
//! The pool owns both the in-memory sequence and its flat-file backing store.
//! All mutations go through [`CredentialPool::append`] and
//! [`CredentialPool::clear`], which hold a single writer lock around the
//! file write and the in-memory swap. Readers take an `Arc` snapshot of the
//! sequence and never block writers for longer than the swap.

mod credential;
mod store;

pub use credential::Credential;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Errors surfaced by credential pool operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Credential store '{path}' I/O failed: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "Cannot read credential store at '{primary}' ({primary_error}) or fallback '{fallback}': {source}"
    )]
    Unreadable {
        primary: String,
        primary_error: std::io::Error,
        fallback: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid credential: {0}")]
    InvalidArgument(String),
}

/// Ordered, file-backed pool of upstream credentials.
pub struct CredentialPool {
    /// Backing store actually read at load time.
    path: PathBuf,
    credentials: RwLock<Arc<Vec<Credential>>>,
    /// Serializes every access to the backing file.
    write_lock: Mutex<()>,
    /// Round-robin selection cursor.
    cursor: AtomicUsize,
}

impl CredentialPool {
    /// Load the pool from `primary`, falling back to `fallback` if the
    /// primary store cannot be read.
    ///
    /// The path that was read becomes the backing store for every later
    /// operation. An empty store is a valid (if useless) pool; callers should
    /// check [`is_empty`](Self::is_empty).
    pub fn load(primary: impl AsRef<Path>, fallback: impl AsRef<Path>) -> Result<Self, PoolError> {
        let primary = primary.as_ref();
        let fallback = fallback.as_ref();

        let (path, content) = match store::read(primary) {
            Ok(content) => (primary.to_path_buf(), content),
            Err(primary_error) => match store::read(fallback) {
                Ok(content) => (fallback.to_path_buf(), content),
                Err(source) => {
                    return Err(PoolError::Unreadable {
                        primary: primary.display().to_string(),
                        primary_error,
                        fallback: fallback.display().to_string(),
                        source,
                    })
                }
            },
        };

        Ok(Self {
            path,
            credentials: RwLock::new(Arc::new(store::parse(&content))),
            write_lock: Mutex::new(()),
            cursor: AtomicUsize::new(0),
        })
    }

    /// Re-read the backing store, replacing the in-memory sequence.
    pub fn reload(&self) -> Result<Arc<Vec<Credential>>, PoolError> {
        let _guard = self.lock_store();
        let content = store::read(&self.path).map_err(|e| self.io_error(e))?;
        let loaded = Arc::new(store::parse(&content));
        self.replace(loaded.clone());
        Ok(loaded)
    }

    /// Raw store content, verbatim.
    pub fn list(&self) -> Result<String, PoolError> {
        let _guard = self.lock_store();
        store::read(&self.path).map_err(|e| self.io_error(e))
    }

    /// Append one credential to the store and the in-memory sequence.
    ///
    /// Surrounding whitespace is trimmed. Empty tokens and tokens spanning
    /// more than one line are rejected. Duplicates are accepted.
    pub fn append(&self, token: &str) -> Result<(), PoolError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(PoolError::InvalidArgument(
                "token must not be empty".to_string(),
            ));
        }
        if token.contains(['\n', '\r']) {
            return Err(PoolError::InvalidArgument(
                "token must be a single line".to_string(),
            ));
        }

        let _guard = self.lock_store();
        store::append_line(&self.path, token).map_err(|e| self.io_error(e))?;

        let current = self.snapshot();
        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(Credential::from(token));
        self.replace(Arc::new(next));
        Ok(())
    }

    /// Truncate the store and drop every in-memory credential.
    pub fn clear(&self) -> Result<(), PoolError> {
        let _guard = self.lock_store();
        store::truncate(&self.path).map_err(|e| self.io_error(e))?;
        self.replace(Arc::new(Vec::new()));
        Ok(())
    }

    /// Pick the next credential in round-robin order.
    ///
    /// Returns `None` when the pool is empty.
    pub fn select(&self) -> Option<Credential> {
        let snapshot = self.snapshot();
        if snapshot.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % snapshot.len();
        Some(snapshot[index].clone())
    }

    /// Consistent view of the current sequence.
    pub fn snapshot(&self) -> Arc<Vec<Credential>> {
        self.credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Backing store path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_store(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn replace(&self, next: Arc<Vec<Credential>>) {
        *self
            .credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner) = next;
    }

    fn io_error(&self, source: std::io::Error) -> PoolError {
        PoolError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl std::fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPool")
            .field("path", &self.path)
            .field("len", &self.len())
            .finish()
    }
}
