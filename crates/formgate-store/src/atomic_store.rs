//! Lock-scoped atomic mutation helpers for the JSONL store.

use crate::{MemoryStore, MemoryStoreError};
use chrono::Utc;
use std::error::Error as StdError;
use std::ffi::OsString;
use std::fmt::{Display, Formatter};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Poll interval while waiting for a busy store lock.
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub fn store_lock_path(store_path: &Path) -> PathBuf {
    let mut path: OsString = store_path.as_os_str().to_os_string();
    path.push(".lock");
    PathBuf::from(path)
}

#[derive(Debug)]
pub enum AtomicStoreMutationError<E> {
    LockBusy { lock_path: String },
    LockIo { lock_path: String, message: String },
    Store(MemoryStoreError),
    Mutation(E),
}

impl<E> AtomicStoreMutationError<E> {
    /// Re-type a lock or store failure for a different mutation error.
    pub fn map_mutation<F>(self, f: impl FnOnce(E) -> F) -> AtomicStoreMutationError<F> {
        match self {
            Self::LockBusy { lock_path } => AtomicStoreMutationError::LockBusy { lock_path },
            Self::LockIo { lock_path, message } => {
                AtomicStoreMutationError::LockIo { lock_path, message }
            }
            Self::Store(source) => AtomicStoreMutationError::Store(source),
            Self::Mutation(err) => AtomicStoreMutationError::Mutation(f(err)),
        }
    }

    fn lock_busy(lock_path: &Path) -> Self {
        Self::LockBusy {
            lock_path: lock_path.display().to_string(),
        }
    }

    fn lock_io(lock_path: &Path, message: impl Into<String>) -> Self {
        Self::LockIo {
            lock_path: lock_path.display().to_string(),
            message: message.into(),
        }
    }
}

impl<E: Display> Display for AtomicStoreMutationError<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LockBusy { lock_path } => write!(f, "form store lock busy: {lock_path}"),
            Self::LockIo { lock_path, message } => {
                write!(f, "failed to acquire form store lock {lock_path}: {message}")
            }
            Self::Store(err) => write!(f, "{err}"),
            Self::Mutation(err) => write!(f, "{err}"),
        }
    }
}

impl<E> StdError for AtomicStoreMutationError<E> where
    E: Display + std::fmt::Debug + StdError + 'static
{
}

/// Execute one lock-scoped store mutation against a JSONL path.
///
/// A busy lock is waited on for at most `wait`.
///
/// The mutator returns `(value, changed)` where:
/// - `value` is returned to the caller
/// - `changed=true` persists the store to JSONL before lock release.
pub fn mutate_store_jsonl<T, E, F>(
    path: impl AsRef<Path>,
    wait: Duration,
    mutator: F,
) -> Result<T, AtomicStoreMutationError<E>>
where
    F: FnOnce(&mut MemoryStore) -> Result<(T, bool), E>,
{
    let path = path.as_ref();
    let _guard = StoreLock::acquire_within(path, wait)
        .map_err(|err| err.map_mutation::<E>(|never| match never {}))?;

    let mut store = MemoryStore::load_jsonl(path).map_err(AtomicStoreMutationError::Store)?;
    let (value, changed) = mutator(&mut store).map_err(AtomicStoreMutationError::Mutation)?;
    if changed {
        store
            .save_jsonl(path)
            .map_err(AtomicStoreMutationError::Store)?;
    }
    Ok(value)
}

/// Read a snapshot of the store.
///
/// Takes no lock: writes replace the file by rename, so a reader sees
/// either the previous or the next complete store.
pub fn read_store_jsonl(
    path: impl AsRef<Path>,
) -> Result<MemoryStore, AtomicStoreMutationError<std::convert::Infallible>> {
    MemoryStore::load_jsonl(path).map_err(AtomicStoreMutationError::Store)
}

/// Exclusive writer lock over a store file, released on drop.
#[derive(Debug)]
pub struct StoreLock {
    lock_path: PathBuf,
    _file: File,
}

impl StoreLock {
    /// Take the lock, failing fast with `LockBusy` if another writer holds it.
    pub fn acquire(
        path: &Path,
    ) -> Result<Self, AtomicStoreMutationError<std::convert::Infallible>> {
        let lock_path = store_lock_path(path);
        if let Some(parent) = lock_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .map_err(|e| AtomicStoreMutationError::lock_io(&lock_path, e.to_string()))?;
        }

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(mut file) => {
                let _ = writeln!(
                    file,
                    "pid={}\nutc={}",
                    std::process::id(),
                    Utc::now().to_rfc3339()
                );
                Ok(Self {
                    lock_path,
                    _file: file,
                })
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(AtomicStoreMutationError::lock_busy(&lock_path))
            }
            Err(err) => Err(AtomicStoreMutationError::lock_io(
                &lock_path,
                err.to_string(),
            )),
        }
    }
}

impl StoreLock {
    /// Take the lock, waiting up to `wait` while another writer holds it.
    pub fn acquire_within(
        path: &Path,
        wait: Duration,
    ) -> Result<Self, AtomicStoreMutationError<std::convert::Infallible>> {
        let deadline = Instant::now() + wait;
        loop {
            match Self::acquire(path) {
                Err(AtomicStoreMutationError::LockBusy { .. }) if Instant::now() < deadline => {
                    std::thread::sleep(LOCK_POLL_INTERVAL);
                }
                other => return other,
            }
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FormRecord, Record};
    use formgate_kernel::Form;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_path(prefix: &str) -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "formgate-atomic-{prefix}-{}-{unique}.jsonl",
            std::process::id()
        ))
    }

    #[test]
    fn busy_lock_fails_fast_and_releases_on_drop() {
        let path = temp_path("busy");
        let guard = StoreLock::acquire(&path).expect("first lock");
        let busy = StoreLock::acquire(&path).expect_err("second lock must be busy");
        assert!(matches!(busy, AtomicStoreMutationError::LockBusy { .. }));
        drop(guard);
        assert!(!store_lock_path(&path).exists());
        StoreLock::acquire(&path).expect("lock is free again");
    }

    #[test]
    fn waiting_writer_gets_the_lock_once_released() {
        let path = temp_path("wait");
        let guard = StoreLock::acquire(&path).expect("first lock");
        let holder = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            drop(guard);
        });

        let value = mutate_store_jsonl::<_, std::convert::Infallible, _>(
            &path,
            Duration::from_secs(5),
            |store| Ok((store.next_form_id(), false)),
        )
        .expect("waits for the holder");
        assert_eq!(value, 1);
        holder.join().expect("holder thread");

        let _held = StoreLock::acquire(&path).expect("lock");
        let busy = StoreLock::acquire_within(&path, Duration::from_millis(30))
            .expect_err("wait is bounded");
        assert!(matches!(busy, AtomicStoreMutationError::LockBusy { .. }));
    }

    #[test]
    fn reads_do_not_take_the_lock() {
        let path = temp_path("read");
        mutate_store_jsonl::<_, std::convert::Infallible, _>(&path, Duration::ZERO, |store| {
            store
                .insert_form(FormRecord::new(Form::new(1, "h1", "alice")))
                .expect("seed form");
            Ok(((), true))
        })
        .expect("seed");

        let _held = StoreLock::acquire(&path).expect("writer lock");
        let store = read_store_jsonl(&path).expect("read while a writer holds the lock");
        assert!(store.form(1).is_some());

        let _ = fs::remove_file(path);
    }

    #[test]
    fn unchanged_mutation_does_not_write() {
        let path = temp_path("unchanged");
        let value: u64 =
            mutate_store_jsonl::<_, std::convert::Infallible, _>(&path, Duration::ZERO, |store| {
                Ok((store.next_form_id(), false))
            })
            .expect("mutation");
        assert_eq!(value, 1);
        assert!(!path.exists());
    }

    #[test]
    fn failed_mutation_leaves_store_untouched() {
        let path = temp_path("failed");
        mutate_store_jsonl::<_, std::convert::Infallible, _>(&path, Duration::ZERO, |store| {
            store
                .insert_form(FormRecord::new(Form::new(1, "h1", "alice")))
                .expect("seed form");
            Ok(((), true))
        })
        .expect("seed");

        let result = mutate_store_jsonl(&path, Duration::ZERO, |store| {
            if let Some(record) = store.form_mut(1) {
                record.form.title = "changed".to_string();
            }
            Err::<((), bool), _>("refused")
        });
        assert!(matches!(result, Err(AtomicStoreMutationError::Mutation("refused"))));

        let store = read_store_jsonl(&path).expect("read back");
        assert_eq!(store.form(1).map(|record| record.form.title.as_str()), Some(""));
        assert!(matches!(store.records().first(), Some(Record::Form(_))));

        let _ = fs::remove_file(path);
    }
}
