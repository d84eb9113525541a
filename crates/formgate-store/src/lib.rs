//! # formgate-store
//!
//! Storage and orchestration around the formgate kernel.
//!
//! This crate provides:
//! - tagged JSONL records for forms, submissions and memberships
//! - `MemoryStore` (canonical in-memory state) and lock-scoped mutation
//! - a membership directory that expands nested groups and circles
//! - staged-upload resolution with a bounded timeout and one retry
//! - `EngineConfig` (TOML) and the `FormService` facade
//!
//! ## Data model
//!
//! ```text
//! JSONL (on disk, one tagged record per line)
//!     ↕  load / save under <path>.lock
//! MemoryStore
//!     ↓
//! FormService → formgate-kernel decisions
//! ```

pub mod atomic_store;
pub mod config;
pub mod directory;
pub mod jsonl;
pub mod memory;
pub mod record;
pub mod service;
pub mod uploads;

pub use atomic_store::{
    AtomicStoreMutationError, StoreLock, mutate_store_jsonl, read_store_jsonl, store_lock_path,
};
pub use config::{ConfigError, DEFAULT_CONFIG_FILE, DEFAULT_STORE_PATH, EngineConfig};
pub use directory::MembershipDirectory;
pub use jsonl::JsonlError;
pub use memory::{MemoryStore, MemoryStoreError};
pub use record::{
    Answer, FormRecord, Member, MembershipKind, MembershipRecord, Record, StoredValue, Submission,
};
pub use service::{FormService, NewForm, Requester, ServiceError, submitter_for};
pub use uploads::{DirectoryUploads, StoredFile, UploadError, UploadResolver, resolve_with_retry};
