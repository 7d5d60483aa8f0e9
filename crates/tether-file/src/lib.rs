//! tether-file - Filesystem-backed credential storage.

mod storage;

pub use storage::FileStorage;
