use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("lock poisoned while accessing the store")]
    LockError,
    #[error("pivot snapshot at key {0:?} is malformed")]
    MalformedSnapshot(Vec<u8>),
}
