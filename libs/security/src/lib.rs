//! Security helpers for the embeddable chat widget.

pub mod csrf;
pub mod storage;

pub use csrf::{ANTI_FORGERY_HEADER, AntiForgery, TOKEN_STORAGE_KEY, TokenFormat, generate_token};
pub use storage::{
    MemorySessionStorage, SessionStorage, SharedSessionStorage, StorageError, UnavailableStorage,
};
