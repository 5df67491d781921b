#![deny(clippy::all)]

#[macro_use]
extern crate serde_derive;

pub mod backend;
mod config;
mod digest;
mod entry;
mod error;
mod handle;
pub mod metadata;
pub mod registry;
mod state;
mod store;
mod transfer;

pub use backend::FileStoreBackend;
pub use config::Config;
pub use digest::{Digest, DigestError};
pub use entry::FileEntry;
pub use error::{Result, StoreError};
pub use handle::FileReadWriter;
pub use state::{Directories, FileState};
pub use store::Store;
pub use transfer::{BlobInfo, Transferer};

pub use anyhow;
