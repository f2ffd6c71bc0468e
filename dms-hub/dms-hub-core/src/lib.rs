pub mod auth;
pub mod cache;
pub mod collections;
pub mod config;
mod documents;
pub mod error;
pub mod events;
pub mod hub;
pub mod indexer;
pub mod search;
pub mod storage;
pub mod types;

pub use collections::{CollectionUpdate, FolderImport, NewCollection};
pub use error::{DmsError, DmsResult};
pub use hub::DmsHub;
