//! Cache of collection listings.
//!
//! Only the personal root listing of a user and the institution root listing
//! are cached. Entries are forgotten after a mutation and repopulated on the
//! next read.

use parking_lot::Mutex;
use redis::Commands;
use std::collections::HashMap;
use std::fmt;

use crate::error::{DmsError, DmsResult};
use crate::types::{Collection, UserId};

const CACHE_TTL_SECS: u64 = 3600;
const KEY_PREFIX: &str = "dms";

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CacheKey {
    PersonalCollections(UserId),
    InstitutionCollections,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::PersonalCollections(user) => write!(f, "personal-collections:{user}"),
            CacheKey::InstitutionCollections => f.write_str("institution-collections"),
        }
    }
}

pub trait CollectionCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> DmsResult<Option<Vec<Collection>>>;
    fn put(&self, key: &CacheKey, value: &[Collection]) -> DmsResult<()>;
    fn forget(&self, key: &CacheKey) -> DmsResult<()>;
}

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<CacheKey, Vec<Collection>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.lock().contains_key(key)
    }
}

impl CollectionCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> DmsResult<Option<Vec<Collection>>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn put(&self, key: &CacheKey, value: &[Collection]) -> DmsResult<()> {
        self.entries.lock().insert(key.clone(), value.to_vec());
        Ok(())
    }

    fn forget(&self, key: &CacheKey) -> DmsResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Listings stored as JSON strings with a one hour TTL.
pub struct RedisCache {
    client: redis::Client,
}

impl RedisCache {
    pub fn new(url: &str) -> DmsResult<Self> {
        let client = redis::Client::open(url).map_err(cache_error)?;
        Ok(Self { client })
    }

    fn key(key: &CacheKey) -> String {
        format!("{KEY_PREFIX}:{key}")
    }

    fn connection(&self) -> DmsResult<redis::Connection> {
        self.client.get_connection().map_err(cache_error)
    }
}

fn cache_error(err: redis::RedisError) -> DmsError {
    DmsError::Cache(err.to_string())
}

impl CollectionCache for RedisCache {
    fn get(&self, key: &CacheKey) -> DmsResult<Option<Vec<Collection>>> {
        let mut conn = self.connection()?;
        let data: Option<String> = conn.get(Self::key(key)).map_err(cache_error)?;
        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    fn put(&self, key: &CacheKey, value: &[Collection]) -> DmsResult<()> {
        let mut conn = self.connection()?;
        let data = serde_json::to_string(value)?;
        let _: () = conn
            .set_ex(Self::key(key), data, CACHE_TTL_SECS)
            .map_err(cache_error)?;
        Ok(())
    }

    fn forget(&self, key: &CacheKey) -> DmsResult<()> {
        let mut conn = self.connection()?;
        let _: () = conn.del(Self::key(key)).map_err(cache_error)?;
        Ok(())
    }
}
