//! Opening the cache file.

use std::path::Path;
use std::time::Duration;

use log::debug;
use rusqlite::{Connection, OpenFlags};

use crate::error::{OpContext, StoreError, StoreResult};
use crate::schema;

/// How long a writer waits on a lock held by another process
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle on one cache database file.
///
/// Created read-write by [`CacheStore::open`] (capture side) or read-only
/// by [`CacheStore::open_read_only`] (replay side).
#[derive(Debug)]
pub struct CacheStore {
    pub(crate) conn: Connection,
}

impl CacheStore {
    /// Open or create the cache file and bring its schema up to date.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(BUSY_TIMEOUT).op("set busy timeout")?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .op("enable foreign keys")?;
        schema::init_schema(&conn)?;
        debug!("opened cache {} read-write", path.display());

        Ok(Self { conn })
    }

    /// Open an existing cache file without write access.
    ///
    /// Returns `Ok(None)` when the file does not exist or was never
    /// initialized by a capture: nothing can be cached there, which callers
    /// treat as a cache miss rather than a storage failure.
    pub fn open_read_only(path: &Path) -> StoreResult<Option<Self>> {
        if !path.exists() {
            debug!("cache {} does not exist", path.display());
            return Ok(None);
        }

        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY).map_err(
            |source| StoreError::Open {
                path: path.to_path_buf(),
                source,
            },
        )?;
        conn.busy_timeout(BUSY_TIMEOUT).op("set busy timeout")?;

        if !schema::is_initialized(&conn)? {
            debug!("cache {} has no schema yet", path.display());
            return Ok(None);
        }
        schema::check_version(&conn)?;
        debug!("opened cache {} read-only", path.display());

        Ok(Some(Self { conn }))
    }

    /// Open an in-memory cache (tests and dry runs)
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().op("open in-memory cache")?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .op("enable foreign keys")?;
        schema::init_schema(&conn)?;
        Ok(Self { conn })
    }
}
