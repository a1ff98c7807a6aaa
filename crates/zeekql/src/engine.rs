//! The per-invocation engine session.

use crate::catalog::Capabilities;
use tracing::warn;
use zeekql_db::{BackendError, DbConnection};

const INET_EXTENSION: &str = "inet";

/// An in-memory engine connection and what it can express.
#[derive(Debug, Clone)]
pub struct Engine {
    conn: DbConnection,
    caps: Capabilities,
}

impl Engine {
    /// Open an in-memory session and load the `inet` extension.
    ///
    /// Without the extension address columns degrade to text.
    pub fn open() -> Result<Self, BackendError> {
        let conn = DbConnection::open_in_memory()?;
        let inet = match conn.load_extension(INET_EXTENSION) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    "{}; address columns will be plain text without containment operators",
                    err
                );
                false
            }
        };
        Ok(Self {
            conn,
            caps: Capabilities { inet },
        })
    }

    pub fn connection(&self) -> &DbConnection {
        &self.conn
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }
}
