//! Per-invocation context object.
//!
//! Every top-level operation constructs (or is handed) one [`SyncContext`]
//! and passes it down; components take it instead of reaching for global
//! session or store handles, which keeps them independently testable
//! against fake collaborators.

use std::sync::Arc;

use chatsync_store::Database;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::transport::Transport;
use crate::EngineError;

/// Everything one top-level operation needs: the store handle, the
/// transport collaborator, and tuning configuration.
///
/// The store and transport handles are owned by a single invocation; this
/// type is not meant to be shared across concurrent top-level invocations
/// against the same on-disk store.
pub struct SyncContext {
    pub db: Database,
    pub transport: Arc<dyn Transport>,
    pub config: EngineConfig,
}

impl SyncContext {
    pub fn new(db: Database, transport: Arc<dyn Transport>, config: EngineConfig) -> Self {
        Self {
            db,
            transport,
            config,
        }
    }

    /// Open the default on-disk store and read configuration from the
    /// environment.
    pub fn open_default(transport: Arc<dyn Transport>) -> Result<Self> {
        let db = Database::new()?;
        Ok(Self::new(db, transport, EngineConfig::from_env()))
    }

    /// Fail fast when no paired identity exists.  Every operation that
    /// touches the transport calls this first.
    pub fn require_login(&self) -> Result<()> {
        if self.transport.is_logged_in() {
            Ok(())
        } else {
            Err(EngineError::NotAuthenticated)
        }
    }
}
