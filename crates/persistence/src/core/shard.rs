//! Route-to-connection registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{PreconditionError, StorageResult};

use super::connection::Connection;

/// Route used when a requested route has no connection attached.
pub const DEFAULT_ROUTE: &str = "__DEFAULT__";

/// Maps routes to shard connections.
///
/// Several routes may share one connection. Lookups of an unknown route fall
/// back to [`DEFAULT_ROUTE`].
#[derive(Default)]
pub struct ShardManager {
    routes: RwLock<HashMap<String, Arc<dyn Connection>>>,
}

impl fmt::Debug for ShardManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut routes: Vec<String> = self.routes.read().keys().cloned().collect();
        routes.sort();
        f.debug_struct("ShardManager")
            .field("routes", &routes)
            .finish()
    }
}

impl ShardManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `connection` to `route`, replacing any previous attachment.
    pub fn attach(&self, route: &str, connection: Arc<dyn Connection>) -> StorageResult<()> {
        check_route(route)?;
        self.routes.write().insert(route.to_string(), connection);
        Ok(())
    }

    /// Detaches whatever is attached to `route`.
    pub fn detach(&self, route: &str) -> StorageResult<()> {
        check_route(route)?;
        self.routes.write().remove(route);
        Ok(())
    }

    /// Connection for `route`, falling back to the default route.
    pub fn fetch(&self, route: &str) -> StorageResult<Arc<dyn Connection>> {
        check_route(route)?;
        let routes = self.routes.read();
        routes
            .get(route)
            .or_else(|| routes.get(DEFAULT_ROUTE))
            .cloned()
            .ok_or_else(|| {
                PreconditionError::UnknownRoute {
                    route: route.to_string(),
                }
                .into()
            })
    }

    /// Attached routes, sorted.
    pub fn routes(&self) -> Vec<String> {
        let mut routes: Vec<String> = self.routes.read().keys().cloned().collect();
        routes.sort();
        routes
    }

    /// Disconnects every attached connection.
    pub async fn disconnect_all(&self) -> StorageResult<()> {
        let connections: Vec<Arc<dyn Connection>> =
            self.routes.read().values().cloned().collect();
        for connection in connections {
            if connection.is_connected() {
                connection.disconnect().await?;
            }
        }
        Ok(())
    }
}

fn check_route(route: &str) -> StorageResult<()> {
    if route.is_empty() {
        return Err(PreconditionError::EmptyRoute.into());
    }
    Ok(())
}
