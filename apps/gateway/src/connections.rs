// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Observational map of in-flight requests.
//!
//! Entries are inserted when a request enters and removed when its response
//! completes. Nothing routes on this data; it exists for operators.

use std::collections::HashMap;
use std::net::SocketAddr;

use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub peer: Option<SocketAddr>,
    pub user: Option<String>,
}

#[derive(Default)]
pub struct ConnectionMap {
    inner: Mutex<HashMap<Uuid, ConnectionInfo>>,
}

impl ConnectionMap {
    pub async fn insert(&self, info: ConnectionInfo) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.lock().await.insert(id, info);
        id
    }

    pub async fn remove(&self, id: Uuid) {
        self.inner.lock().await.remove(&id);
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_remove() {
        let map = ConnectionMap::default();
        assert!(map.is_empty().await);

        let id = map.insert(ConnectionInfo { peer: None, user: None }).await;
        assert_eq!(map.len().await, 1);

        map.remove(id).await;
        assert!(map.is_empty().await);
    }
}
