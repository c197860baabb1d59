use crate::api::{create_router, AppState};
use crate::libraries::LibraryRegistry;
use crate::repositories::Repositories;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::info;

/// Hosts repositories for push and answers library checks.
pub struct CollaborationServer {
    state: AppState,
}

impl CollaborationServer {
    pub fn new(data_dir: Option<PathBuf>, libraries: LibraryRegistry) -> Self {
        Self {
            state: AppState::new(Repositories::new(data_dir), libraries),
        }
    }

    pub fn with_accounts(mut self, accounts: HashMap<String, String>) -> Self {
        self.state = self.state.with_accounts(accounts);
        self
    }

    pub async fn serve(self, addr: SocketAddr) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_on(listener).await
    }

    /// Serves on an already bound listener.
    pub async fn serve_on(self, listener: TcpListener) -> anyhow::Result<()> {
        info!("Server listening on {}", listener.local_addr()?);
        info!(
            "Protecting {} library datasets",
            self.state.libraries.dataset_count()
        );

        let app = create_router(self.state);
        axum::serve(listener, app).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_server_binds_and_serves() {
        let data_dir = TempDir::new().unwrap();
        let server = CollaborationServer::new(
            Some(data_dir.path().to_path_buf()),
            LibraryRegistry::new(),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        assert!(listener.local_addr().unwrap().port() > 0);

        let handle = tokio::spawn(server.serve_on(listener));
        tokio::task::yield_now().await;
        assert!(!handle.is_finished());
        handle.abort();
    }
}
