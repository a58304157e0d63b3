//! Bounded TCP listener used by the built-in inbounds.
//!
//! Accepting blocks while `max_connections` streams are in flight; each
//! accepted stream carries a permit that frees its slot when dropped.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("listen {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("accept: {0}")]
    Accept(#[source] io::Error),

    #[error("listener closed")]
    Closed,
}

pub struct Listener {
    inner: TcpListener,
    slots: Arc<Semaphore>,
}

impl Listener {
    pub async fn bind(address: &str, max_connections: usize) -> Result<Self, ListenerError> {
        let bind_err = |source| ListenerError::Bind {
            address: address.to_string(),
            source,
        };
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| bind_err(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
        let inner = TcpListener::bind(addr).await.map_err(bind_err)?;
        Ok(Self {
            inner,
            slots: Arc::new(Semaphore::new(max_connections.max(1))),
        })
    }

    /// Wait for a free slot, then for a connection.
    pub async fn accept(
        &self,
    ) -> Result<(TcpStream, SocketAddr, OwnedSemaphorePermit), ListenerError> {
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;
        let (stream, peer) = self.inner.accept().await.map_err(ListenerError::Accept)?;
        tracing::trace!(
            peer_addr = %peer,
            free_slots = self.slots.available_permits(),
            "connection accepted"
        );
        Ok((stream, peer, permit))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    pub fn free_slots(&self) -> usize {
        self.slots.available_permits()
    }
}
