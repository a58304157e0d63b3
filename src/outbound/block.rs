//! Block outbound.

use std::io;

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::adapter::Outbound;

/// Refuses every connection.
pub struct BlockOutbound {
    tag: String,
}

impl BlockOutbound {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
        }
    }
}

#[async_trait]
impl Outbound for BlockOutbound {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn kind(&self) -> &str {
        "block"
    }

    async fn dial(&self, destination: &str) -> io::Result<TcpStream> {
        Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("blocked connection to {}", destination),
        ))
    }
}
