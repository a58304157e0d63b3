//! Direct outbound.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::net::TcpStream;

use crate::adapter::Outbound;
use crate::observability::Logger;

/// Options of the `direct` outbound.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DirectOptions {
    /// Connect timeout in milliseconds. No timeout when unset.
    pub connect_timeout_ms: Option<u64>,
}

/// Connects to the destination without a proxy.
pub struct DirectOutbound {
    tag: String,
    connect_timeout: Option<Duration>,
    logger: Logger,
}

impl DirectOutbound {
    pub fn new(tag: &str, options: DirectOptions, logger: Logger) -> Self {
        Self {
            tag: tag.to_string(),
            connect_timeout: options.connect_timeout_ms.map(Duration::from_millis),
            logger,
        }
    }
}

#[async_trait]
impl Outbound for DirectOutbound {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn kind(&self) -> &str {
        "direct"
    }

    async fn dial(&self, destination: &str) -> io::Result<TcpStream> {
        self.logger.debug(format_args!("outbound connection to {}", destination));
        let connect = TcpStream::connect(destination);
        match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connect)
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timeout"))?,
            None => connect.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_dial_reaches_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let out = DirectOutbound::new(
            "direct",
            DirectOptions {
                connect_timeout_ms: Some(1000),
            },
            Logger::new("outbound/direct[direct]"),
        );

        let target = addr.to_string();
        let (dialed, accepted) = tokio::join!(out.dial(&target), listener.accept());
        assert!(dialed.is_ok());
        assert!(accepted.is_ok());
        assert!(!out.has_start());
    }
}
