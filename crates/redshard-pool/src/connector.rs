//! Connection establishment

use async_trait::async_trait;
use tokio::net::TcpStream;

use redshard_types::Endpoint;

/// Opens new connections to an endpoint.
///
/// The pool owns reuse and limits; a connector only dials.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Opaque handle handed to the storage client
    type Connection: Send + 'static;

    async fn connect(&self, endpoint: &Endpoint) -> std::io::Result<Self::Connection>;
}

/// Plain TCP connector; the endpoint target is used as the socket address.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    nodelay: bool,
}

impl TcpConnector {
    pub fn new() -> Self {
        Self { nodelay: true }
    }

    pub fn with_nodelay(nodelay: bool) -> Self {
        Self { nodelay }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Connection = TcpStream;

    async fn connect(&self, endpoint: &Endpoint) -> std::io::Result<TcpStream> {
        let stream = TcpStream::connect(endpoint.as_str()).await?;
        stream.set_nodelay(self.nodelay)?;
        Ok(stream)
    }
}
