//! Connection to the real debug adapter.

use std::sync::Arc;

use async_trait::async_trait;
use dap_mux_core::{AdapterSink, ProtocolMessage, Request, TransportError};
use tokio::{
    io::{AsyncRead, AsyncWrite, BufReader},
    net::{TcpStream, ToSocketAddrs},
    sync::{Mutex, mpsc},
};

use crate::codec;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Writes framed requests to the adapter.
///
/// Cloning shares the underlying writer.
#[derive(Clone)]
pub struct AdapterConnection {
    writer: Arc<Mutex<BoxedWriter>>,
}

impl std::fmt::Debug for AdapterConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterConnection").finish_non_exhaustive()
    }
}

impl AdapterConnection {
    /// Wrap an adapter byte stream.
    ///
    /// This starts a background task that decodes everything the adapter
    /// sends; the returned receiver yields those messages and closes when
    /// the adapter's stream ends.
    #[must_use]
    pub fn spawn<R, W>(reader: R, writer: W) -> (Self, mpsc::UnboundedReceiver<ProtocolMessage>)
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let connection = Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            if let Err(e) = read_loop(reader, tx).await {
                tracing::error!("Adapter reader loop error: {}", e);
            }
        });

        (connection, rx)
    }

    /// Connect to an adapter listening on TCP.
    ///
    /// # Errors
    /// Returns error if the connection cannot be established.
    pub async fn connect(
        addr: impl ToSocketAddrs,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ProtocolMessage>), TransportError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self::spawn(read_half, write_half))
    }
}

async fn read_loop<R>(
    reader: R,
    tx: mpsc::UnboundedSender<ProtocolMessage>,
) -> Result<(), TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    while let Some(message) = codec::read_message(&mut reader).await? {
        if tx.send(message).is_err() {
            tracing::debug!("Adapter message receiver dropped");
            break;
        }
    }
    tracing::info!("Adapter stream ended");
    Ok(())
}

#[async_trait]
impl AdapterSink for AdapterConnection {
    async fn send(&self, request: Request) -> Result<(), TransportError> {
        tracing::trace!(seq = request.seq, command = %request.command, "-> adapter");
        let mut writer = self.writer.lock().await;
        codec::write_message(&mut *writer, &ProtocolMessage::Request(request)).await
    }
}
