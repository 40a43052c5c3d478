use std::fmt;
use std::time::Duration;

use futures::SinkExt;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;

use super::guard::ConnectionGuard;
use super::reader::FrameReader;
use crate::codec::UssdCodec;
use crate::error::UssdError;
use crate::frame::Frame;

/// A framed connection to the USSD gateway.
///
/// Before logon both halves are driven directly by one task. Once the
/// session is established the connection is split: the write half moves
/// behind a [`ConnectionGuard`] and the read half goes to the dispatcher.
#[derive(Debug)]
pub struct Connection<S = TcpStream> {
    reader: FrameReader<ReadHalf<S>>,
    writer: FramedWrite<WriteHalf<S>, UssdCodec>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(stream: S, codec: UssdCodec) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: FrameReader::new(read_half, codec),
            writer: FramedWrite::new(write_half, codec),
        }
    }

    pub async fn send(&mut self, frame: Frame) -> Result<(), UssdError> {
        self.writer.send(frame).await
    }

    pub async fn recv(&mut self, timeout: Duration) -> Result<Frame, UssdError> {
        self.reader.read_frame(timeout).await
    }

    /// Hand the write half to a guarded writer task and return the read
    /// half for the dispatcher.
    pub fn into_guard(
        self,
        shutdown: CancellationToken,
        queue_depth: usize,
    ) -> (ConnectionGuard, FrameReader<ReadHalf<S>>) {
        let guard = ConnectionGuard::spawn(self.writer, shutdown, queue_depth);
        (guard, self.reader)
    }
}

impl Connection<TcpStream> {
    pub async fn connect(info: &ConnectionInfo, codec: UssdCodec) -> Result<Self, UssdError> {
        let stream = TcpStream::connect(info.address()).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream, codec))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    host: String,
    port: u16,
}

impl ConnectionInfo {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
