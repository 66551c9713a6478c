//! Byte transport between the host and the modem.
//!
//! The dispatcher only needs to write a command and read `\n`-delimited lines
//! with a timeout. Anything that is a tokio `AsyncRead + AsyncWrite` (a serial
//! port stream, or a TCP connection to a serial bridge) can be wrapped in a
//! [`StreamTransport`].

use std::time::Duration;

use async_trait::async_trait;
use idp_at_protocol::{printable, LineCodec};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::TransportError;

/// A line-oriented, timeout-bounded serial link.
#[async_trait]
pub trait Transport: Send {
    /// Write all bytes to the modem.
    async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Read one raw line, delimiter included.
    ///
    /// Fails with [`TransportError::Timeout`] if no complete line arrives in
    /// `timeout`. Bytes of a partial line are kept for the next read.
    async fn read_line(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError>;
}

/// [`Transport`] over any tokio byte stream.
pub struct StreamTransport<S> {
    stream: S,
    codec: LineCodec,
    buf: Vec<u8>,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a connected stream.
    pub fn new(stream: S) -> Self {
        StreamTransport {
            stream,
            codec: LineCodec::new(),
            buf: vec![0u8; 1024],
        }
    }

    /// Bytes received but not yet returned as a line.
    pub fn buffered_len(&self) -> usize {
        self.codec.buffered_len()
    }

    /// Recover the wrapped stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl StreamTransport<TcpStream> {
    /// Connect to a TCP serial bridge exposing the modem UART.
    pub async fn connect_tcp(address: &str) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        debug!("connected to serial bridge at {}", address);
        Ok(Self::new(stream))
    }
}

#[async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        trace!("tx {}", printable(&String::from_utf8_lossy(data)));
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read_line(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(line) = self.codec.decode_line() {
                trace!("rx {}", printable(&String::from_utf8_lossy(&line)));
                return Ok(line);
            }
            let n = tokio::time::timeout_at(deadline, self.stream.read(&mut self.buf))
                .await
                .map_err(|_| TransportError::Timeout)??;
            if n == 0 {
                return Err(TransportError::Closed);
            }
            self.codec.push(&self.buf[..n]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_partial_line_survives_timeout() {
        let (client, mut device) = tokio::io::duplex(256);
        let mut transport = StreamTransport::new(client);

        device.write_all(b"AT\r\r\nO").await.unwrap();
        let line = transport.read_line(Duration::from_millis(50)).await.unwrap();
        assert_eq!(line, b"AT\r\r\n");

        let err = transport
            .read_line(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout));
        assert_eq!(transport.buffered_len(), 1);

        device.write_all(b"K\r\n").await.unwrap();
        let line = transport.read_line(Duration::from_millis(50)).await.unwrap();
        assert_eq!(line, b"OK\r\n");
    }

    #[tokio::test]
    async fn test_write_and_close() {
        let (client, mut device) = tokio::io::duplex(256);
        let mut transport = StreamTransport::new(client);

        transport.write_all(b"AT+GSN\r").await.unwrap();
        let mut buf = [0u8; 7];
        device.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"AT+GSN\r");

        drop(device);
        let err = transport
            .read_line(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }
}
