//! Length prefixed framing over TCP and the transport seam used by the outbound RPC client.

use crate::error::RpcError;
use async_trait::async_trait;
use std::{convert::TryFrom, io, net::SocketAddr};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
};

/// Largest frame body accepted in either direction.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Request/response exchange with a remote node.
///
/// There is no timeout on top of whatever the implementation itself enforces.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send one encoded request to `addr` and wait for the encoded reply.
    async fn exchange(&self, addr: SocketAddr, request: &[u8]) -> Result<Vec<u8>, RpcError>;
}

/// Opens a fresh connection for every exchange.
#[derive(Default, Clone, Copy)]
pub struct TcpTransport;

#[async_trait]
impl Transport for TcpTransport {
    async fn exchange(&self, addr: SocketAddr, request: &[u8]) -> Result<Vec<u8>, RpcError> {
        let mut stream = TcpStream::connect(addr).await?;
        write_frame(&mut stream, request).await?;
        let reply = read_frame(&mut stream).await?;

        reply.ok_or_else(|| {
            RpcError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before reply",
            ))
        })
    }
}

/// Write a 4 byte big-endian length followed by the body.
pub(crate) async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<(), RpcError>
where
    W: AsyncWrite + Unpin,
{
    if body.len() > MAX_FRAME_LEN {
        return Err(RpcError::FrameTooLarge(body.len()));
    }

    let len = u32::try_from(body.len()).map_err(|_| RpcError::FrameTooLarge(body.len()))?;

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;

    Ok(())
}

/// Read one frame. Returns `None` if the peer closed the connection cleanly between frames.
pub(crate) async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, RpcError>
where
    R: AsyncRead + Unpin,
{
    let mut len = [0u8; 4];

    match reader.read_exact(&mut len).await {
        Ok(_) => (),
        Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(error) => return Err(error.into()),
    }

    let len = u32::from_be_bytes(len) as usize;
    if len > MAX_FRAME_LEN {
        return Err(RpcError::FrameTooLarge(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;

    Ok(Some(body))
}

// ----------------------------------------------------------------------------//

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn positive_frame_round_trip() {
        let (mut client, mut server) = tokio::io::duplex(64);

        write_frame(&mut client, b"hello").await.unwrap();
        write_frame(&mut client, b"").await.unwrap();
        drop(client);

        assert_eq!(
            read_frame(&mut server).await.unwrap(),
            Some(b"hello".to_vec())
        );
        assert_eq!(read_frame(&mut server).await.unwrap(), Some(Vec::new()));
        assert_eq!(read_frame(&mut server).await.unwrap(), None);
    }

    #[tokio::test]
    async fn negative_oversized_frame() {
        let (mut client, mut server) = tokio::io::duplex(64);

        let len = (MAX_FRAME_LEN as u32 + 1).to_be_bytes();
        client.write_all(&len).await.unwrap();

        assert!(matches!(
            read_frame(&mut server).await,
            Err(RpcError::FrameTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn positive_tcp_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_frame(&mut stream).await.unwrap().unwrap();
            let mut reply = request;
            reply.reverse();
            write_frame(&mut stream, &reply).await.unwrap();
        });

        let reply = TcpTransport.exchange(addr, b"abc").await.unwrap();
        assert_eq!(reply, b"cba");
    }

    #[tokio::test]
    async fn negative_tcp_exchange_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert!(TcpTransport.exchange(addr, b"abc").await.is_err());
    }
}
