use async_trait::async_trait;
use futures::prelude::*;
use libp2p::request_response;
use libp2p::StreamProtocol;
use std::io;

use crosslock_core::constants::MAX_FRAME_BYTES;

/// Protocol name for directed Crosslock streams.
pub const DIRECT_PROTOCOL: StreamProtocol = StreamProtocol::new("/crosslock/direct/1");

/// Directed-stream codec: 4-byte big-endian length prefix followed by the
/// opaque payload. Responses use the same framing; an empty frame is the
/// standard ack.
#[derive(Debug, Clone, Default)]
pub struct FrameCodec;

async fn read_frame<T>(io: &mut T) -> io::Result<Vec<u8>>
where
    T: AsyncRead + Unpin + Send,
{
    let mut len_bytes = [0u8; 4];
    io.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds limit"),
        ));
    }
    let mut buf = vec![0u8; len];
    io.read_exact(&mut buf).await?;
    Ok(buf)
}

async fn write_frame<T>(io: &mut T, data: &[u8]) -> io::Result<()>
where
    T: AsyncWrite + Unpin + Send,
{
    if data.len() > MAX_FRAME_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit", data.len()),
        ));
    }
    io.write_all(&(data.len() as u32).to_be_bytes()).await?;
    io.write_all(data).await?;
    Ok(())
}

#[async_trait]
impl request_response::Codec for FrameCodec {
    type Protocol = StreamProtocol;
    type Request = Vec<u8>;
    type Response = Vec<u8>;

    async fn read_request<T>(&mut self, _: &StreamProtocol, io: &mut T) -> io::Result<Vec<u8>>
    where
        T: AsyncRead + Unpin + Send,
    {
        read_frame(io).await
    }

    async fn read_response<T>(&mut self, _: &StreamProtocol, io: &mut T) -> io::Result<Vec<u8>>
    where
        T: AsyncRead + Unpin + Send,
    {
        read_frame(io).await
    }

    async fn write_request<T>(
        &mut self,
        _: &StreamProtocol,
        io: &mut T,
        req: Vec<u8>,
    ) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        write_frame(io, &req).await
    }

    async fn write_response<T>(
        &mut self,
        _: &StreamProtocol,
        io: &mut T,
        res: Vec<u8>,
    ) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        write_frame(io, &res).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::io::Cursor;

    #[tokio::test]
    async fn frame_round_trip() {
        let mut buf = Cursor::new(Vec::new());
        write_frame(&mut buf, b"sealed proposal bytes").await.unwrap();
        let written = buf.into_inner();
        assert_eq!(&written[..4], &(21u32).to_be_bytes());

        let mut reader = Cursor::new(written);
        let frame = read_frame(&mut reader).await.unwrap();
        assert_eq!(frame, b"sealed proposal bytes");
    }

    #[tokio::test]
    async fn empty_frame_is_valid() {
        let mut buf = Cursor::new(Vec::new());
        write_frame(&mut buf, b"").await.unwrap();
        let mut reader = Cursor::new(buf.into_inner());
        assert_eq!(read_frame(&mut reader).await.unwrap(), Vec::<u8>::new());
    }

    #[tokio::test]
    async fn oversized_length_prefix_rejected() {
        let mut bytes = ((MAX_FRAME_BYTES + 1) as u32).to_be_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 8]);
        let mut reader = Cursor::new(bytes);
        let err = read_frame(&mut reader).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn truncated_frame_errors() {
        let mut bytes = (100u32).to_be_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 10]); // fewer than promised
        let mut reader = Cursor::new(bytes);
        assert!(read_frame(&mut reader).await.is_err());
    }
}
