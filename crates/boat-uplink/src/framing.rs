use anyhow::{Context, Result};
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt, AsyncRead};

/// Upper bound on a single blob.
pub const MAX_BLOB: usize = 64 * 1024;

/// u32 big-endian length followed by the blob.
pub fn encode(blob: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(4 + blob.len());
    out.put_u32(blob.len() as u32);
    out.put_slice(blob);
    out.freeze()
}

pub async fn write_frame<W: AsyncWrite + Unpin + ?Sized>(w: &mut W, blob: &[u8]) -> Result<()> {
    w.write_all(&encode(blob)).await.context("write frame")?;
    w.flush().await.context("flush frame")?;
    Ok(())
}

pub async fn read_frame<R: AsyncRead + Unpin + ?Sized>(r: &mut R) -> Result<Bytes> {
    let len = r.read_u32().await.context("read frame length")? as usize;
    anyhow::ensure!(len <= MAX_BLOB, "frame length {} exceeds {}", len, MAX_BLOB);
    let mut blob = vec![0u8; len];
    r.read_exact(&mut blob).await.context("read frame body")?;
    Ok(Bytes::from(blob))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_prefix_is_big_endian() {
        let f = encode(&[0xAA, 0xBB, 0xCC]);
        assert_eq!(&f[..], &[0, 0, 0, 3, 0xAA, 0xBB, 0xCC]);
    }

    #[tokio::test]
    async fn oversized_length_is_an_error() {
        let (mut a, mut b) = tokio::io::duplex(16);
        a.write_all(&[0xFF, 0xFF, 0xFF, 0xFF]).await.unwrap();
        assert!(read_frame(&mut b).await.is_err());
    }

    #[tokio::test]
    async fn frames_survive_a_pipe() {
        let (mut a, mut b) = tokio::io::duplex(256);
        write_frame(&mut a, b"first").await.unwrap();
        write_frame(&mut a, &[]).await.unwrap();
        assert_eq!(&read_frame(&mut b).await.unwrap()[..], b"first");
        assert!(read_frame(&mut b).await.unwrap().is_empty());
    }
}
