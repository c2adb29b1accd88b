//! Moves exact byte counts across the connection.
//!
//! Every loop here tolerates partial reads and writes. Once a length header
//! has been exchanged the wire always carries exactly that many payload
//! bytes, so a failing local file never desynchronises the two peers.

use std::io;

use indicatif::ProgressBar;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

pub const CHUNK_SIZE: usize = 64 * 1024;

/// Scratch space for a `len`-byte transfer, capped at one chunk.
fn chunk_buffer(len: u64) -> Vec<u8> {
    vec![0u8; usize::try_from(len).map_or(CHUNK_SIZE, |len| len.min(CHUNK_SIZE))]
}

/// Reads until `buf` is full or the reader hits end of stream.
pub(crate) async fn fill<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

pub async fn send_all<W>(conn: &mut W, bytes: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut offset = 0;
    while offset < bytes.len() {
        let n = conn.write(&bytes[offset..]).await?;
        if n == 0 {
            return Err(io::Error::from(io::ErrorKind::WriteZero).into());
        }
        offset += n;
    }
    conn.flush().await?;
    Ok(())
}

/// Fills `buf` completely; end of stream first is a disconnect.
pub async fn recv_all<R>(conn: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let received = fill(conn, buf).await?;
    if received < buf.len() {
        return Err(Error::Disconnected {
            expected: buf.len() as u64,
            received: received as u64,
        });
    }
    Ok(())
}

/// Streams `len` bytes from a local file onto the connection.
///
/// If the file runs short or fails, the rest of the payload is zero-filled
/// and `Error::LocalIo` is returned after the last byte is on the wire.
pub async fn send_file<F, W>(
    file: &mut F,
    conn: &mut W,
    len: u64,
    progress: &ProgressBar,
) -> Result<()>
where
    F: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = chunk_buffer(len);
    let mut remaining = len;
    let mut local_err = None;

    while remaining > 0 {
        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        let chunk = &mut buf[..want];

        let got = if local_err.is_some() {
            0
        } else {
            match fill(file, chunk).await {
                Ok(n) if n < want => {
                    local_err = Some(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "file shorter than announced length",
                    ));
                    n
                }
                Ok(n) => n,
                Err(e) => {
                    local_err = Some(e);
                    0
                }
            }
        };
        chunk[got..].fill(0);

        send_all(conn, chunk).await?;
        remaining -= want as u64;
        progress.inc(want as u64);
    }

    match local_err {
        Some(e) => Err(Error::LocalIo(e)),
        None => Ok(()),
    }
}

/// Receives exactly `len` payload bytes into a local file.
///
/// A write failure on the local side stops writing but keeps draining the
/// connection until the whole payload has been consumed.
pub async fn recv_file<R, F>(
    conn: &mut R,
    file: &mut F,
    len: u64,
    progress: &ProgressBar,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    F: AsyncWrite + Unpin,
{
    let mut buf = chunk_buffer(len);
    let mut received = 0u64;
    let mut local_err = None;

    while received < len {
        let want = (len - received).min(CHUNK_SIZE as u64) as usize;
        let n = conn.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(Error::Disconnected {
                expected: len,
                received,
            });
        }
        if local_err.is_none() {
            if let Err(e) = file.write_all(&buf[..n]).await {
                log::warn!("Local write failed after {} bytes: {}", received, e);
                local_err = Some(e);
            }
        }
        received += n as u64;
        progress.inc(n as u64);
    }

    if local_err.is_none() {
        if let Err(e) = file.flush().await {
            local_err = Some(e);
        }
    }

    match local_err {
        Some(e) => Err(Error::LocalIo(e)),
        None => Ok(()),
    }
}
