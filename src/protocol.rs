//! Wire format shared by both peers.
//!
//! * Command frames are exactly [`FRAME_CAPACITY`] bytes of text. Unused
//!   capacity is zero-filled and the first NUL ends the logical content.
//! * Length headers are 8-byte signed integers in host byte order. There is
//!   no endianness normalisation, so both peers must share a byte order.
//!   Switching to `to_be_bytes`/`from_be_bytes` is the fix if that ever
//!   stops holding.
//! * Payloads are the next N raw bytes, N taken from the last length header.

use std::{borrow::Cow, fmt};

use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    error::{Error, Result},
    transfer::{fill, recv_all, send_all},
};

pub const FRAME_CAPACITY: usize = 1024;
pub const HEADER_LEN: usize = 8;
pub const DEFAULT_PORT: u16 = 6666;

/// Length header sent in answer to `get` when the file does not exist.
pub const MISSING_FILE: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Fail,
    FileSize,
    ServerReady,
    ClientReady,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Fail => "fail",
            Status::FileSize => "filesize",
            Status::ServerReady => "serverReady",
            Status::ClientReady => "clientReady",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ls,
    Cd(String),
    Mkdir(String),
    Get(String),
    Put(String),
    Quit,
    Unknown(String),
}

impl Command {
    /// Splits on the first run of whitespace: verb, then argument. A verb
    /// that needs an argument but has none gets an empty one.
    pub fn parse(text: &str) -> Command {
        let text = text.trim_start().trim_end_matches(['\r', '\n']);
        let (verb, arg) = match text.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim_start()),
            None => (text, ""),
        };

        match verb {
            "ls" => Command::Ls,
            "cd" => Command::Cd(arg.to_string()),
            "mkdir" => Command::Mkdir(arg.to_string()),
            "get" => Command::Get(arg.to_string()),
            "put" => Command::Put(arg.to_string()),
            "quit" => Command::Quit,
            _ => Command::Unknown(text.to_string()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Ls => f.write_str("ls"),
            Command::Cd(path) => write!(f, "cd {}", path),
            Command::Mkdir(path) => write!(f, "mkdir {}", path),
            Command::Get(path) => write!(f, "get {}", path),
            Command::Put(path) => write!(f, "put {}", path),
            Command::Quit => f.write_str("quit"),
            Command::Unknown(text) => f.write_str(text),
        }
    }
}

pub struct Frame {
    buf: Box<[u8; FRAME_CAPACITY]>,
}

impl Frame {
    #[cfg(test)]
    pub fn from_text(text: &str) -> Frame {
        Frame {
            buf: Frame::encode(text),
        }
    }

    /// Zero-padded to capacity; longer text is cut at capacity.
    pub fn encode(text: &str) -> Box<[u8; FRAME_CAPACITY]> {
        let mut buf = Box::new([0u8; FRAME_CAPACITY]);
        let bytes = text.as_bytes();
        let len = bytes.len().min(FRAME_CAPACITY);
        buf[..len].copy_from_slice(&bytes[..len]);
        buf
    }

    pub fn content(&self) -> &[u8] {
        let end = self
            .buf
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(FRAME_CAPACITY);
        &self.buf[..end]
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.content())
    }

    pub fn is(&self, status: Status) -> bool {
        self.content() == status.as_str().as_bytes()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Frame").field(&self.text()).finish()
    }
}

#[derive(Debug)]
pub enum Received {
    Frame(Frame),
    Closed,
}

pub async fn send_frame<W>(conn: &mut W, text: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    send_all(conn, &Frame::encode(text)[..]).await
}

pub async fn send_status<W>(conn: &mut W, status: Status) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    send_frame(conn, status.as_str()).await
}

/// Reads one whole frame. Zero bytes before the frame starts is a clean
/// close; a frame cut short is a disconnect.
pub async fn recv_frame<R>(conn: &mut R) -> Result<Received>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Box::new([0u8; FRAME_CAPACITY]);
    let n = fill(conn, &mut buf[..]).await?;
    match n {
        0 => Ok(Received::Closed),
        n if n < FRAME_CAPACITY => Err(Error::Disconnected {
            expected: FRAME_CAPACITY as u64,
            received: n as u64,
        }),
        _ => Ok(Received::Frame(Frame { buf })),
    }
}

/// Like [`recv_frame`], for replies that must arrive mid-command.
pub async fn expect_frame<R>(conn: &mut R) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    match recv_frame(conn).await? {
        Received::Frame(frame) => Ok(frame),
        Received::Closed => Err(Error::Disconnected {
            expected: FRAME_CAPACITY as u64,
            received: 0,
        }),
    }
}

pub async fn expect_status<R>(conn: &mut R, status: Status) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let frame = expect_frame(conn).await?;
    if frame.is(status) {
        Ok(())
    } else {
        Err(Error::ProtocolViolation {
            expected: status,
            received: frame.text().into_owned(),
        })
    }
}

pub async fn send_header<W>(conn: &mut W, len: i64) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    send_all(conn, &len.to_ne_bytes()).await
}

pub async fn recv_header<R>(conn: &mut R) -> Result<i64>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; HEADER_LEN];
    recv_all(conn, &mut buf).await?;
    Ok(i64::from_ne_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::Trickle;

    #[test]
    fn parse_splits_on_first_whitespace_run() {
        assert_eq!(Command::parse("ls"), Command::Ls);
        assert_eq!(Command::parse("cd   sub dir"), Command::Cd("sub dir".into()));
        assert_eq!(Command::parse("mkdir\tnew"), Command::Mkdir("new".into()));
        assert_eq!(Command::parse("get a.txt\n"), Command::Get("a.txt".into()));
        assert_eq!(Command::parse("put"), Command::Put(String::new()));
        assert_eq!(Command::parse("quit"), Command::Quit);
        assert_eq!(
            Command::parse("getx a.txt"),
            Command::Unknown("getx a.txt".into())
        );
    }

    #[test]
    fn display_is_what_parse_reads() {
        for cmd in [
            Command::Ls,
            Command::Cd("d".into()),
            Command::Mkdir("m".into()),
            Command::Get("g.bin".into()),
            Command::Put("p.bin".into()),
            Command::Quit,
        ] {
            assert_eq!(Command::parse(&cmd.to_string()), cmd);
        }
    }

    #[tokio::test]
    async fn frames_are_zero_padded_to_capacity() {
        let mut wire = Vec::new();
        send_frame(&mut wire, "mkdir a-rather-long-directory-name")
            .await
            .unwrap();
        send_frame(&mut wire, "ls").await.unwrap();

        assert_eq!(wire.len(), 2 * FRAME_CAPACITY);
        let second = &wire[FRAME_CAPACITY..];
        assert_eq!(&second[..2], b"ls");
        assert!(second[2..].iter().all(|&b| b == 0));
    }

    #[tokio::test]
    async fn oversized_text_is_truncated() {
        let long = "x".repeat(FRAME_CAPACITY + 100);
        let mut wire = Vec::new();
        send_frame(&mut wire, &long).await.unwrap();
        assert_eq!(wire.len(), FRAME_CAPACITY);

        let mut conn = &wire[..];
        let Received::Frame(frame) = recv_frame(&mut conn).await.unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(frame.content().len(), FRAME_CAPACITY);
    }

    #[tokio::test]
    async fn content_stops_at_first_nul() {
        let mut raw = vec![0u8; FRAME_CAPACITY];
        raw[..7].copy_from_slice(b"success");
        raw[8..12].copy_from_slice(b"junk");
        let mut conn = &raw[..];
        let frame = expect_frame(&mut conn).await.unwrap();
        assert_eq!(frame.text(), "success");
        assert!(frame.is(Status::Success));
    }

    #[tokio::test]
    async fn frame_arrives_in_fragments() {
        let mut wire = Vec::new();
        send_status(&mut wire, Status::ServerReady).await.unwrap();
        wire.extend_from_slice(b"next");

        let mut conn = Trickle::new(&wire[..]);
        expect_status(&mut conn, Status::ServerReady).await.unwrap();
        assert_eq!(conn.into_inner(), b"next");
    }

    #[tokio::test]
    async fn empty_stream_is_clean_close() {
        let mut conn: &[u8] = &[];
        assert!(matches!(
            recv_frame(&mut conn).await.unwrap(),
            Received::Closed
        ));

        let mut conn: &[u8] = &[];
        assert!(expect_frame(&mut conn).await.unwrap_err().is_fatal());
    }

    #[tokio::test]
    async fn partial_frame_is_disconnect() {
        let mut conn: &[u8] = b"ls";
        match recv_frame(&mut conn).await {
            Err(Error::Disconnected { expected, received }) => {
                assert_eq!(expected, FRAME_CAPACITY as u64);
                assert_eq!(received, 2);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn mismatched_token_is_violation() {
        let mut wire = Vec::new();
        send_status(&mut wire, Status::Fail).await.unwrap();
        let mut conn = &wire[..];
        match expect_status(&mut conn, Status::FileSize).await {
            Err(Error::ProtocolViolation { expected, received }) => {
                assert_eq!(expected, Status::FileSize);
                assert_eq!(received, "fail");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn header_is_eight_host_order_bytes() {
        let mut wire = Vec::new();
        send_header(&mut wire, 5000).await.unwrap();
        send_header(&mut wire, MISSING_FILE).await.unwrap();
        assert_eq!(wire.len(), 2 * HEADER_LEN);
        assert_eq!(&wire[..HEADER_LEN], &5000i64.to_ne_bytes());

        let mut conn = Trickle::new(&wire[..]);
        assert_eq!(recv_header(&mut conn).await.unwrap(), 5000);
        assert_eq!(recv_header(&mut conn).await.unwrap(), -1);
    }

    #[tokio::test]
    async fn short_header_is_disconnect() {
        let mut conn: &[u8] = &[1, 2, 3];
        assert!(recv_header(&mut conn).await.unwrap_err().is_fatal());
    }
}
