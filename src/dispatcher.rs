use std::path::{Path, PathBuf};

use indicatif::ProgressBar;
use tokio::{
    fs,
    io::{AsyncRead, AsyncWrite},
};

use crate::{
    error::{Error, Result},
    local_fs::{self, OpenedFile},
    protocol::{
        expect_status, recv_header, send_frame, send_header, send_status, Command, Frame, Status,
        FRAME_CAPACITY, MISSING_FILE,
    },
    transfer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Replied,
    /// Unrecognized command; nothing was sent back.
    NoReply,
    Quit,
}

/// Server-side state of one connection.
pub struct Session {
    cwd: PathBuf,
}

impl Session {
    pub fn new(root: PathBuf) -> Self {
        Self { cwd: root }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    fn resolve(&self, arg: &str) -> Option<PathBuf> {
        if arg.is_empty() {
            None
        } else {
            Some(self.cwd.join(arg))
        }
    }

    pub async fn dispatch<S>(&mut self, conn: &mut S, frame: &Frame) -> Result<Outcome>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let command = Command::parse(&frame.text());
        log::info!("Received command: {}", command);

        match command {
            Command::Ls => self.list(conn).await,
            Command::Cd(path) => self.change_dir(conn, &path).await,
            Command::Mkdir(path) => self.make_dir(conn, &path).await,
            Command::Get(path) => self.send_file(conn, &path).await,
            Command::Put(path) => self.receive_file(conn, &path).await,
            Command::Quit => Ok(Outcome::Quit),
            Command::Unknown(text) => {
                log::warn!("Ignoring unrecognized command {:?}", text);
                Ok(Outcome::NoReply)
            }
        }
    }

    async fn list<S>(&mut self, conn: &mut S) -> Result<Outcome>
    where
        S: AsyncWrite + Unpin,
    {
        let listing = match local_fs::list_dir(&self.cwd).await {
            Ok(listing) => listing,
            Err(e) => {
                send_status(conn, Status::Fail).await?;
                return Err(Error::resource(&self.cwd, e));
            }
        };
        if listing.len() > FRAME_CAPACITY {
            log::warn!(
                "Listing of {} is {} bytes, truncated to {}",
                self.cwd.display(),
                listing.len(),
                FRAME_CAPACITY
            );
        }
        send_frame(conn, &listing).await?;
        Ok(Outcome::Replied)
    }

    async fn change_dir<S>(&mut self, conn: &mut S, path: &str) -> Result<Outcome>
    where
        S: AsyncWrite + Unpin,
    {
        let target = match self.resolve(path) {
            Some(target) => existing_dir(&target).await,
            None => None,
        };
        let status = match target {
            Some(dir) => {
                log::info!("cd success: {}", dir.display());
                self.cwd = dir;
                Status::Success
            }
            None => {
                log::info!("cd fail: {:?}", path);
                Status::Fail
            }
        };
        send_status(conn, status).await?;
        Ok(Outcome::Replied)
    }

    async fn make_dir<S>(&mut self, conn: &mut S, path: &str) -> Result<Outcome>
    where
        S: AsyncWrite + Unpin,
    {
        let status = match self.resolve(path) {
            Some(target) => match local_fs::make_dir(&target).await {
                Ok(()) => {
                    log::info!("mkdir success: {}", target.display());
                    Status::Success
                }
                Err(e) => {
                    log::info!("mkdir fail: {}: {}", target.display(), e);
                    Status::Fail
                }
            },
            None => Status::Fail,
        };
        send_status(conn, status).await?;
        Ok(Outcome::Replied)
    }

    async fn send_file<S>(&mut self, conn: &mut S, path: &str) -> Result<Outcome>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let opened = match self.resolve(path) {
            Some(target) => match OpenedFile::open(&target).await {
                Ok(opened) => Some(opened),
                Err(e) => {
                    log::info!("get: {}", e);
                    None
                }
            },
            None => None,
        };
        let Some(mut opened) = opened else {
            send_header(conn, MISSING_FILE).await?;
            return Ok(Outcome::Replied);
        };
        let Ok(len) = i64::try_from(opened.size) else {
            log::warn!("get: {} is too large to announce", opened.path.display());
            send_header(conn, MISSING_FILE).await?;
            return Ok(Outcome::Replied);
        };

        send_header(conn, len).await?;
        log::debug!("Sent size {} of {}", len, opened.path.display());

        expect_status(conn, Status::ClientReady).await?;
        transfer::send_file(&mut opened.file, conn, opened.size, &ProgressBar::hidden()).await?;
        log::info!("Sent {} ({} bytes)", opened.path.display(), opened.size);
        Ok(Outcome::Replied)
    }

    async fn receive_file<S>(&mut self, conn: &mut S, path: &str) -> Result<Outcome>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let created = match self.resolve(path) {
            Some(target) => local_fs::create_file(&target)
                .await
                .map(|file| (target, file)),
            None => Err(Error::resource(
                path,
                std::io::Error::from(std::io::ErrorKind::InvalidInput),
            )),
        };
        let (target, file) = match created {
            Ok(created) => created,
            Err(e) => {
                send_status(conn, Status::Fail).await?;
                return Err(e);
            }
        };
        store_upload(conn, file, &target).await
    }
}

/// Runs the upload into `file`; a failed transfer removes `target`.
async fn store_upload<S, F>(conn: &mut S, mut file: F, target: &Path) -> Result<Outcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: AsyncWrite + Unpin,
{
    let result = receive_upload(conn, &mut file).await;
    drop(file);

    match result {
        Ok(len) => {
            log::info!("Received {} ({} bytes)", target.display(), len);
            send_status(conn, Status::Success).await?;
            Ok(Outcome::Replied)
        }
        Err(e) => {
            local_fs::discard(target).await;
            if matches!(e, Error::LocalIo(_)) {
                send_status(conn, Status::Fail).await?;
            }
            Err(e)
        }
    }
}

/// Handshake and payload of `put`, once the target file exists.
async fn receive_upload<S, F>(conn: &mut S, file: &mut F) -> Result<u64>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: AsyncWrite + Unpin,
{
    send_status(conn, Status::FileSize).await?;
    let len = recv_header(conn).await?;
    let Ok(size) = u64::try_from(len) else {
        send_status(conn, Status::Fail).await?;
        return Err(Error::InvalidLength(len));
    };
    send_status(conn, Status::ServerReady).await?;
    transfer::recv_file(conn, file, size, &ProgressBar::hidden()).await?;
    Ok(size)
}

async fn existing_dir(path: &Path) -> Option<PathBuf> {
    let dir = fs::canonicalize(path).await.ok()?;
    let meta = fs::metadata(&dir).await.ok()?;
    meta.is_dir().then_some(dir)
}
