use std::path::PathBuf;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::{
    error::{Error, Result},
    local_fs::{self, OpenedFile},
    protocol::{
        expect_frame, expect_status, recv_header, send_frame, send_header, send_status, Command,
        Status, MISSING_FILE,
    },
    transfer,
};

#[derive(Debug, PartialEq, Eq)]
pub enum Fetched {
    Missing,
    Saved { path: PathBuf, size: u64 },
}

/// Client half of the protocol: one method per remote command, each
/// performing exactly the exchange the server's dispatcher expects.
pub struct Client<S> {
    conn: S,
    local_dir: PathBuf,
    show_progress: bool,
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(conn: S, local_dir: PathBuf, show_progress: bool) -> Self {
        Self {
            conn,
            local_dir,
            show_progress,
        }
    }

    async fn send_command(&mut self, command: &Command) -> Result<()> {
        log::debug!("Sending command '{}'", command);
        send_frame(&mut self.conn, &command.to_string()).await
    }

    pub async fn ls(&mut self) -> Result<String> {
        self.send_command(&Command::Ls).await?;
        let reply = expect_frame(&mut self.conn).await?;
        Ok(reply.text().into_owned())
    }

    /// `None` on success, otherwise the server's reply text.
    pub async fn cd(&mut self, dir: &str) -> Result<Option<String>> {
        self.status_request(Command::Cd(dir.to_string())).await
    }

    pub async fn mkdir(&mut self, dir: &str) -> Result<Option<String>> {
        self.status_request(Command::Mkdir(dir.to_string())).await
    }

    async fn status_request(&mut self, command: Command) -> Result<Option<String>> {
        self.send_command(&command).await?;
        let reply = expect_frame(&mut self.conn).await?;
        if reply.is(Status::Success) {
            Ok(None)
        } else {
            Ok(Some(reply.text().into_owned()))
        }
    }

    pub async fn get(&mut self, remote: &str) -> Result<Fetched> {
        self.send_command(&Command::Get(remote.to_string())).await?;

        let len = recv_header(&mut self.conn).await?;
        if len == MISSING_FILE {
            return Ok(Fetched::Missing);
        }
        // Anything but clientReady makes the server drop the transfer.
        let Ok(size) = u64::try_from(len) else {
            send_status(&mut self.conn, Status::Fail).await?;
            return Err(Error::InvalidLength(len));
        };

        let path = self.local_dir.join(remote);
        let mut file = match local_fs::create_file(&path).await {
            Ok(file) => file,
            Err(e) => {
                send_status(&mut self.conn, Status::Fail).await?;
                return Err(e);
            }
        };

        send_status(&mut self.conn, Status::ClientReady).await?;

        let progress = self.progress_bar(size, format!("Downloading {}", remote));
        let result = transfer::recv_file(&mut self.conn, &mut file, size, &progress).await;
        drop(file);

        match result {
            Ok(()) => {
                progress.finish_with_message("Download completed");
                Ok(Fetched::Saved { path, size })
            }
            Err(e) => {
                progress.abandon();
                local_fs::discard(&path).await;
                Err(e)
            }
        }
    }

    /// Uploads `local` under the same name; returns the server's final status.
    pub async fn put(&mut self, local: &str) -> Result<String> {
        let path = self.local_dir.join(local);
        let mut opened = OpenedFile::open(&path).await?;
        let len = i64::try_from(opened.size).map_err(|_| Error::InvalidLength(i64::MAX))?;

        self.send_command(&Command::Put(local.to_string())).await?;
        expect_status(&mut self.conn, Status::FileSize).await?;
        send_header(&mut self.conn, len).await?;
        expect_status(&mut self.conn, Status::ServerReady).await?;

        let progress = self.progress_bar(opened.size, format!("Uploading {}", local));
        let sent = transfer::send_file(&mut opened.file, &mut self.conn, opened.size, &progress).await;
        let local_err = match sent {
            Ok(()) => {
                progress.finish_with_message("Upload completed");
                None
            }
            Err(e) if e.is_fatal() => {
                progress.abandon();
                return Err(e);
            }
            Err(e) => {
                progress.abandon();
                Some(e)
            }
        };

        // The payload is on the wire either way; the status still follows.
        let reply = expect_frame(&mut self.conn).await?;
        if let Some(e) = local_err {
            return Err(e);
        }
        Ok(reply.text().into_owned())
    }

    pub async fn quit(mut self) -> Result<()> {
        self.send_command(&Command::Quit).await?;
        self.conn.shutdown().await?;
        Ok(())
    }

    fn progress_bar(&self, len: u64, message: String) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let progress_bar = ProgressBar::new(len);
        match ProgressStyle::default_bar().template("{msg} {wide_bar} {bytes}/{total_bytes} ({eta})")
        {
            Ok(style) => progress_bar.set_style(style.progress_chars("##-")),
            Err(e) => log::debug!("Progress template rejected: {}", e),
        }
        progress_bar.set_message(message);
        progress_bar
    }
}
