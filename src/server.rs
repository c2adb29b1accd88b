use std::{
    future::Future,
    io,
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use local_ip_address::local_ip;
use tokio::{
    fs,
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
};

use crate::{
    dispatcher::{Outcome, Session},
    error::{Error, Result},
    protocol::{recv_frame, Received},
};

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Serves one connection at a time; the listen backlog holds the rest.
pub struct Server {
    listener: TcpListener,
    root: PathBuf,
}

impl Server {
    pub async fn bind(address: IpAddr, port: u16, root: PathBuf) -> Result<Server> {
        let root = fs::canonicalize(&root)
            .await
            .map_err(|e| Error::resource(&root, e))?;
        let server = Self {
            listener: TcpListener::bind((address, port)).await?,
            root,
        };
        let bound = server.local_addr()?;

        log::info!("Serving {}", server.root.display());
        if address.is_unspecified() {
            match local_ip() {
                Ok(ip) => println!("Server is hosted on {}:{}", ip, bound.port()),
                Err(e) => {
                    log::warn!("Could not determine local address: {}", e);
                    println!("Server is hosted on {}", bound);
                }
            }
        } else {
            println!("Server is hosted on {}", bound);
        }

        Ok(server)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self) {
        loop {
            log::info!("Waiting for connection request");
            let listener = &self.listener;
            let (socket, peer) = accept_with_backoff(|| listener.accept()).await;

            log::info!("Connection from {}", peer);
            // Every connection starts in the served root.
            process_socket(socket, Session::new(self.root.clone())).await;
            log::info!("Connection from {} closed", peer);
        }
    }
}

/// Retries `accept` until it succeeds, pausing after each failure.
async fn accept_with_backoff<F, Fut, T>(mut accept: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    loop {
        match accept().await {
            Ok(accepted) => return accepted,
            Err(e) => {
                log::error!("Failed to accept connection: {}", e);
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
    }
}

pub async fn process_socket<S>(mut socket: S, mut session: Session)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let frame = match recv_frame(&mut socket).await {
            Ok(Received::Frame(frame)) => frame,
            Ok(Received::Closed) => break,
            Err(e) => {
                log::error!("Failed to read command: {}", e);
                break;
            }
        };

        match session.dispatch(&mut socket, &frame).await {
            Ok(Outcome::Quit) => {
                log::info!("Client quit");
                break;
            }
            Ok(_) => {}
            Err(e) if e.is_fatal() => {
                log::error!("Session aborted: {}", e);
                break;
            }
            Err(e) => log::warn!("Command failed: {}", e),
        }
    }
    log::debug!("Session ended in {}", session.cwd().display());
}
