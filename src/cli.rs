use std::{net::IpAddr, path::PathBuf};

use clap::{Parser, Subcommand};

use crate::protocol::DEFAULT_PORT;

#[derive(Parser, Debug)]
#[command(version,about,long_about = None)]
pub struct CLI {
    #[command(subcommand)]
    pub subcommand: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve a directory to one client at a time
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        bind: IpAddr,
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Directory every session starts in [default: current directory]
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Open an interactive session with a server
    Connect {
        server_ip: String,
        #[arg(default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Hide transfer progress bars
        #[arg(short, long)]
        quiet: bool,
    },
}
