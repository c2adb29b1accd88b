use std::path::PathBuf;

use clap::Parser;
mod cli;
mod client;
mod dispatcher;
mod error;
mod local_fs;
mod protocol;
mod server;
mod shell;
mod transfer;

#[cfg(test)]
mod testutil;

use cli::Commands;
use cli::CLI;
use server::Server;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = CLI::parse();

    let result = match cli.subcommand {
        Commands::Serve { bind, port, root } => {
            let root = root.unwrap_or_else(|| PathBuf::from("."));
            match Server::bind(bind, port, root).await {
                Ok(server) => {
                    server.run().await;
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
        Commands::Connect {
            server_ip,
            port,
            quiet,
        } => shell::run(&server_ip, port, quiet).await,
    };

    if let Err(e) = result {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
