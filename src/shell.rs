use std::{
    io::{self, Write},
    path::PathBuf,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader},
    net::TcpStream,
};

use crate::{
    client::{Client, Fetched},
    error::{Error, Result},
    protocol::Command,
};

const HELP: &str = "\
Commands are:

ls:\t\t\t\t print a listing of the contents of the current directory
get <remote-file>:\t\t retrieve the <remote-file> on the server and store it in the current directory
put <file-name>:\t\t put and store the file from the client machine to the server machine.
cd <directory-name>:\t\t change the directory on the server
mkdir <directory-name>:\t\t create a new sub-directory named <directory-name>
quit:\t\t\t\t end the session";

#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Remote(Command),
    Help,
    Clear,
    Invalid,
}

impl Input {
    pub fn parse(line: &str) -> Input {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            ["ls"] => Input::Remote(Command::Ls),
            ["quit"] => Input::Remote(Command::Quit),
            ["help"] => Input::Help,
            ["clear"] => Input::Clear,
            ["cd", dir] => Input::Remote(Command::Cd(dir.to_string())),
            ["mkdir", dir] => Input::Remote(Command::Mkdir(dir.to_string())),
            ["get", file] => Input::Remote(Command::Get(file.to_string())),
            ["put", file] => Input::Remote(Command::Put(file.to_string())),
            _ => Input::Invalid,
        }
    }
}

pub async fn run(server_ip: &str, port: u16, quiet: bool) -> Result<()> {
    let conn = TcpStream::connect((server_ip, port)).await?;
    log::info!("Connected to {}:{}", server_ip, port);

    let client = Client::new(conn, PathBuf::from("."), !quiet);
    let result = interact(client).await;
    if let Err(Error::Disconnected { .. }) = &result {
        println!("Server is closed, shutting off client.");
    }
    result
}

async fn interact<S>(mut client: Client<S>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("ft> ");
        io::stdout().flush()?;

        // End of input behaves like quit.
        let Some(line) = lines.next_line().await? else {
            return client.quit().await;
        };

        match Input::parse(&line) {
            Input::Remote(Command::Quit) => return client.quit().await,
            Input::Remote(command) => {
                if let Err(e) = execute(&mut client, command).await {
                    if e.is_fatal() {
                        return Err(e);
                    }
                    println!("{}", e);
                }
            }
            Input::Help => println!("{}", HELP),
            Input::Clear => print!("\x1B[2J\x1B[1;1H"),
            Input::Invalid => {
                println!("Invalid command.");
                println!("{}", HELP);
            }
        }
    }
}

async fn execute<S>(client: &mut Client<S>, command: Command) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match command {
        Command::Ls => print!("{}", client.ls().await?),
        Command::Cd(dir) => {
            if let Some(reply) = client.cd(&dir).await? {
                println!("{}", reply);
            }
        }
        Command::Mkdir(dir) => {
            if let Some(reply) = client.mkdir(&dir).await? {
                println!("{}", reply);
            }
        }
        Command::Get(file) => match client.get(&file).await? {
            Fetched::Missing => println!("File does not exist on server. Please try again."),
            Fetched::Saved { path, size } => {
                log::info!("Saved {} ({} bytes)", path.display(), size)
            }
        },
        Command::Put(file) => println!("{}", client.put(&file).await?),
        Command::Quit | Command::Unknown(_) => {}
    }
    Ok(())
}
