use std::fs::File;
use std::io::{self, Result, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use argh::FromArgs;

use tftp::client;
use tftp::packet::Mode;
use tftp::{Config, RetransmissionConfig};

#[derive(FromArgs, Debug)]
#[argh(description = "Transfer a file to or from a TFTP server")]
struct Args {
    #[argh(positional, description = "address and port of the server")]
    server: String,

    #[argh(switch, description = "transfer in netascii mode")]
    netascii: bool,

    #[argh(option, default = "1000", description = "retransmission timeout in milliseconds")]
    timeout_ms: u64,

    #[argh(option, default = "tftp::DEFAULT_MAX_RETRANSMISSIONS", description = "retransmissions before giving up")]
    retries: usize,

    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand)]
enum Command {
    Get(Get),
    Put(Put),
}

#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "get", description = "download a file to stdout")]
struct Get {
    #[argh(positional, description = "name of the file on the server")]
    file: String,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "put", description = "upload a local file")]
struct Put {
    #[argh(positional, description = "path of the local file")]
    path: PathBuf,
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(String::from)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "not a file path"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args: Args = argh::from_env();

    let mode = if args.netascii {
        Mode::NetAscii
    } else {
        Mode::Octet
    };
    let config = Config::default().with_retransmission(RetransmissionConfig::new(
        Duration::from_millis(args.timeout_ms),
        args.retries,
    ));

    let mut client = client::Builder::new()
        .with_config(config)
        .connect_to(&args.server)?
        .build();

    match args.command {
        Command::Get(get) => {
            let contents = client.get(get.file, mode, Vec::new())?;
            io::stdout().write_all(&contents)?;
        }
        Command::Put(put) => {
            let source = File::open(&put.path)?;
            let size = source.metadata()?.len();
            client.put(file_name(&put.path)?, mode, source, size)?;
        }
    }

    Ok(())
}
