use std::io::Result;
use std::path::PathBuf;

use argh::FromArgs;

use tftp::{Config, Directory, Server};

#[derive(FromArgs, Debug)]
#[argh(
    description = "Serve a directory over TFTP",
    example = "Serve ./artifacts on a non-privileged port:\n  {command_name} 0.0.0.0:6655 ./artifacts"
)]
struct Args {
    #[argh(positional, description = "address and port to listen on")]
    address: String,

    #[argh(positional, description = "directory to serve files from")]
    root: PathBuf,

    #[argh(switch, description = "let uploads replace existing files")]
    allow_overwrite: bool,

    #[argh(switch, description = "ignore the blksize, timeout and tsize options")]
    no_options: bool,

    #[argh(option, default = "tftp::packet::MAX_BLOCK_SIZE", description = "largest block size to accept")]
    block_size: u16,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args: Args = argh::from_env();

    let handler = Directory::new(&args.root)?.allow_overwrite(args.allow_overwrite);
    let config = Config::default()
        .with_options(!args.no_options)
        .with_block_size(args.block_size);

    let server = Server::bind(&args.address, handler, config)?;
    if let Some(addr) = server.local_addr() {
        println!("Serving Trivial File Transfer Protocol (TFTP) @ {}", addr);
    }

    server.serve()?;
    Ok(())
}
