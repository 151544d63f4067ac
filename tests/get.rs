use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tftp::client;
use tftp::packet::Mode;
use tftp::{Config, Directory, Server, ServerHandle};

fn exemplar(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

fn serve(dir: &Path) -> ServerHandle<Directory> {
    let handler = Directory::new(dir).unwrap();
    Server::bind("127.0.0.1:0", handler, Config::default())
        .unwrap()
        .spawn()
        .unwrap()
}

fn get(server: &ServerHandle<Directory>, config: Config, file: &str) -> std::io::Result<Vec<u8>> {
    let mut client = client::Builder::new()
        .with_config(config)
        .connect_to(server.local_addr().unwrap())
        .unwrap()
        .build();

    client.get(file, Mode::Octet, Vec::new())
}

#[test]
fn test_get() {
    let serve_dir = tempfile::tempdir().unwrap();
    let exemplar = exemplar(3000);
    fs::write(serve_dir.path().join("alice-in-wonderland.txt"), &exemplar).unwrap();
    let server = serve(serve_dir.path());

    let actual = get(&server, Config::default(), "alice-in-wonderland.txt").unwrap();
    assert_eq!(&actual[..], &exemplar[..]);

    server.stop().unwrap();
}

#[test]
fn test_get_without_options() {
    let serve_dir = tempfile::tempdir().unwrap();
    let exemplar = exemplar(1024);
    fs::write(serve_dir.path().join("two-blocks.bin"), &exemplar).unwrap();
    let server = serve(serve_dir.path());

    // An exact multiple of the block size ends with an empty block.
    let config = Config::default().with_options(false);
    let actual = get(&server, config, "two-blocks.bin").unwrap();
    assert_eq!(actual, exemplar);

    server.stop().unwrap();
}

#[test]
fn test_get_with_small_blocks() {
    let serve_dir = tempfile::tempdir().unwrap();
    let exemplar = exemplar(777);
    fs::write(serve_dir.path().join("small.bin"), &exemplar).unwrap();
    let server = serve(serve_dir.path());

    let config = Config::default().with_block_size(64);
    let actual = get(&server, config, "small.bin").unwrap();
    assert_eq!(actual, exemplar);

    server.stop().unwrap();
}

#[test]
fn test_get_missing_file() {
    let serve_dir = tempfile::tempdir().unwrap();
    let server = serve(serve_dir.path());

    let err = get(&server, Config::default(), "nope.txt").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert_eq!(err.to_string(), "Blocked by user application");

    server.stop().unwrap();
}

#[test]
fn test_get_outside_the_root() {
    let serve_dir = tempfile::tempdir().unwrap();
    fs::create_dir(serve_dir.path().join("public")).unwrap();
    fs::write(serve_dir.path().join("secret"), b"hidden").unwrap();
    let server = serve(&serve_dir.path().join("public"));

    assert!(get(&server, Config::default(), "../secret").is_err());

    server.stop().unwrap();
}
