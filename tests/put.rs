use std::fs;
use std::io::ErrorKind;

use tftp::client;
use tftp::packet::Mode;
use tftp::{Config, Directory, Server};

fn exemplar(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 13 % 256) as u8).collect()
}

#[test]
fn test_put() {
    let serve_dir = tempfile::tempdir().unwrap();
    let handler = Directory::new(serve_dir.path()).unwrap();
    let server = Server::bind("127.0.0.1:0", handler, Config::default())
        .unwrap()
        .spawn()
        .unwrap();

    let data = exemplar(5000);
    let mut client = client::Builder::new()
        .connect_to(server.local_addr().unwrap())
        .unwrap()
        .build();

    client
        .put("alice-in-wonderland.txt", Mode::Octet, &data[..], data.len() as u64)
        .unwrap();
    server.stop().unwrap();

    let actual = fs::read(serve_dir.path().join("alice-in-wonderland.txt")).unwrap();
    assert_eq!(&actual[..], &data[..]);
}

#[test]
fn test_put_empty_file_without_options() {
    let serve_dir = tempfile::tempdir().unwrap();
    let handler = Directory::new(serve_dir.path()).unwrap();
    let server = Server::bind("127.0.0.1:0", handler, Config::default())
        .unwrap()
        .spawn()
        .unwrap();

    let mut client = client::Builder::new()
        .with_config(Config::default().with_options(false))
        .connect_to(server.local_addr().unwrap())
        .unwrap()
        .build();

    client.put("empty", Mode::Octet, &b""[..], 0).unwrap();
    server.stop().unwrap();

    assert_eq!(fs::read(serve_dir.path().join("empty")).unwrap(), b"");
}

#[test]
fn test_put_when_already_exists() {
    let serve_dir = tempfile::tempdir().unwrap();
    fs::write(serve_dir.path().join("alice-in-wonderland.txt"), b"original").unwrap();
    let handler = Directory::new(serve_dir.path()).unwrap();
    let server = Server::bind("127.0.0.1:0", handler, Config::default())
        .unwrap()
        .spawn()
        .unwrap();

    let data = exemplar(100);
    let mut client = client::Builder::new()
        .connect_to(server.local_addr().unwrap())
        .unwrap()
        .build();

    // The file already exists, so the server refuses the write.
    let err = client
        .put("alice-in-wonderland.txt", Mode::Octet, &data[..], 100)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    server.stop().unwrap();

    let actual = fs::read(serve_dir.path().join("alice-in-wonderland.txt")).unwrap();
    assert_eq!(actual, b"original");
}
