// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use afxdp_ipc::path::{create_socket_dir, grant, socket_path};
use afxdp_ipc::{FdChannel, FdListener, MAX_MESSAGE, SeqpacketChannel, SeqpacketListener};
use pretty_assertions::assert_eq;
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::fd::{AsFd, AsRawFd};

fn scratch_file(contents: &[u8]) -> std::fs::File {
    let path = std::env::temp_dir().join(format!("afxdp-ipc-{}", uuid::Uuid::new_v4()));
    let mut file = std::fs::OpenOptions::new()
        .create_new(true)
        .read(true)
        .write(true)
        .open(&path)
        .unwrap();
    std::fs::remove_file(&path).unwrap();
    file.write_all(contents).unwrap();
    file
}

#[tokio::test]
async fn descriptor_travels_with_message() {
    let (mut a, mut b) = SeqpacketChannel::pair().unwrap();
    let file = scratch_file(b"xsk map");
    a.send(b"/fd_ack", Some(file.as_fd())).await.unwrap();

    let got = b.recv().await.unwrap();
    assert_eq!(got.payload, b"/fd_ack");
    assert!(!got.truncated);
    let fd = got.fd.unwrap();
    assert_ne!(fd.as_raw_fd(), file.as_raw_fd());

    // the received descriptor refers to the same open file
    let mut received = std::fs::File::from(fd);
    received.seek(SeekFrom::Start(0)).unwrap();
    let mut contents = String::new();
    received.read_to_string(&mut contents).unwrap();
    assert_eq!(contents, "xsk map");
}

#[tokio::test]
async fn messages_keep_boundaries_and_order() {
    let (mut a, mut b) = SeqpacketChannel::pair().unwrap();
    a.send(b"/version", None).await.unwrap();
    a.send(b"/fin", None).await.unwrap();
    assert_eq!(b.recv().await.unwrap().payload, b"/version");
    let fin = b.recv().await.unwrap();
    assert_eq!(fin.payload, b"/fin");
    assert!(fin.fd.is_none());
}

#[tokio::test]
async fn long_messages_are_truncated() {
    let (mut a, mut b) = SeqpacketChannel::pair().unwrap();
    a.send(&[b'a'; MAX_MESSAGE + 1], None).await.unwrap();
    let got = b.recv().await.unwrap();
    assert!(got.truncated);
    assert_eq!(got.payload.len(), MAX_MESSAGE);
}

#[tokio::test]
async fn closed_peer_is_eof() {
    let (a, mut b) = SeqpacketChannel::pair().unwrap();
    drop(a);
    let err = b.recv().await.unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
}

#[tokio::test]
async fn empty_records_are_messages() {
    let (mut a, mut b) = SeqpacketChannel::pair().unwrap();
    a.send(b"", None).await.unwrap();
    a.send(b"/fin", None).await.unwrap();
    let empty = b.recv().await.unwrap();
    assert!(empty.payload.is_empty());
    assert!(empty.fd.is_none());
    assert!(!empty.truncated);
    assert_eq!(b.recv().await.unwrap().payload, b"/fin");

    drop(a);
    let err = b.recv().await.unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
}

#[tokio::test]
async fn listener_accepts_and_cleans_up() {
    let base = std::env::temp_dir().join(format!("afxdp-ipc-{}", uuid::Uuid::new_v4()));
    let path = socket_path(&base, "afxdp/test");
    create_socket_dir(&path, 0).unwrap();
    let mut listener = SeqpacketListener::bind(&path).unwrap();
    grant(&path, 0).unwrap();
    assert!(path.exists());

    let mut client = SeqpacketChannel::connect(&path).unwrap();
    let mut server = listener.accept().await.unwrap();
    client.send(b"/connect, pod", None).await.unwrap();
    assert_eq!(server.recv().await.unwrap().payload, b"/connect, pod");
    server.send(b"/host_ok", None).await.unwrap();
    assert_eq!(client.recv().await.unwrap().payload, b"/host_ok");

    drop(listener);
    assert!(!path.exists());
    std::fs::remove_dir_all(base).unwrap();
}
