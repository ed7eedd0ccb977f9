use protocol::Message;

fn encoded(msg: Message) -> Vec<u8> {
    let mut buf = Vec::new();
    msg.write_to(&mut buf).unwrap();
    buf
}

#[test]
fn hello_layout() {
    assert_eq!(
        encoded(Message::Hello {
            cookie: vec![0xaa, 0xbb, 0xcc, 0xdd],
        }),
        [0, 0, 0, 8, 0, 0, 0, 0, 4, 0xaa, 0xbb, 0xcc, 0xdd],
    );
}

#[test]
fn hello_ok_layout() {
    assert_eq!(encoded(Message::HelloOk), [0, 0, 0, 0, 1]);
}

#[test]
fn launched_layout() {
    assert_eq!(
        encoded(Message::Launched { pid: 0x01020304 }),
        [0, 0, 0, 4, 4, 1, 2, 3, 4],
    );
}

#[test]
fn stdout_carries_leading_child_pid() {
    assert_eq!(
        encoded(Message::Stdout {
            pid: 2,
            data: b"hi".to_vec(),
        }),
        [0, 0, 0, 10, 7, 0, 0, 0, 2, 0, 0, 0, 2, b'h', b'i'],
    );
}

#[test]
fn exit_layout_encodes_signal_as_negative() {
    assert_eq!(
        encoded(Message::Exit {
            pid: 1,
            status: -15,
        }),
        [0, 0, 0, 8, 11, 0, 0, 0, 1, 0xff, 0xff, 0xff, 0xf1],
    );
}

#[test]
fn kill_layout() {
    assert_eq!(
        encoded(Message::Kill { pid: 7, signal: 9 }),
        [0, 0, 0, 8, 10, 0, 0, 0, 7, 0, 0, 0, 9],
    );
}

#[test]
fn ping_pong_layout() {
    assert_eq!(encoded(Message::Ping), [0, 0, 0, 0, 12]);
    assert_eq!(encoded(Message::Pong), [0, 0, 0, 0, 13]);
}
