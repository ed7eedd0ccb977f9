use command::{Identity, IoMode};
use proptest::prelude::*;
use protocol::{LaunchRequest, Message};

fn io_mode() -> impl Strategy<Value = IoMode> {
    prop_oneof![
        Just(IoMode::Default),
        Just(IoMode::Input),
        Just(IoMode::Output),
        Just(IoMode::Io),
        Just(IoMode::Sink),
        Just(IoMode::Pty),
        Just(IoMode::System),
    ]
}

fn identity() -> impl Strategy<Value = Identity> {
    prop_oneof![
        Just(Identity::Current),
        Just(Identity::Administrator),
        any::<u32>().prop_map(Identity::Uid),
        "[a-z][a-z0-9]{0,15}".prop_map(Identity::Username),
    ]
}

fn launch_request() -> impl Strategy<Value = LaunchRequest> {
    (
        prop::collection::vec("[ -~]{1,32}", 1..6),
        prop::option::of("[ -~]{1,64}"),
        prop::collection::vec(("[A-Z_]{1,12}", "[ -~]{0,32}"), 0..4),
        io_mode(),
        identity(),
        any::<bool>(),
        any::<u16>(),
        any::<u16>(),
        prop::option::of("[a-z0-9-]{1,24}"),
    )
        .prop_map(
            |(argv, cwd, env, io_mode, identity, redirect, rows, cols, term)| LaunchRequest {
                argv,
                cwd,
                env,
                io_mode,
                identity,
                redirect_err_to_out: redirect,
                pty_rows: rows,
                pty_cols: cols,
                term,
            },
        )
}

fn message() -> impl Strategy<Value = Message> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..64).prop_map(|cookie| Message::Hello { cookie }),
        Just(Message::HelloOk),
        "[ -~]{0,64}".prop_map(|reason| Message::HelloReject { reason }),
        launch_request().prop_map(Message::Launch),
        any::<u32>().prop_map(|pid| Message::Launched { pid }),
        ("[ -~]{0,64}", any::<i32>())
            .prop_map(|(reason, errno)| Message::Failed { reason, errno }),
        (any::<u32>(), prop::collection::vec(any::<u8>(), 0..256))
            .prop_map(|(pid, data)| Message::Stdin { pid, data }),
        (any::<u32>(), prop::collection::vec(any::<u8>(), 0..256))
            .prop_map(|(pid, data)| Message::Stdout { pid, data }),
        (any::<u32>(), prop::collection::vec(any::<u8>(), 0..256))
            .prop_map(|(pid, data)| Message::Stderr { pid, data }),
        any::<u32>().prop_map(|pid| Message::StdinClose { pid }),
        (any::<u32>(), any::<i32>()).prop_map(|(pid, signal)| Message::Kill { pid, signal }),
        (any::<u32>(), any::<i32>()).prop_map(|(pid, status)| Message::Exit { pid, status }),
        Just(Message::Ping),
        Just(Message::Pong),
    ]
}

proptest! {
    #[test]
    fn encode_decode_is_identity(msg in message()) {
        let mut buf = Vec::new();
        msg.clone().write_to(&mut buf).unwrap();
        let decoded = Message::read_from(&mut buf.as_slice()).unwrap();
        prop_assert_eq!(decoded, msg);
    }

    #[test]
    fn split_reads_reassemble(msg in message(), chunk in 1usize..7) {
        struct ChunkReader {
            data: Vec<u8>,
            pos: usize,
            chunk: usize,
        }
        impl std::io::Read for ChunkReader {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if self.pos >= self.data.len() {
                    return Ok(0);
                }
                let end = (self.pos + self.chunk).min(self.data.len());
                let len = (end - self.pos).min(buf.len());
                buf[..len].copy_from_slice(&self.data[self.pos..self.pos + len]);
                self.pos += len;
                Ok(len)
            }
        }

        let mut buf = Vec::new();
        msg.clone().write_to(&mut buf).unwrap();
        let mut reader = ChunkReader { data: buf, pos: 0, chunk };
        let decoded = Message::read_from(&mut reader).unwrap();
        prop_assert_eq!(decoded, msg);
    }

    #[test]
    fn truncated_frames_never_panic(msg in message(), cut in 0usize..16) {
        let mut buf = Vec::new();
        msg.write_to(&mut buf).unwrap();
        let keep = buf.len().saturating_sub(cut + 1);
        buf.truncate(keep);
        let _ = Message::read_from(&mut buf.as_slice());
    }
}
