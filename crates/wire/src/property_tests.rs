// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Framing holds for arbitrary payloads and message sequences.

use super::*;
use proptest::prelude::*;

fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(fut)
}

proptest! {
    #[test]
    fn frames_survive_concatenation(payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..256), 1..8)) {
        let read_back = block_on(async {
            let mut buffer = Vec::new();
            for p in &payloads {
                write_message(&mut buffer, p).await.unwrap();
            }
            let mut cursor = std::io::Cursor::new(buffer);
            let mut out = Vec::new();
            for _ in 0..payloads.len() {
                out.push(read_message(&mut cursor).await.unwrap());
            }
            assert!(matches!(read_message(&mut cursor).await, Err(ProtocolError::ConnectionClosed)));
            out
        });
        prop_assert_eq!(read_back, payloads);
    }

    #[test]
    fn hello_versions_decode_unchanged(version in "[ -~]{0,40}") {
        let req = Request::Hello { version: version.clone() };
        let bytes = encode(&req).unwrap();
        prop_assert_eq!(decode::<Request>(&bytes).unwrap(), req);
    }
}
