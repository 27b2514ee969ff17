// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

#[tokio::test]
async fn request_round_trips_through_the_inbox() {
    let (bridge, mut inbox) = command_bridge(CancellationToken::new());
    let agent = tokio::spawn(async move {
        match inbox.recv().await {
            BridgeRequest::RunCommands { args, respond } => {
                let _ = respond.send(Ok(ExecResponse {
                    code: 0,
                    stdout: args.commands,
                    stderr: String::new(),
                }));
            }
            other => panic!("unexpected {other:?}"),
        }
    });

    let resp = bridge.run_commands(CommandArgs::new("hostname")).await.unwrap();
    assert_eq!(resp.stdout, "hostname");
    agent.await.unwrap();
}

#[tokio::test]
async fn dying_unblocks_unconsumed_request() {
    let cancel = CancellationToken::new();
    let (bridge, _inbox) = command_bridge(cancel.clone());
    let call = tokio::spawn(async move { bridge.run_commands(CommandArgs::new("true")).await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(2), call).await.unwrap().unwrap();
    assert_eq!(result, Err(CommandError::Dying));
}

#[tokio::test]
async fn dying_unblocks_request_awaiting_reply() {
    let cancel = CancellationToken::new();
    let (bridge, mut inbox) = command_bridge(cancel.clone());
    let call = tokio::spawn(async move { bridge.resolve(ResolvedMode::RetryHooks).await });

    // Consume the request but never answer
    let held = inbox.recv().await;
    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(2), call).await.unwrap().unwrap();
    assert_eq!(result, Err(CommandError::Dying));
    drop(held);
}

#[tokio::test]
async fn dropped_responder_reports_dying() {
    let (bridge, mut inbox) = command_bridge(CancellationToken::new());
    tokio::spawn(async move {
        drop(inbox.recv().await);
    });
    let result = bridge.run_commands(CommandArgs::new("true")).await;
    assert_eq!(result, Err(CommandError::Dying));
}

#[tokio::test]
async fn call_after_cancel_fails_fast() {
    let cancel = CancellationToken::new();
    let (bridge, _inbox) = command_bridge(cancel.clone());
    cancel.cancel();
    assert_eq!(bridge.run_commands(CommandArgs::new("true")).await, Err(CommandError::Dying));
}
