// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! JSON-over-TCP listener for vtr-server.
//!
//! Accepts control-surface connections speaking the
//! `ClientEnvelope`/`ClientResponse` line protocol defined in
//! `vtr-protocol`. Feedback queries are answered from the cached state;
//! deck commands round-trip through the deck task.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{error, info};

use vtr_core::{DeckRequest, DeckState};
use vtr_protocol::auth::{SimpleTokenValidator, TokenValidator};
use vtr_protocol::codec::parse_envelope;
use vtr_protocol::mapping::surface_command_to_deck;
use vtr_protocol::{ClientResponse, SurfaceCommand};

use crate::deck_handle::DeckHandle;

/// Run the JSON TCP listener, accepting control-surface connections
/// until shutdown is signalled.
pub async fn run_listener(
    addr: SocketAddr,
    handle: DeckHandle,
    auth_tokens: HashSet<String>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    let validator = Arc::new(SimpleTokenValidator::new(auth_tokens));

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, peer) = accepted?;
                info!("Client connected: {}", peer);

                let tx = handle.deck_tx.clone();
                let srx = handle.state_rx.clone();
                let validator = Arc::clone(&validator);
                tokio::spawn(async move {
                    if let Err(e) = handle_client(socket, peer, tx, validator, srx).await {
                        error!("Client {} error: {:?}", peer, e);
                    }
                });
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    Ok(())
}

async fn handle_client(
    socket: TcpStream,
    addr: SocketAddr,
    tx: mpsc::Sender<DeckRequest>,
    validator: Arc<SimpleTokenValidator>,
    state_rx: watch::Receiver<DeckState>,
) -> std::io::Result<()> {
    let (reader, mut writer) = socket.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            info!("Client {} disconnected", addr);
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let envelope = match parse_envelope(trimmed) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!("Invalid JSON from {}: {} / {:?}", addr, trimmed, e);
                write_response(
                    &mut writer,
                    &ClientResponse::failure(format!("Invalid JSON: {}", e)),
                )
                .await?;
                continue;
            }
        };

        if let Err(err) = validator.as_ref().validate(&envelope.token) {
            write_response(&mut writer, &ClientResponse::failure(err)).await?;
            continue;
        }

        // Feedback queries are served from the cached state; they must
        // never wait on the deck.
        let response = match envelope.cmd {
            SurfaceCommand::GetState => {
                ClientResponse::with_state(state_rx.borrow().snapshot())
            }
            SurfaceCommand::QueryFlag { flag } => {
                ClientResponse::with_flag(state_rx.borrow().flag(&flag))
            }
            cmd => {
                let Some(deck_cmd) = surface_command_to_deck(cmd) else {
                    // Unreachable: the two query commands are handled above.
                    continue;
                };
                dispatch_deck_command(deck_cmd, &tx, &state_rx).await
            }
        };
        write_response(&mut writer, &response).await?;
    }

    Ok(())
}

async fn dispatch_deck_command(
    cmd: vtr_core::DeckCommand,
    tx: &mpsc::Sender<DeckRequest>,
    state_rx: &watch::Receiver<DeckState>,
) -> ClientResponse {
    let (resp_tx, resp_rx) = oneshot::channel();
    let req = DeckRequest {
        cmd,
        respond_to: resp_tx,
    };

    if let Err(e) = tx.send(req).await {
        error!("Failed to send request to deck task: {:?}", e);
        return ClientResponse::failure("Internal error: deck task not available");
    }

    match resp_rx.await {
        Ok(Ok(())) => ClientResponse::with_state(state_rx.borrow().snapshot()),
        Ok(Err(err)) => ClientResponse::failure(err.to_string()),
        Err(e) => {
            error!("Deck response oneshot recv error: {:?}", e);
            ClientResponse::failure("Internal error waiting for deck response")
        }
    }
}

async fn write_response<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    response: &ClientResponse,
) -> std::io::Result<()> {
    let resp_line = serde_json::to_string(response)? + "\n";
    writer.write_all(resp_line.as_bytes()).await?;
    writer.flush().await
}
