//! avastream command-line client.
//!
//! Creates an avatar session through the HTTP API and chats over a loopback
//! data channel whose echo peer stands in for the avatar. One chat line per
//! stdin line; `/interrupt` and `/quit` are commands.

use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, EnvFilter};

use avastream_client::api::HttpSessionApi;
use avastream_client::transport::{LoopbackTransport, MediaKind, RemoteUser, TransportEvent};
use avastream_client::{config, AvatarSession};
use avastream_core::protocol::envelope::{encode, Body, ChatPayload, CommandPayload, ACK_SUCCESS};
use avastream_core::{split, MessageKind, Outcome, Reassembler, Result};

const PEER_UID: u32 = 1001;

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(e) = run().await {
        tracing::error!(code = e.code().as_str(), retriable = e.is_retriable(), error = %e, "avastream exited with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "avastream.yaml".to_owned());
    let cfg = config::load_from_file(&path)?;
    let max_frame = cfg.protocol.max_frame_bytes;

    let api = Arc::new(HttpSessionApi::new(&cfg.api)?);
    let transport = Arc::new(LoopbackTransport::new());
    tokio::spawn(echo_peer(Arc::clone(&transport), max_frame));

    let session = AvatarSession::new(cfg, api, transport.clone());
    session.start().await?;

    for media in [MediaKind::Audio, MediaKind::Video] {
        transport.inject(TransportEvent::UserPublished {
            user: RemoteUser { uid: PEER_UID },
            media,
        });
    }

    let mut inbound = session.subscribe_messages();
    tokio::spawn(async move {
        while let Ok(msg) = inbound.recv().await {
            let who = msg.speaker.as_deref().unwrap_or(msg.kind.as_str());
            println!("[{}] {}", who, msg.text);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(l)) => l,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed");
                break;
            }
        };
        let line = line.trim();
        let res = match line {
            "" => continue,
            "/quit" => break,
            "/interrupt" => session.interrupt().await,
            text => session.send_chat(text).await.map(|_| ()),
        };
        if let Err(e) = res {
            tracing::warn!(code = e.code().as_str(), retriable = e.is_retriable(), error = %e, "send failed");
        }
    }

    session.stop().await?;
    tracing::debug!(metrics = %session.metrics().render(), "final metrics");
    Ok(())
}

/// Stand-in avatar: reassembles outbound chat and echoes it back as the bot,
/// and acknowledges every command.
async fn echo_peer(transport: Arc<LoopbackTransport>, max_frame: usize) {
    let mut outbound = transport.take_outbound();
    let mut reassembler = Reassembler::default();
    let mut seq: u64 = 0;

    while let Some(frame) = outbound.recv().await {
        let Outcome::Complete(msg) = reassembler.ingest(&frame, Instant::now()) else {
            continue;
        };
        seq += 1;
        let reply = match msg.kind {
            MessageKind::Chat => Body::Chat(ChatPayload {
                text: format!("you said: {}", msg.text),
                from: "bot".to_owned(),
            }),
            MessageKind::Command => {
                let cmd = msg
                    .metadata
                    .as_ref()
                    .and_then(|m| m.get("cmd"))
                    .and_then(|c| c.as_str())
                    .unwrap_or_default()
                    .to_owned();
                Body::Command(CommandPayload {
                    cmd,
                    code: Some(ACK_SUCCESS),
                    msg: Some("success".to_owned()),
                    data: None,
                })
            }
            MessageKind::Event => continue,
        };

        let frames = match split(&format!("peer-{seq}"), &reply, max_frame) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(error = %e, "echo reply not sent");
                continue;
            }
        };
        for env in &frames {
            match encode(env) {
                Ok(bytes) => transport.deliver(PEER_UID, bytes),
                Err(e) => tracing::warn!(error = %e, "echo frame encode failed"),
            }
        }
    }
}
