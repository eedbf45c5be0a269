use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use uuid::Uuid;

use roomlink::config::{self, Config};
use roomlink::error::RoomError;
use roomlink::events::RoomEvent;
use roomlink::http::{ApiClient, RoomUrls};
use roomlink::logging;
use roomlink::peer::{LocalStream, PeerDescriptor, PeerSession};
use roomlink::room::RoomConnection;
use roomlink::transport::{run_socket, ws_socket};

#[derive(Parser, Debug)]
#[command(name = "roomlink", version)]
struct Cli {
    /// Path to config file
    #[arg(short = 'c', long = "config")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Join a room and log membership, messages, and events
    Monitor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    match cli.command {
        Commands::Monitor => run_monitor(cfg).await?,
    }

    Ok(())
}

/// Headless session without an RTC stack: signaling traffic is observed
/// and logged rather than negotiated.
struct PassiveSession {
    descriptor: PeerDescriptor,
    initiator: bool,
}

impl PeerSession for PassiveSession {
    fn descriptor(&self) -> &PeerDescriptor {
        &self.descriptor
    }

    fn is_initiator(&self) -> bool {
        self.initiator
    }

    fn start(&mut self) {
        logging::info_kv(
            "would start handshake",
            &[("peer_id", &self.descriptor.id.to_string())],
        );
    }

    fn end(&mut self) {}

    fn receive_signalling_message(&mut self, payload: &Value) {
        logging::debug_kv(
            "signalling",
            &[
                ("peer_id", &self.descriptor.id.to_string()),
                ("payload", &payload.to_string()),
            ],
        );
    }

    fn send_signalling_message(&mut self, kind: &str, payload: Value) -> Result<(), RoomError> {
        logging::debug_kv(
            "outbound signalling skipped",
            &[("kind", kind), ("payload", &payload.to_string())],
        );
        Ok(())
    }

    fn add_local_stream(&mut self, _stream: &LocalStream) {}
}

async fn run_monitor(cfg: Config) -> Result<()> {
    let log_path = cfg
        .log_file
        .clone()
        .unwrap_or_else(config::default_log_file_path);
    logging::init_log_file(&log_path)?;
    logging::info_kv("monitor start", &[("room", &cfg.room)]);

    let api = ApiClient::new(cfg.auth_token.as_deref())?;
    let urls = RoomUrls::for_room(&cfg.server_url, &cfg.room);
    let socket_url = urls.socket.clone();
    let (socket, backend) = ws_socket();

    let room = Arc::new(Mutex::new(RoomConnection::new(
        api,
        urls,
        Box::new(socket),
        Box::new(|descriptor: &PeerDescriptor, is_initiator| {
            Box::new(PassiveSession {
                descriptor: descriptor.clone(),
                initiator: is_initiator,
            }) as Box<dyn PeerSession>
        }),
    )));

    let mut events = room.lock().await.subscribe();

    let mut join_data = json!({
        "name": cfg.display_name,
        "session": Uuid::new_v4().to_string(),
    });
    if let Some(uid) = cfg.uid {
        join_data["uid"] = json!(uid);
    }
    let ack = room
        .lock()
        .await
        .initial_join(join_data)
        .await
        .context("initial join")?;
    logging::info_kv("joined", &[("ack", &ack.to_string())]);

    room.lock().await.connect();

    tokio::select! {
        res = run_socket(backend, &socket_url, room.clone()) => {
            if let Err(err) = res {
                logging::error(format!("socket driver failed: {err:?}"));
            }
        }
        _ = log_events(&mut events) => {}
        _ = tokio::signal::ctrl_c() => {
            logging::info("interrupted");
        }
    }

    Ok(())
}

async fn log_events(events: &mut tokio::sync::broadcast::Receiver<RoomEvent>) {
    use tokio::sync::broadcast::error::RecvError;

    loop {
        match events.recv().await {
            Ok(event) => log_event(event),
            Err(RecvError::Lagged(missed)) => {
                logging::error(format!("event log lagged, missed {missed}"));
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn log_event(event: RoomEvent) {
    match event {
        RoomEvent::Connecting => logging::info("connecting"),
        RoomEvent::Connected => logging::info("connected"),
        RoomEvent::Join { payload, .. } => {
            logging::info_kv("join", &[("payload", &payload.to_string())]);
        }
        RoomEvent::PeerAnnounce { peer, .. } => {
            logging::info_kv("peer announce", &[("uid", &peer.uid.to_string())]);
        }
        RoomEvent::PeerAdded { peer } => {
            logging::info_kv(
                "peer",
                &[
                    ("peer_id", &peer.id.to_string()),
                    ("uid", &peer.uid.to_string()),
                ],
            );
        }
        RoomEvent::PeerLeave { peer, .. } => {
            logging::info_kv("peer leave", &[("peer_id", &peer.id.to_string())]);
        }
        RoomEvent::PeerRemoved { peer_id, uid } => {
            logging::info_kv(
                "peer removed",
                &[("peer_id", &peer_id.to_string()), ("uid", &uid.to_string())],
            );
        }
        RoomEvent::Message { envelope } => {
            logging::debug_kv("message", &[("t", envelope.kind.code())]);
        }
        RoomEvent::Custom { name, data, .. } => {
            logging::info_kv("event", &[("name", &name), ("data", &data.to_string())]);
        }
        RoomEvent::LocalStreamConnected => logging::info("local stream connected"),
        RoomEvent::FileTransferRequested { peer, data } => {
            logging::info_kv(
                "transfer requested",
                &[("uid", &peer.uid.to_string()), ("data", &data.to_string())],
            );
        }
        RoomEvent::FileTransfer(transfer) => {
            logging::info_kv("transfer", &[("state", &format!("{transfer:?}"))]);
        }
    }
}
