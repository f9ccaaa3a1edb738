use chrono::Utc;
use log::{error, info};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use telecore::types::call::ConsultationId;
use telecore::types::user::{SessionIdentity, UserRole};
use telemed_rust::calls::media::mock::MockMediaEngine;
use telemed_rust::client::Client;
use telemed_rust::config::ClientConfig;
use telemed_rust::identity::{self, SessionContext};
use telemed_rust::store::FileCredentialStore;
use telemed_rust::transport::websocket::WebSocketTransportFactory;

// Interactive consultation-session demo. Joins the given consultation
// room and drives the call protocol from stdin.
//
// Usage:
//   cargo run -- --consultation 123 --role patient --relay ws://localhost:5000/ws
//   cargo run -- -c 123 -r doctor --user-id doc-1
//
// Commands: call, accept, decline, end, chat <text>, quit

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let consultation = parse_arg(&args, "--consultation", "-c");
    let role = parse_arg(&args, "--role", "-r");
    let relay_url = parse_arg(&args, "--relay", "-u");
    let store_path = parse_arg(&args, "--store", "-s");
    let user_id = parse_arg(&args, "--user-id", "-i");

    let (Some(consultation), Some(role)) = (consultation, role) else {
        eprintln!("usage: --consultation <id> --role <doctor|patient> [--relay <ws-url>] [--store <path>] [--user-id <id>]");
        std::process::exit(2);
    };
    let role: UserRole = match role.parse() {
        Ok(role) => role,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                Utc::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime");

    rt.block_on(async {
        let store = FileCredentialStore::new(
            store_path.unwrap_or_else(|| "credentials.json".to_string()),
        );
        let identity = match identity::resolve_with_preference(&store, role) {
            Ok(Some(identity)) => identity,
            Ok(None) => match user_id {
                Some(id) => SessionIdentity::new(id, role),
                None => {
                    error!("no stored credential and no --user-id given");
                    std::process::exit(2);
                }
            },
            Err(e) => {
                error!("identity resolution failed: {e}");
                std::process::exit(2);
            }
        };
        info!("acting as {} ({})", identity.id, identity.role);

        let config = ClientConfig {
            relay_url: relay_url.unwrap_or_else(|| "ws://localhost:5000/ws".to_string()),
            ..ClientConfig::default()
        };
        let context = SessionContext::new(identity, ConsultationId::new(consultation));
        let transport = Arc::new(WebSocketTransportFactory::new(config.relay_url.clone()));
        let engine = Arc::new(MockMediaEngine::new());
        let client = Client::new(config, context, transport, engine);

        if let Err(e) = client.connect().await {
            error!("failed to connect to the relay: {e}");
            std::process::exit(1);
        }

        spawn_event_printer(&client);

        let runner = {
            let client = client.clone();
            tokio::spawn(async move {
                if let Err(e) = client.run().await {
                    error!("session ended with error: {e}");
                }
            })
        };

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Ok(Some(line)) = line else { break };
                    let line = line.trim();
                    let result = match line.split_once(' ') {
                        Some(("chat", text)) => client.send_chat(text).await,
                        _ => match line {
                            "call" => client.calls().start_call().await.map(|_| ()).map_err(Into::into),
                            "accept" => client.calls().accept_call().await.map_err(Into::into),
                            "decline" => client.calls().decline_call().await.map_err(Into::into),
                            "end" => client.calls().end_call().await.map_err(Into::into),
                            "quit" => break,
                            "" => continue,
                            other => {
                                eprintln!("unknown command: {other}");
                                continue;
                            }
                        },
                    };
                    if let Err(e) = result {
                        error!("{e}");
                    }
                }
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        client.disconnect().await;
        let _ = runner.await;
    });
}

fn spawn_event_printer(client: &Arc<Client>) {
    let bus = client.event_bus();
    let mut incoming = bus.incoming_call.subscribe();
    let mut accepted = bus.call_accepted.subscribe();
    let mut declined = bus.call_declined.subscribe();
    let mut connected = bus.call_connected.subscribe();
    let mut ended = bus.call_ended.subscribe();
    let mut failed = bus.call_failed.subscribe();
    let mut remote = bus.remote_stream.subscribe();
    let mut chat = bus.chat_message.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                Ok(ev) = incoming.recv() => info!("incoming call {}: accept/decline?", ev.call_id),
                Ok(ev) = accepted.recv() => info!("call {} accepted, negotiating", ev.call_id),
                Ok(ev) = declined.recv() => info!("call {} declined", ev.call_id),
                Ok(ev) = connected.recv() => info!("call {} connected", ev.call_id),
                Ok(ev) = ended.recv() => info!("call {} ended: {:?}", ev.call_id, ev.reason),
                Ok(ev) = failed.recv() => info!("call {} failed: {}", ev.call_id, ev.error),
                Ok(ev) = remote.recv() => info!("remote stream attached: {}", ev.stream_id),
                Ok(ev) = chat.recv() => info!("[{}] {}", ev.sender_id, ev.message),
                else => break,
            }
        }
    });
}

fn parse_arg(args: &[String], long: &str, short: &str) -> Option<String> {
    args.iter()
        .position(|arg| arg == long || arg == short)
        .and_then(|idx| args.get(idx + 1))
        .cloned()
}
