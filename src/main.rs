//! statewire command-line client.
//!
//! Connects to a state server, watches the configured paths, and prints
//! every update, command reply, and lifecycle transition to stdout as one
//! JSON document per line.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::EnvFilter;

use statewire::config::CommandSpec;
use statewire::protocol::decode_tree;
use statewire::{ClientConfig, Connection, LifecycleEvent, WsConnector};

/// One line of output.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum OutputLine<'a> {
    Lifecycle {
        at: DateTime<Utc>,
        event: LifecycleEvent,
    },
    Update {
        at: DateTime<Utc>,
        path: &'a str,
        state: Option<&'a Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        entries: Option<Vec<String>>,
    },
    Reply {
        at: DateTime<Utc>,
        path: &'a str,
        command: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl OutputLine<'_> {
    fn print(&self) {
        match serde_json::to_string(self) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "failed to render output line"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let config = ClientConfig::from_env()?;
    tracing::info!(endpoint = %config.endpoint, paths = ?config.paths, "starting statewire");

    let conn = Connection::with_lifecycle_capacity(
        config.endpoint.clone(),
        WsConnector::new(),
        config.lifecycle_capacity,
    );
    let mut lifecycle = conn.lifecycle();

    // Route every watched path into one channel
    let (update_tx, mut update_rx) = mpsc::unbounded_channel::<(String, Option<Value>)>();
    let mut listeners = Vec::with_capacity(config.paths.len());
    for path in &config.paths {
        let sub = conn.subscription(path);
        let tx = update_tx.clone();
        let owned = path.clone();
        let id = sub.on_update(move |state| {
            let _ = tx.send((owned.clone(), state.cloned()));
        });
        listeners.push((sub, id));
    }
    drop(update_tx);

    conn.connect();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("interrupted, shutting down");
                break;
            }
            event = lifecycle.recv() => {
                match event {
                    Ok(event) => {
                        OutputLine::Lifecycle { at: Utc::now(), event }.print();
                        match event {
                            LifecycleEvent::Open => {
                                if let Some(spec) = &config.command {
                                    tokio::spawn(run_command(conn.clone(), spec.clone()));
                                }
                            }
                            LifecycleEvent::Closed | LifecycleEvent::Error => {
                                if config.reconnect_delay.is_zero() {
                                    break;
                                }
                                let conn = conn.clone();
                                let delay = config.reconnect_delay;
                                tokio::spawn(async move {
                                    tracing::info!(?delay, "reconnecting");
                                    tokio::time::sleep(delay).await;
                                    conn.connect();
                                });
                            }
                            LifecycleEvent::Connecting => {}
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "lifecycle receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            Some((path, state)) = update_rx.recv() => {
                let entries = state
                    .as_ref()
                    .and_then(|s| decode_tree(s).ok())
                    .map(|entries| entries.iter().map(ToString::to_string).collect());
                OutputLine::Update {
                    at: Utc::now(),
                    path: &path,
                    state: state.as_ref(),
                    entries,
                }
                .print();
            }
        }
    }

    for (sub, id) in listeners {
        sub.remove_listener(id);
    }
    conn.disconnect();

    Ok(())
}

/// Invokes the configured command and prints its reply.
async fn run_command(conn: Connection, spec: CommandSpec) {
    let CommandSpec {
        path,
        command,
        args,
        kwargs,
    } = spec;
    let (result, error) = match conn.call(&path, &command, args, kwargs).await {
        Ok(value) => (Some(value), None),
        Err(e) => {
            tracing::warn!(%path, %command, error = %e, "command failed");
            (None, Some(e.to_string()))
        }
    };
    OutputLine::Reply {
        at: Utc::now(),
        path: &path,
        command: &command,
        result,
        error,
    }
    .print();
}
