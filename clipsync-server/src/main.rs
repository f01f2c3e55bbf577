use std::{net::IpAddr, path::PathBuf};

use clap::Parser;
use clipsync_core::ActivityState;
use clipsync_server::{
    CONSOLE_HELP, ClipSyncService, ConsoleCommand, ServerConfig, UiEvent, pending_store_path,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast,
};
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "clipsync", about = "Receive text from the LAN straight into the clipboard")]
struct ServerArgs {
    /// Address to bind; the Wi-Fi/LAN address is discovered when omitted.
    #[arg(long)]
    host: Option<IpAddr>,
    #[arg(long, default_value_t = clipsync_core::DEFAULT_PORT)]
    port: u16,
    #[arg(long, default_value_t = clipsync_core::DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: usize,
    #[arg(long)]
    pending_path: Option<PathBuf>,
    #[arg(long, default_value_t = clipsync_core::DEFAULT_PENDING_CAPACITY)]
    pending_capacity: usize,
    /// Landing page template containing `const targetUrl = '';`.
    #[arg(long)]
    landing_page: Option<PathBuf>,
    /// Start as if the app were already backgrounded.
    #[arg(long)]
    background: bool,
}

impl ServerArgs {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            port: self.port,
            max_body_bytes: self.max_body_bytes,
            pending_path: self.pending_path.unwrap_or_else(pending_store_path),
            pending_capacity: self.pending_capacity,
            landing_page: self.landing_page,
            initial_activity: if self.background {
                ActivityState::Background
            } else {
                ActivityState::Active
            },
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,clipsync_server=debug".into()),
        )
        .init();

    let config = ServerArgs::parse().into_config();
    info!(
        "clipsync starting (port {}, pending store {})",
        config.port,
        config.pending_path.display()
    );

    let service = ClipSyncService::new(config);
    tokio::spawn(log_ui_events(service.subscribe_ui()));

    // A failed bind leaves the app running so `restart` can try again.
    match service.start().await {
        Ok(state) => info!("send page at http://{}:{}/", state.host, state.port),
        Err(err) => error!("server failed to start: {}", err),
    }
    println!("{CONSOLE_HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received, shutting down");
                break;
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        // stdin closed; keep serving until ctrl-c
                        let _ = tokio::signal::ctrl_c().await;
                        break;
                    }
                    Err(err) => {
                        warn!("failed to read console input: {}", err);
                        continue;
                    }
                };
                match ConsoleCommand::parse(&line) {
                    Ok(Some(ConsoleCommand::Quit)) => break,
                    Ok(Some(command)) => handle_command(&service, command).await,
                    Ok(None) => {}
                    Err(err) => println!("{err}; {CONSOLE_HELP}"),
                }
            }
        }
    }

    service.shutdown().await;
}

async fn handle_command(service: &ClipSyncService, command: ConsoleCommand) {
    match command {
        ConsoleCommand::Active => {
            let drained = service.set_activity(ActivityState::Active).await;
            println!("active ({drained} pending delivered)");
        }
        ConsoleCommand::Background => {
            service.set_activity(ActivityState::Background).await;
            println!("background");
        }
        ConsoleCommand::Start => match service.start().await {
            Ok(state) => println!("listening on {}", state.send_url()),
            Err(err) => println!("start failed: {err}"),
        },
        ConsoleCommand::Stop => {
            service.stop().await;
            println!("stopped");
        }
        ConsoleCommand::Restart => match service.restart().await {
            Ok(Ok(state)) => println!("restarted on {}", state.send_url()),
            Ok(Err(err)) => println!("restart failed: {err}"),
            Err(err) => error!("restart task panicked: {}", err),
        },
        ConsoleCommand::Status => {
            let state = service.state();
            println!(
                "running={} url={} activity={} pending={}",
                state.running,
                state.send_url(),
                service.activity(),
                service.pending_len()
            );
        }
        ConsoleCommand::History => {
            for (index, entry) in service.history().iter().enumerate() {
                println!("{:>3}: {}", index + 1, entry);
            }
        }
        ConsoleCommand::Clear => {
            service.clear_history();
            println!("history cleared");
        }
        ConsoleCommand::Quit => {}
    }
}

async fn log_ui_events(mut events: broadcast::Receiver<UiEvent>) {
    loop {
        match events.recv().await {
            Ok(UiEvent::Toast(text)) => info!("{}", text),
            Ok(event) => debug!(?event, "ui event"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "ui event log fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
