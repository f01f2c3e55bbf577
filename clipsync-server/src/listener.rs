use std::{
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};

use axum::Router;
use clipsync_core::send_url;
use hyper::server::conn::http1;
use hyper_util::{
    rt::{TokioIo, TokioTimer},
    service::TowerToHyperService,
};
use serde::Serialize;
use thiserror::Error;
use tokio::{
    net::{TcpListener, TcpSocket, TcpStream},
    sync::{Mutex, broadcast, watch},
    task::{JoinHandle, JoinSet},
    time::{Duration, sleep, timeout},
};
use tracing::{debug, info, warn};

use crate::{
    config::ListenerSettings,
    dispatch::{AppState, DispatchContext, build_router},
    network::{InterfaceSource, resolve_bind_host},
};

const LISTEN_BACKLOG: u32 = 256;
const TRANSITION_CAPACITY: usize = 16;
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Connectivity status shown to the user.
///
/// `running` is true exactly while a bound socket is held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerState {
    pub host: String,
    pub port: u16,
    pub running: bool,
}

impl ServerState {
    fn stopped(host: String, port: u16) -> Self {
        Self {
            host,
            port,
            running: false,
        }
    }

    pub fn send_url(&self) -> String {
        send_url(&self.host, self.port)
    }
}

#[derive(Debug, Error)]
pub enum BindError {
    #[error("address {addr} is already in use")]
    AddressInUse { addr: SocketAddr },
    #[error("permission denied binding {addr}")]
    PermissionDenied { addr: SocketAddr },
    #[error("address {addr} is not available on this host")]
    AddressUnavailable { addr: SocketAddr },
    #[error("failed to bind {addr}: {source}")]
    Io {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

impl BindError {
    fn from_io(addr: SocketAddr, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::AddrInUse => BindError::AddressInUse { addr },
            io::ErrorKind::PermissionDenied => BindError::PermissionDenied { addr },
            io::ErrorKind::AddrNotAvailable => BindError::AddressUnavailable { addr },
            _ => BindError::Io { addr, source },
        }
    }
}

struct RunningServer {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    /// Accept loop; owns every connection task, so aborting it drops them all.
    task: JoinHandle<()>,
}

#[derive(Default)]
struct ListenerSlot {
    running: Option<RunningServer>,
    /// Host preference and bound port of the last successful start, reused by restart.
    last_bind: Option<(Option<IpAddr>, u16)>,
}

struct ListenerInner {
    settings: ListenerSettings,
    context: DispatchContext,
    interfaces: Arc<dyn InterfaceSource>,
    slot: Mutex<ListenerSlot>,
    state_tx: watch::Sender<ServerState>,
    transitions_tx: broadcast::Sender<ServerState>,
}

/// Owns the listening socket and the accept loop.
///
/// `start`, `stop` and `restart` are serialized on one async lock, so a restart
/// issued while a start is in flight waits for it to settle.
#[derive(Clone)]
pub struct ConnectionListener {
    inner: Arc<ListenerInner>,
}

impl ConnectionListener {
    pub fn new(
        settings: ListenerSettings,
        context: DispatchContext,
        interfaces: Arc<dyn InterfaceSource>,
    ) -> Self {
        let initial = ServerState::stopped(Ipv4Addr::UNSPECIFIED.to_string(), settings.port);
        let (state_tx, _) = watch::channel(initial);
        let (transitions_tx, _) = broadcast::channel(TRANSITION_CAPACITY);
        Self {
            inner: Arc::new(ListenerInner {
                settings,
                context,
                interfaces,
                slot: Mutex::new(ListenerSlot::default()),
                state_tx,
                transitions_tx,
            }),
        }
    }

    pub fn state(&self) -> ServerState {
        self.inner.state_tx.borrow().clone()
    }

    /// Latest state only; intermediate values may be skipped.
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.inner.state_tx.subscribe()
    }

    /// Every change of `running`, in order.
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<ServerState> {
        self.inner.transitions_tx.subscribe()
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.inner
            .slot
            .lock()
            .await
            .running
            .as_ref()
            .map(|running| running.local_addr)
    }

    /// Binds and starts serving. Already running is not an error.
    pub async fn start(
        &self,
        preferred_host: Option<IpAddr>,
        port: u16,
    ) -> Result<ServerState, BindError> {
        let mut slot = self.inner.slot.lock().await;
        self.inner.start_locked(&mut slot, preferred_host, port)
    }

    /// Closes the socket and every open connection. Requests that have not been
    /// dispatched yet are abandoned.
    ///
    /// Idempotent; failures are logged, never returned.
    pub async fn stop(&self) {
        let mut slot = self.inner.slot.lock().await;
        self.inner.stop_locked(&mut slot).await;
    }

    /// Stops, waits the grace delay, then starts again on a spawned task.
    ///
    /// The caller is not blocked; await the handle to observe the outcome.
    pub fn restart(&self) -> JoinHandle<Result<ServerState, BindError>> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut slot = inner.slot.lock().await;
            let (host, port) = slot
                .last_bind
                .unwrap_or((inner.settings.host, inner.settings.port));
            inner.stop_locked(&mut slot).await;
            tokio::time::sleep(inner.settings.restart_grace).await;
            let result = inner.start_locked(&mut slot, host, port);
            if let Err(err) = &result {
                warn!("restart failed: {}", err);
            }
            result
        })
    }
}

impl ListenerInner {
    fn start_locked(
        &self,
        slot: &mut ListenerSlot,
        preferred_host: Option<IpAddr>,
        port: u16,
    ) -> Result<ServerState, BindError> {
        if slot.running.is_some() {
            return Ok(self.state_tx.borrow().clone());
        }

        let host = resolve_bind_host(preferred_host, self.interfaces.as_ref());
        let requested = SocketAddr::new(host, port);
        let listener = bind_listener(requested).map_err(|err| BindError::from_io(requested, err))?;
        let local_addr = listener
            .local_addr()
            .map_err(|err| BindError::from_io(requested, err))?;

        let state = ServerState {
            host: host.to_string(),
            port: local_addr.port(),
            running: true,
        };
        self.state_tx.send_replace(state.clone());
        let _ = self.transitions_tx.send(state.clone());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let router = build_router(AppState::new(
            self.context.clone(),
            self.state_tx.subscribe(),
            shutdown_rx.clone(),
        ));
        let task = tokio::spawn(accept_loop(listener, router, shutdown_rx));

        slot.running = Some(RunningServer {
            local_addr,
            shutdown_tx,
            task,
        });
        slot.last_bind = Some((preferred_host, local_addr.port()));
        info!("server listening on {} ({})", local_addr, state.send_url());
        Ok(state)
    }

    async fn stop_locked(&self, slot: &mut ListenerSlot) {
        let Some(running) = slot.running.take() else {
            return;
        };

        running.shutdown_tx.send_replace(true);
        let mut task = running.task;
        match timeout(self.settings.shutdown_timeout, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("listener task ended abnormally: {}", err),
            Err(_) => {
                warn!(
                    "graceful shutdown exceeded {:?}; dropping open connections",
                    self.settings.shutdown_timeout
                );
                task.abort();
                let _ = task.await;
            }
        }

        self.state_tx.send_modify(|state| state.running = false);
        let _ = self.transitions_tx.send(self.state_tx.borrow().clone());
        info!("server on {} stopped", running.local_addr);
    }
}

async fn accept_loop(listener: TcpListener, router: Router, shutdown: watch::Receiver<bool>) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    connections.spawn(serve_connection(
                        stream,
                        peer,
                        router.clone(),
                        shutdown.clone(),
                    ));
                }
                Err(err) => {
                    warn!("accept failed: {}", err);
                    sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            },
            Some(_) = connections.join_next() => {}
            _ = stop_requested(shutdown.clone()) => break,
        }
    }

    drop(listener);
    while connections.join_next().await.is_some() {}
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    router: Router,
    shutdown: watch::Receiver<bool>,
) {
    let connection = http1::Builder::new()
        .timer(TokioTimer::new())
        .serve_connection(TokioIo::new(stream), TowerToHyperService::new(router));
    tokio::pin!(connection);

    tokio::select! {
        result = connection.as_mut() => {
            if let Err(err) = result {
                debug!(%peer, "connection ended with error: {}", err);
            }
            return;
        }
        _ = stop_requested(shutdown) => {}
    }

    connection.as_mut().graceful_shutdown();
    if let Err(err) = connection.await {
        debug!(%peer, "connection closed during shutdown: {}", err);
    }
}

async fn stop_requested(mut shutdown: watch::Receiver<bool>) {
    loop {
        let stopping = *shutdown.borrow_and_update();
        if stopping || shutdown.changed().await.is_err() {
            return;
        }
    }
}

fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_to_bind_errors() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        assert!(matches!(
            BindError::from_io(addr, io::Error::from(io::ErrorKind::AddrInUse)),
            BindError::AddressInUse { .. }
        ));
        assert!(matches!(
            BindError::from_io(addr, io::Error::from(io::ErrorKind::PermissionDenied)),
            BindError::PermissionDenied { .. }
        ));
        assert!(matches!(
            BindError::from_io(addr, io::Error::other("boom")),
            BindError::Io { .. }
        ));
    }

    #[test]
    fn send_url_uses_host_and_port() {
        let state = ServerState {
            host: "192.168.1.5".to_owned(),
            port: 9000,
            running: true,
        };
        assert_eq!(state.send_url(), "http://192.168.1.5:9000/send");
    }
}
