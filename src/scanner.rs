//! Resilient link to the external barcode-scanning device.
//!
//! The device streams unsolicited text frames over WebSocket, one scanned
//! code per frame; the terminal never sends anything back. The link retries
//! failed connections indefinitely with a fixed delay (no backoff, the
//! device sits on the local network), and supports manual reconnection.
//!
//! The connection handle is modeled as a generation counter: every connection
//! attempt gets a fresh generation, and events carrying a superseded
//! generation are dropped instead of mutating state the new handle owns.
//! [`LinkState`] is the pure state machine; [`ScannerLink`] drives it from a
//! tokio task.

use futures::StreamExt;
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Connection status as surfaced to the terminal UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Pure connection state machine with generation-tagged events.
///
/// Each connection attempt owns a generation. Events for any other
/// generation are stale and must not change state; this is what makes a
/// manual reconnect safe against late callbacks from the replaced handle.
#[derive(Debug)]
pub struct LinkState {
    status: LinkStatus,
    generation: u64,
    last_scanned_code: Option<String>,
}

impl LinkState {
    /// Creates a disconnected link with no live generation.
    pub fn new() -> Self {
        LinkState {
            status: LinkStatus::Disconnected,
            generation: 0,
            last_scanned_code: None,
        }
    }

    /// Begins a connection attempt, allocating a fresh generation.
    ///
    /// Returns `None` without state change if a connection attempt is
    /// already in progress or established.
    pub fn begin_connect(&mut self) -> Option<u64> {
        if self.status != LinkStatus::Disconnected {
            return None;
        }
        self.generation += 1;
        self.status = LinkStatus::Connecting;
        Some(self.generation)
    }

    /// Marks the given generation's attempt as established.
    ///
    /// Returns `false` and changes nothing if the generation is stale.
    pub fn connected(&mut self, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        self.status = LinkStatus::Connected;
        true
    }

    /// Records an inbound frame for the given generation.
    ///
    /// Returns the code to forward to the consumer, or `None` if the
    /// generation is stale or the link is not connected.
    pub fn frame(&mut self, generation: u64, text: &str) -> Option<String> {
        if generation != self.generation || self.status != LinkStatus::Connected {
            return None;
        }
        self.last_scanned_code = Some(text.to_string());
        Some(text.to_string())
    }

    /// Marks the given generation's connection as lost.
    ///
    /// Returns `false` and changes nothing if the generation is stale.
    pub fn disconnected(&mut self, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        self.status = LinkStatus::Disconnected;
        true
    }

    /// Invalidates the current generation (manual reconnect or teardown).
    ///
    /// Any event still in flight for the old generation will be dropped.
    pub fn supersede(&mut self) {
        self.generation += 1;
        self.status = LinkStatus::Disconnected;
    }

    /// Current connection status.
    pub fn status(&self) -> LinkStatus {
        self.status
    }

    /// The most recent code received on a live connection.
    pub fn last_scanned_code(&self) -> Option<&str> {
        self.last_scanned_code.as_deref()
    }
}

impl Default for LinkState {
    fn default() -> Self {
        Self::new()
    }
}

/// Scanner connection settings.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// WebSocket endpoint of the scanning device,
    /// e.g. `ws://esp8266-scanner.local:81`.
    pub url: String,

    /// Fixed delay between automatic reconnect attempts.
    pub reconnect_delay: Duration,
}

impl ScannerConfig {
    /// Creates a config with the default 5 second reconnect delay.
    pub fn new(url: impl Into<String>) -> Self {
        ScannerConfig {
            url: url.into(),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

enum LinkCommand {
    Reconnect,
    Shutdown,
}

/// Handle to the running scanner link task.
///
/// Scanned codes are delivered in arrival order on the channel given to
/// [`ScannerLink::start`]. Dropping the handle leaves the task running;
/// call [`ScannerLink::shutdown`] to tear the link down cleanly.
pub struct ScannerLink {
    state: Arc<Mutex<LinkState>>,
    ctrl: mpsc::UnboundedSender<LinkCommand>,
    task: JoinHandle<()>,
}

impl ScannerLink {
    /// Starts the link task and immediately begins connecting.
    pub fn start(config: ScannerConfig, codes: mpsc::UnboundedSender<String>) -> Self {
        let state = Arc::new(Mutex::new(LinkState::new()));
        let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_link(config, Arc::clone(&state), codes, ctrl_rx));

        ScannerLink {
            state,
            ctrl: ctrl_tx,
            task,
        }
    }

    /// Current connection status.
    pub fn status(&self) -> LinkStatus {
        lock(&self.state).status()
    }

    /// The most recent code received from the device.
    pub fn last_scanned_code(&self) -> Option<String> {
        lock(&self.state).last_scanned_code().map(str::to_string)
    }

    /// Requests a manual reconnect: the current handle is superseded and a
    /// new connection attempt starts immediately, skipping the retry delay.
    pub fn reconnect(&self) {
        let _ = self.ctrl.send(LinkCommand::Reconnect);
    }

    /// Closes the active connection, cancels any pending reconnect wait,
    /// and joins the task.
    pub async fn shutdown(self) {
        let _ = self.ctrl.send(LinkCommand::Shutdown);
        let _ = self.task.await;
    }
}

fn lock(state: &Mutex<LinkState>) -> MutexGuard<'_, LinkState> {
    // Safety: only poisoned if a lock holder panicked, which is itself a bug
    state.lock().expect("link state lock poisoned")
}

async fn run_link(
    config: ScannerConfig,
    state: Arc<Mutex<LinkState>>,
    codes: mpsc::UnboundedSender<String>,
    mut ctrl: mpsc::UnboundedReceiver<LinkCommand>,
) {
    'attempt: loop {
        let generation = match lock(&state).begin_connect() {
            Some(generation) => generation,
            None => return,
        };

        debug!("Scanner: connecting to {}", config.url);
        let attempt = tokio::select! {
            attempt = connect_async(config.url.as_str()) => attempt,
            cmd = ctrl.recv() => match cmd {
                Some(LinkCommand::Reconnect) => {
                    // Abandon the in-flight handshake and start over.
                    info!("Scanner: manual reconnect requested");
                    lock(&state).supersede();
                    continue 'attempt;
                }
                Some(LinkCommand::Shutdown) | None => {
                    debug!("Scanner: shutting down link");
                    lock(&state).supersede();
                    return;
                }
            },
        };
        match attempt {
            Ok((mut ws, _)) => {
                if !lock(&state).connected(generation) {
                    // Superseded while the handshake was in flight.
                    let _ = ws.close(None).await;
                    continue 'attempt;
                }
                info!("Scanner: connected to {}", config.url);

                loop {
                    tokio::select! {
                        msg = ws.next() => match msg {
                            Some(Ok(Message::Text(text))) => {
                                // Bind before the `if let` so the guard drops
                                // ahead of the awaits below.
                                let frame = lock(&state).frame(generation, &text);
                                if let Some(code) = frame {
                                    debug!("Scanner: received code {:?}", code);
                                    if codes.send(code).is_err() {
                                        // Consumer is gone; tear down.
                                        lock(&state).supersede();
                                        let _ = ws.close(None).await;
                                        return;
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                warn!("Scanner: connection closed by device");
                                lock(&state).disconnected(generation);
                                break;
                            }
                            Some(Ok(_)) => {
                                // Ping/pong/binary frames carry no codes.
                            }
                            Some(Err(e)) => {
                                warn!("Scanner: transport error: {}", e);
                                lock(&state).disconnected(generation);
                                break;
                            }
                        },
                        cmd = ctrl.recv() => match cmd {
                            Some(LinkCommand::Reconnect) => {
                                info!("Scanner: manual reconnect requested");
                                lock(&state).supersede();
                                let _ = ws.close(None).await;
                                continue 'attempt;
                            }
                            Some(LinkCommand::Shutdown) | None => {
                                debug!("Scanner: shutting down link");
                                lock(&state).supersede();
                                let _ = ws.close(None).await;
                                return;
                            }
                        },
                    }
                }
            }
            Err(e) => {
                warn!("Scanner: connect to {} failed: {}", config.url, e);
                lock(&state).disconnected(generation);
            }
        }

        // Disconnected: wait out the fixed delay before retrying, unless a
        // manual reconnect (retry now) or shutdown arrives first.
        tokio::select! {
            _ = tokio::time::sleep(config.reconnect_delay) => {}
            cmd = ctrl.recv() => match cmd {
                Some(LinkCommand::Reconnect) => {
                    info!("Scanner: manual reconnect requested");
                }
                Some(LinkCommand::Shutdown) | None => {
                    debug!("Scanner: shutting down link");
                    return;
                }
            },
        }
    }
}
