//! The node runtime and its event loop.
//!
//! Wires the directory, the reliable router, and storage over a
//! caller-supplied flooding substrate. Everything runs on one task: the
//! substrate delivers received packets through a channel, the
//! retransmission timer sleeps exactly as long as the pending table
//! asks, and the state is persisted periodically and at shutdown.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::{mpsc, watch};

use loramesh_core::{MeshPacket, NodeNum, PacketIdSource};
use loramesh_router::routing;
use loramesh_router::{FloodingRouter, ReliableRouter, RouterError};

use crate::config::{parse_mac, NodeConfig};
use crate::devicestate::{CriticalErrorCode, Position, User};
use crate::error::NodeError;
use crate::nodedb::{BootInfo, DirectoryUpdate, LoadedState, NodeDb};
use crate::storage::{Store, StoreError};

/// Events published to the embedding application.
#[derive(Debug)]
pub enum NodeEvent {
    /// The directory changed; observers should refresh.
    NodeDbUpdated { force: bool },
    /// A peer's user record changed; wakes the power state machine.
    UserChanged { node: NodeNum },
    /// A packet for the local application transport.
    PacketDelivered(MeshPacket),
    /// A critical error was recorded; show it on the screen.
    CriticalError {
        code: CriticalErrorCode,
        address: u32,
    },
}

/// Handle for requesting shutdown from another task.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Sleep bound when nothing is pending, so config changes and channel
/// closure still get noticed.
const IDLE_TICK_MSEC: u64 = 60_000;

enum Wake {
    RetransmitDue,
    Inbound(Option<MeshPacket>),
    Persist,
    Shutdown,
}

/// A mesh node: directory, reliable router, and persistence, driven by
/// a single event loop.
pub struct Node<F: FloodingRouter> {
    config: NodeConfig,
    db: NodeDb,
    router: ReliableRouter<F>,
    store: Store,
    boot: BootInfo,
    started_at: Instant,
    inbound_tx: mpsc::UnboundedSender<MeshPacket>,
    inbound_rx: mpsc::UnboundedReceiver<MeshPacket>,
    events_tx: mpsc::UnboundedSender<NodeEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<NodeEvent>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<F: FloodingRouter> Node<F> {
    /// Create a node from configuration and a flooding substrate.
    pub fn new(config: NodeConfig, substrate: F) -> Result<Self, NodeError> {
        let mac = match &config.node.mac {
            Some(s) => parse_mac(s)?,
            None => random_mac(),
        };

        let store = match &config.node.storage_path {
            Some(path) => Store::new(PathBuf::from(path))?,
            None => Store::default_path()?,
        };

        let boot = BootInfo {
            firmware_version: env!("CARGO_PKG_VERSION").to_string(),
            hw_model: config.node.hw_model.clone(),
            region_tag: config.node.region_tag.clone(),
        };

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            db: NodeDb::new(mac),
            router: ReliableRouter::new(substrate, PacketIdSource::random()),
            store,
            boot,
            started_at: Instant::now(),
            inbound_tx,
            inbound_rx,
            events_tx,
            events_rx: Some(events_rx),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Milliseconds since boot. Wraps like any embedded tick counter.
    pub fn now_ms(&self) -> u32 {
        self.started_at.elapsed().as_millis() as u32
    }

    pub fn db(&self) -> &NodeDb {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut NodeDb {
        &mut self.db
    }

    pub fn router(&self) -> &ReliableRouter<F> {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut ReliableRouter<F> {
        &mut self.router
    }

    /// Sender the substrate uses to deliver received packets.
    pub fn inbound_sender(&self) -> mpsc::UnboundedSender<MeshPacket> {
        self.inbound_tx.clone()
    }

    /// Take the event stream. Yields `None` after the first call.
    pub fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<NodeEvent>> {
        self.events_rx.take()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Boot: load the saved state and initialize the directory.
    pub async fn start(&mut self) -> Result<(), NodeError> {
        let loaded = match self.store.load().await {
            Ok(Some(state)) => LoadedState::State(state),
            Ok(None) => LoadedState::Absent,
            Err(StoreError::Decode(e)) => {
                tracing::warn!("can't decode saved device state: {e}");
                LoadedState::Corrupt
            }
            Err(e) => return Err(e.into()),
        };

        self.db.init(loaded, &self.boot, self.router.ids_mut());

        if self.config.node.no_save {
            self.db.device_state_mut().no_save = true;
        }

        tracing::info!(
            node = %self.db.node_num(),
            nodes = self.db.num_nodes(),
            region = self.db.active_region().map_or("unset", |r| r.name),
            "node started"
        );
        Ok(())
    }

    /// Send a packet from the local application.
    pub fn send(&mut self, p: MeshPacket) -> Result<(), RouterError> {
        let now = self.now_ms();
        let result = self.router.send(p, now);
        self.flush_local_delivery();
        result
    }

    /// Feed one received packet through filter, sniff, and dispatch.
    pub fn handle_received(&mut self, p: MeshPacket) {
        let now = self.now_ms();

        if self.router.should_filter_received(&p, now) {
            tracing::trace!(id = %p.id, "packet filtered");
        } else {
            self.db.update_from(&p);
            match routing::handle_received(&mut self.router, &p, now) {
                Ok(Some(packet)) => {
                    let _ = self.events_tx.send(NodeEvent::PacketDelivered(packet));
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("receive dispatch failed: {e}"),
            }
        }

        self.flush_local_delivery();
    }

    /// Apply a received position report to the directory.
    pub fn apply_position(&mut self, node: NodeNum, p: &Position) {
        let update = self.db.update_position(node, p);
        self.publish_directory_update(update);
    }

    /// Apply a received user snapshot to the directory.
    pub fn apply_user(&mut self, node: NodeNum, user: User) {
        let update = self.db.update_user(node, user);
        self.publish_directory_update(update);
    }

    /// Record a critical error and surface it to the embedding.
    pub fn record_critical_error(&mut self, code: CriticalErrorCode, address: u32) {
        self.db.record_critical_error(code, address);
        let _ = self
            .events_tx
            .send(NodeEvent::CriticalError { code, address });
    }

    /// Persist the device state.
    pub async fn save(&mut self) -> Result<(), NodeError> {
        self.store.save(self.db.device_state_mut()).await?;
        Ok(())
    }

    /// Run the event loop until shutdown is requested.
    pub async fn run(&mut self) {
        let persist_secs = self.config.node.persist_interval;
        let mut persist =
            tokio::time::interval(Duration::from_secs(persist_secs.max(1)));
        persist.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first interval tick fires immediately; we just booted, so
        // swallow it.
        persist.tick().await;

        loop {
            let now = self.now_ms();
            let delay = self.router.do_retransmissions(now);
            self.flush_local_delivery();

            let sleep_ms = if delay == i32::MAX {
                IDLE_TICK_MSEC
            } else {
                delay.max(1) as u64
            };

            let wake = tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(sleep_ms)) => Wake::RetransmitDue,
                p = self.inbound_rx.recv() => Wake::Inbound(p),
                _ = persist.tick(), if persist_secs > 0 => Wake::Persist,
                _ = self.shutdown_rx.changed() => Wake::Shutdown,
            };

            match wake {
                Wake::RetransmitDue => {}
                Wake::Inbound(Some(p)) => self.handle_received(p),
                // We hold a sender ourselves, so this never triggers;
                // treat it as idle if it somehow does.
                Wake::Inbound(None) => {}
                Wake::Persist => {
                    if let Err(e) = self.save().await {
                        tracing::warn!("periodic save failed: {e}");
                    }
                }
                Wake::Shutdown => {
                    if *self.shutdown_rx.borrow() {
                        tracing::info!("shutdown requested");
                        break;
                    }
                }
            }
        }
    }

    /// Final save on the way down.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.save().await {
            tracing::error!("final save failed: {e}");
        }
    }

    fn publish_directory_update(&mut self, update: DirectoryUpdate) {
        if update.user_changed {
            let _ = self
                .events_tx
                .send(NodeEvent::UserChanged { node: update.node });
        }
        if update.notify {
            let _ = self
                .events_tx
                .send(NodeEvent::NodeDbUpdated { force: true });
        }
    }

    fn flush_local_delivery(&mut self) {
        for p in self.router.take_local_delivery() {
            let _ = self.events_tx.send(NodeEvent::PacketDelivered(p));
        }
    }
}

/// A random locally administered unicast MAC, for hosts without a
/// radio-supplied one.
fn random_mac() -> [u8; 6] {
    let mut mac: [u8; 6] = rand::thread_rng().gen();
    mac[0] = (mac[0] | 0x02) & !0x01;
    mac
}
