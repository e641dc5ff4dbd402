//! Per-peer session lifecycle
//!
//! A `Peer` owns its key pairs, its in-flight handshake, six timers and four
//! signals. One long-lived task per peer (the timer engine) consumes the
//! timers and signals; the packet send and receive paths only arm them.

mod engine;
mod initiation;
mod timers;

pub use engine::TimerEvent;
pub use timers::{Signals, Timers};

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use zeroize::Zeroizing;

use crate::conn::{Endpoint, KeyedEndpoint};
use crate::device::{Device, OutboundElement};
use crate::error::{NetworkError, Result};
use crate::noise::keys::KEY_LEN;
use crate::noise::{HandshakeState, KeyPairs, NoisePublicKey};

pub struct Peer {
    device: Arc<Device>,
    public_key: NoisePublicKey,
    preshared_key: Zeroizing<[u8; KEY_LEN]>,
    endpoint: tokio::sync::Mutex<Option<KeyedEndpoint>>,
    keypairs: KeyPairs,
    handshake: HandshakeState,
    /// Seconds; zero disables persistent keep-alives
    persistent_keepalive_interval: AtomicU64,
    last_handshake_nanos: AtomicI64,
    tx_bytes: AtomicU64,
    timers: Timers,
    signals: Signals,
    queue: mpsc::Sender<OutboundElement>,
    queue_rx: Mutex<Option<mpsc::Receiver<OutboundElement>>>,
}

impl Peer {
    pub fn new(
        device: Arc<Device>,
        public_key: NoisePublicKey,
        preshared_key: Option<[u8; KEY_LEN]>,
        endpoint: Option<Box<dyn Endpoint>>,
        persistent_keepalive: u16,
    ) -> Arc<Self> {
        let (queue, queue_rx) = mpsc::channel(device.profile().outbound_queue_size.max(1));
        Arc::new(Self {
            device,
            public_key,
            preshared_key: Zeroizing::new(preshared_key.unwrap_or([0u8; KEY_LEN])),
            endpoint: tokio::sync::Mutex::new(
                endpoint.map(|inner| KeyedEndpoint::new(inner, public_key)),
            ),
            keypairs: KeyPairs::new(),
            handshake: HandshakeState::new(),
            persistent_keepalive_interval: AtomicU64::new(u64::from(persistent_keepalive)),
            last_handshake_nanos: AtomicI64::new(0),
            tx_bytes: AtomicU64::new(0),
            timers: Timers::default(),
            signals: Signals::default(),
            queue,
            queue_rx: Mutex::new(Some(queue_rx)),
        })
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn public_key(&self) -> &NoisePublicKey {
        &self.public_key
    }

    pub fn preshared_key(&self) -> &[u8; KEY_LEN] {
        &self.preshared_key
    }

    pub fn keypairs(&self) -> &KeyPairs {
        &self.keypairs
    }

    pub fn handshake(&self) -> &HandshakeState {
        &self.handshake
    }

    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    pub fn signals(&self) -> &Signals {
        &self.signals
    }

    pub fn persistent_keepalive_interval(&self) -> Option<Duration> {
        match self.persistent_keepalive_interval.load(Ordering::Acquire) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn set_persistent_keepalive_interval(&self, secs: u16) {
        self.persistent_keepalive_interval
            .store(u64::from(secs), Ordering::Release);
        if secs == 0 {
            self.timers.keepalive_persistent.stop();
        }
    }

    /// Wall-clock time of the last completed handshake
    pub fn last_handshake(&self) -> Option<SystemTime> {
        match self.last_handshake_nanos.load(Ordering::Acquire) {
            0 => None,
            nanos => Some(UNIX_EPOCH + Duration::from_nanos(nanos as u64)),
        }
    }

    fn record_handshake_time(&self) {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);
        self.last_handshake_nanos.store(nanos, Ordering::Release);
    }

    pub fn tx_bytes(&self) -> u64 {
        self.tx_bytes.load(Ordering::Relaxed)
    }

    /// Hand the consuming end of the outbound queue to the encryption pipeline.
    /// Only the first caller gets it.
    pub fn take_outbound_receiver(&self) -> Option<mpsc::Receiver<OutboundElement>> {
        self.queue_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Elements queued and not yet picked up by the pipeline
    pub fn outbound_len(&self) -> usize {
        self.queue.max_capacity() - self.queue.capacity()
    }

    /// Run `f` against the current endpoint under the peer's endpoint lock
    pub async fn with_endpoint<R>(&self, f: impl FnOnce(Option<&KeyedEndpoint>) -> R) -> R {
        let endpoint = self.endpoint.lock().await;
        f(endpoint.as_ref())
    }

    /// Replace the endpoint wholesale, e.g. after the peer roamed
    pub async fn set_endpoint(&self, endpoint: Box<dyn Endpoint>) {
        let endpoint = KeyedEndpoint::new(endpoint, self.public_key);
        let mut current = self.endpoint.lock().await;
        if let Some(old) = current.as_ref() {
            if old.dst_addr() != endpoint.dst_addr() {
                tracing::info!(
                    "{} endpoint changed from {} to {}",
                    self,
                    old.dst_to_string(),
                    endpoint.dst_to_string()
                );
            }
        }
        *current = Some(endpoint);
    }

    /// Whether a packet from `src` came from the address we last recorded
    pub async fn endpoint_matches(&self, src: SocketAddr) -> bool {
        self.with_endpoint(|ep| ep.is_some_and(|ep| ep.dst_addr() == src))
            .await
    }

    /// Transmit one datagram to the current endpoint
    pub async fn send_buffer(&self, buf: &[u8]) -> Result<()> {
        let endpoint = self.endpoint.lock().await;
        let endpoint = endpoint.as_ref().ok_or(NetworkError::NoEndpoint)?;
        self.device.bind().send(buf, endpoint).await?;
        self.tx_bytes.fetch_add(buf.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Spawn the timer engine for this peer
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(self.clone().routine_timer_handler())
    }

    /// Terminate the timer engine; irreversible
    pub fn stop(&self) {
        self.signals.stop.broadcast();
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer({})", self.public_key)
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("public_key", &self.public_key)
            .field("keypairs", &self.keypairs)
            .finish_non_exhaustive()
    }
}
