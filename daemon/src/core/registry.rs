//! Process-wide session owner.
//!
//! Holds at most one `Session` at a time behind a lock, plus the sampler
//! and analyzer task handles that feed it. Connecting spawns both tasks
//! and installs a fresh `Session`; disconnecting aborts both tasks and
//! drops the `Session`, which resets every collection in one move — the
//! redesign this crate takes over a set of independent process-wide
//! globals. A run of consecutive sampler read failures also triggers this
//! same teardown on its own, without an explicit disconnect call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::config::ObserverConfig;
use crate::core::image::{Image, IMAGE_SIZE};
use crate::core::session::{Session, SessionTunables};
use crate::core::timeline::Sample;
use crate::error::ObserverError;
use crate::s7::S7Client;

#[derive(Debug, Clone)]
pub enum Event {
    Snapshot { timestamp_ns: u64, image: Image },
    Histogram { counts: Vec<[u8; IMAGE_SIZE]> },
    Cycles { cycles: Vec<u64> },
}

struct TaskHandles {
    sampler: JoinHandle<()>,
    analyzer: JoinHandle<()>,
}

pub struct Registry {
    session: Arc<RwLock<Option<Session>>>,
    config: ObserverConfig,
    events_tx: broadcast::Sender<Event>,
    connected: Arc<AtomicBool>,
    tasks: std::sync::Mutex<Option<TaskHandles>>,
}

impl Registry {
    pub fn new(config: ObserverConfig) -> Self {
        let (events_tx, _rx) = broadcast::channel(256);
        Self {
            session: Arc::new(RwLock::new(None)),
            config,
            events_tx,
            connected: Arc::new(AtomicBool::new(false)),
            tasks: std::sync::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ObserverConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events_tx.subscribe()
    }

    pub async fn with_session<R>(&self, f: impl FnOnce(&Session) -> R) -> Option<R> {
        let guard = self.session.read().await;
        guard.as_ref().map(f)
    }

    #[instrument(skip(self, client))]
    pub async fn connect(
        &self,
        mut client: Box<dyn S7Client>,
        address: String,
        rack: u16,
        slot: u16,
        period_ms: u64,
    ) -> Result<(), ObserverError> {
        if self.is_connected() {
            return Err(ObserverError::Validation("session already active".into()));
        }

        client.connect(&address, rack, slot).await?;

        let tunables = SessionTunables {
            min_cycle_time_ms: self.config.min_cycle_time_ms,
            starting_precision: self.config.starting_precision,
            cycles_analyze_time_s: self.config.cycles_analyze_time_s,
            cycles_analyze_time_add_s: self.config.cycles_analyze_time_add_s,
            period_precision_ms: self.config.period_precision_ms,
        };
        *self.session.write().await = Some(Session::new(tunables, 0));
        self.connected.store(true, Ordering::SeqCst);

        let start = Instant::now();
        let sampler = self.spawn_sampler(client, period_ms, start);
        let analyzer = self.spawn_analyzer(start);

        *self.tasks.lock().unwrap() = Some(TaskHandles { sampler, analyzer });
        info!(address, rack, slot, period_ms, "session connected");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(handles) = self.tasks.lock().unwrap().take() {
            handles.sampler.abort();
            handles.analyzer.abort();
        }
        *self.session.write().await = None;
        info!("session disconnected");
    }

    fn spawn_sampler(
        &self,
        mut client: Box<dyn S7Client>,
        period_ms: u64,
        start: Instant,
    ) -> JoinHandle<()> {
        let session = self.session.clone();
        let connected = self.connected.clone();
        let events_tx = self.events_tx.clone();
        let push_data_ms = self.config.push_data_ms;
        let push_stats_ms = self.config.push_stats_ms;
        let push_cycles_ms = self.config.push_cycles_ms;
        let max_consecutive_read_failures = self.config.max_consecutive_read_failures;
        let mut last_data_push = Instant::now();
        let mut last_stats_push = Instant::now();
        let mut last_cycles_push = Instant::now();
        let mut consecutive_failures: u32 = 0;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(period_ms.max(1)));
            loop {
                interval.tick().await;
                if !connected.load(Ordering::SeqCst) {
                    break;
                }

                match client.read_image().await {
                    Ok(image) => {
                        consecutive_failures = 0;
                        let timestamp_ns = start.elapsed().as_nanos() as u64;
                        let mut guard = session.write().await;
                        if let Some(s) = guard.as_mut() {
                            s.record_sample(Sample { timestamp_ns, image });
                        }
                        drop(guard);

                        if last_data_push.elapsed() >= Duration::from_millis(push_data_ms) {
                            last_data_push = Instant::now();
                            let _ = events_tx.send(Event::Snapshot { timestamp_ns, image });
                        }
                    }
                    Err(ObserverError::EmptyRead) => {
                        consecutive_failures += 1;
                        warn!(consecutive_failures, "empty read anomaly, sample dropped");
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        warn!(error = %e, consecutive_failures, "sampler transport error");
                    }
                }

                if consecutive_failures >= max_consecutive_read_failures {
                    error!(
                        consecutive_failures,
                        "connection declared lost after repeated read failures"
                    );
                    connected.store(false, Ordering::SeqCst);
                    *session.write().await = None;
                    break;
                }

                if last_stats_push.elapsed() >= Duration::from_millis(push_stats_ms) {
                    last_stats_push = Instant::now();
                    let guard = session.read().await;
                    if let Some(s) = guard.as_ref() {
                        let counts = s.histogram_snapshot();
                        drop(guard);
                        let _ = events_tx.send(Event::Histogram { counts });
                    }
                }
                if last_cycles_push.elapsed() >= Duration::from_millis(push_cycles_ms) {
                    last_cycles_push = Instant::now();
                    let guard = session.read().await;
                    if let Some(s) = guard.as_ref() {
                        let cycles = s.cycles().to_vec();
                        drop(guard);
                        let _ = events_tx.send(Event::Cycles { cycles });
                    }
                }
            }
            client.close().await;
        })
    }

    fn spawn_analyzer(&self, start: Instant) -> JoinHandle<()> {
        let session = self.session.clone();
        let connected = self.connected.clone();
        let tick_period_ms = self.config.tick_period_ms;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(tick_period_ms));
            loop {
                interval.tick().await;
                if !connected.load(Ordering::SeqCst) {
                    break;
                }
                let now_ns = start.elapsed().as_nanos() as u64;
                let mut guard = session.write().await;
                if let Some(s) = guard.as_mut() {
                    s.tick(now_ns);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s7::FakeS7Client;
    use std::time::Duration as StdDuration;

    fn periodic_frames(n_cycles: usize) -> Vec<[u8; IMAGE_SIZE]> {
        let mut frames = Vec::with_capacity(n_cycles * 2);
        for k in 0..(n_cycles * 2) {
            let mut img = [0u8; IMAGE_SIZE];
            if k % 2 == 1 {
                img[0] = 1;
                img[1] = 1;
            }
            frames.push(img);
        }
        frames
    }

    fn tiny_config() -> ObserverConfig {
        let mut cfg = ObserverConfig::default();
        cfg.min_cycle_time_ms = 150;
        cfg.starting_precision = 2;
        cfg.cycles_analyze_time_s = 1;
        cfg.cycles_analyze_time_add_s = 1;
        cfg.period_precision_ms = 100;
        cfg.tick_period_ms = 50;
        // High enough that tests which run the sampler past frame exhaustion
        // (and so into a run of `EmptyRead`s) aren't tripped up by the
        // failure-streak disconnect; that behavior gets its own dedicated
        // low-threshold test below.
        cfg.max_consecutive_read_failures = 1_000;
        cfg
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_resets_every_collection_and_sessions_are_independent() {
        let registry = Registry::new(tiny_config());

        let client = Box::new(FakeS7Client::new(periodic_frames(100)));
        registry.connect(client, "127.0.0.1".into(), 0, 2, 10).await.unwrap();
        assert!(registry.is_connected());

        // Let the sampler drain all frames (100 * 10ms) and the analyzer run
        // several ticks (50ms each) past the 1s cycle-search deadline.
        tokio::time::advance(StdDuration::from_millis(3_000)).await;
        tokio::task::yield_now().await;

        let had_states = registry.with_session(|s| s.states().len()).await.unwrap_or(0);
        assert!(had_states > 0, "expected states to accumulate before disconnect");

        registry.disconnect().await;
        assert!(!registry.is_connected());
        assert!(registry.with_session(|s| s.states().len()).await.is_none());

        // Reconnecting starts from a clean slate, independent of the prior
        // session's data.
        let client2 = Box::new(FakeS7Client::new(periodic_frames(100)));
        registry.connect(client2, "127.0.0.1".into(), 0, 2, 10).await.unwrap();
        let states_at_start = registry.with_session(|s| s.states().len()).await.unwrap();
        assert_eq!(states_at_start, 0, "new session must not inherit prior states");

        registry.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_empty_reads_declare_the_connection_lost() {
        let mut cfg = tiny_config();
        cfg.max_consecutive_read_failures = 3;
        let registry = Registry::new(cfg);

        // No frames queued: every read comes back `EmptyRead`.
        let client = Box::new(FakeS7Client::new(Vec::new()));
        registry.connect(client, "127.0.0.1".into(), 0, 2, 10).await.unwrap();
        assert!(registry.is_connected());

        tokio::time::advance(StdDuration::from_millis(10 * 5)).await;
        tokio::task::yield_now().await;

        assert!(!registry.is_connected());
        assert!(registry.with_session(|s| s.states().len()).await.is_none());
    }

    #[tokio::test]
    async fn connect_twice_without_disconnect_is_rejected() {
        let registry = Registry::new(tiny_config());
        let client = Box::new(FakeS7Client::new(periodic_frames(1)));
        registry.connect(client, "127.0.0.1".into(), 0, 2, 10).await.unwrap();

        let client2 = Box::new(FakeS7Client::new(periodic_frames(1)));
        let err = registry.connect(client2, "127.0.0.1".into(), 0, 2, 10).await;
        assert!(err.is_err());

        registry.disconnect().await;
    }
}
