//! Multi-session manager: readable session codes, LRU capacity eviction,
//! and idle-TTL cleanup over a single shared dataset handle.
//!
//! Each session's engine lives behind its own [`tokio::sync::Mutex`] rather
//! than a lock shared across the whole map (§5 "Shared-resource policy"):
//! the map lock (`parking_lot`, held only for short, synchronous structural
//! edits) never overlaps with an engine's tick, which suspends for up to one
//! bin interval. Pausing session A must never delay session B's ticks (§8
//! "Isolation"), which a single coarse lock would violate.

use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use neurastream_dataset::Dataset;
use parking_lot::Mutex as SyncMutex;
use rand::Rng;
use tokio::sync::Mutex as AsyncMutex;

use crate::engine::{EmitOutcome, PlaybackEngine};
use crate::error::{CoreError, Result};

const ADJECTIVES: [&str; 12] = [
    "swift", "bright", "clever", "neural", "quantum", "cosmic", "rapid", "dynamic", "active",
    "smart", "fast", "prime",
];

const NOUNS: [&str; 12] = [
    "brain", "cortex", "synapse", "neuron", "signal", "wave", "pulse", "mind", "link", "node",
    "core", "stream",
];

struct SessionEntry {
    engine: Arc<AsyncMutex<PlaybackEngine>>,
    created_at: Instant,
    last_active: Instant,
    connections: u32,
}

/// Summary of one session's bookkeeping, independent of its engine's
/// playback counters.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Readable session code
    pub session_code: String,
    /// Age since creation, in seconds
    pub age_seconds: f64,
    /// Seconds since the session was last touched
    pub idle_seconds: f64,
    /// Number of attached streaming connections
    pub connections: u32,
}

/// Aggregate counters across every live session.
#[derive(Debug, Clone, Copy)]
pub struct ManagerStats {
    /// Number of live sessions
    pub total_sessions: usize,
    /// Configured capacity
    pub max_sessions: usize,
    /// Configured idle timeout, in seconds
    pub session_ttl: u64,
    /// Sum of `connections` across every session
    pub active_connections: u32,
    /// Number of sessions whose engine is in the `Running` state
    pub running_sessions: usize,
}

/// Owns the shared dataset and the code-to-engine map.
pub struct SessionManager {
    dataset: Arc<dyn Dataset>,
    max_sessions: usize,
    ttl: Duration,
    sessions: SyncMutex<IndexMap<String, SessionEntry>>,
}

impl SessionManager {
    /// Build a manager over a shared, already-open dataset.
    pub fn new(dataset: Arc<dyn Dataset>, max_sessions: usize, ttl_seconds: u64) -> Self {
        Self {
            dataset,
            max_sessions,
            ttl: Duration::from_secs(ttl_seconds),
            sessions: SyncMutex::new(IndexMap::new()),
        }
    }

    /// The shared dataset handle, for metadata/trial queries.
    pub fn dataset(&self) -> &Arc<dyn Dataset> {
        &self.dataset
    }

    fn generate_code(&self, taken: &IndexMap<String, SessionEntry>) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let adjective = ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())];
            let noun = NOUNS[rng.gen_range(0..NOUNS.len())];
            let number = rng.gen_range(0..100);
            let code = format!("{adjective}-{noun}-{number}");
            if !taken.contains_key(&code) {
                return code;
            }
        }
    }

    /// Create a new session, returning its code. If `code` names an
    /// existing session, that session's activity is touched and its code
    /// returned unchanged rather than erroring (§4.4).
    pub fn create(&self, code: Option<String>) -> Result<String> {
        let mut sessions = self.sessions.lock();

        if let Some(code) = code.as_ref() {
            if sessions.contains_key(code) {
                touch(&mut sessions, code);
                return Ok(code.clone());
            }
        }

        let code = code.unwrap_or_else(|| self.generate_code(&sessions));

        if sessions.len() >= self.max_sessions {
            evict_oldest_idle(&mut sessions);
        }

        let engine = PlaybackEngine::new(Arc::clone(&self.dataset));
        let now = Instant::now();
        sessions.insert(
            code.clone(),
            SessionEntry {
                engine: Arc::new(AsyncMutex::new(engine)),
                created_at: now,
                last_active: now,
                connections: 0,
            },
        );
        log::info!("created session {code} (total sessions: {})", sessions.len());
        Ok(code)
    }

    /// Whether `code` names a live session.
    pub fn contains(&self, code: &str) -> bool {
        self.sessions.lock().contains_key(code)
    }

    /// Clone out the `Arc`-shared engine handle for `code`, touching
    /// activity. The map lock is released before the caller ever awaits on
    /// the engine's own lock, so one session's in-flight tick never blocks
    /// another session's lookup, control call, or tick.
    fn engine_handle(&self, code: &str) -> Result<Arc<AsyncMutex<PlaybackEngine>>> {
        let mut sessions = self.sessions.lock();
        touch(&mut sessions, code);
        sessions
            .get(code)
            .map(|entry| Arc::clone(&entry.engine))
            .ok_or_else(|| CoreError::unknown_session(code))
    }

    /// Run `f` with exclusive access to `code`'s engine, touching activity.
    pub async fn with_engine_mut<R>(
        &self,
        code: &str,
        f: impl FnOnce(&mut PlaybackEngine) -> R,
    ) -> Result<R> {
        let handle = self.engine_handle(code)?;
        let mut engine = handle.lock().await;
        Ok(f(&mut engine))
    }

    /// Run `f` with shared access to `code`'s engine.
    pub async fn with_engine<R>(&self, code: &str, f: impl FnOnce(&PlaybackEngine) -> R) -> Result<R> {
        let handle = self.engine_handle(code)?;
        let engine = handle.lock().await;
        Ok(f(&engine))
    }

    /// Advance `code`'s engine by one tick, suspending until the packet's
    /// expected wall-clock time. Only the one session's engine lock is held
    /// for the suspension; every other session's producer proceeds on its
    /// own schedule (§8 "Isolation"). While paused, the engine's own lock is
    /// released between polls so a concurrent `resume`/`stop`/`seek` call
    /// for the same session is never starved.
    pub async fn tick(&self, code: &str) -> Result<EmitOutcome> {
        loop {
            let handle = self.engine_handle(code)?;
            let outcome = handle.lock().await.tick().await;
            match outcome {
                EmitOutcome::Paused => tokio::time::sleep(Duration::from_millis(100)).await,
                other => return Ok(other),
            }
        }
    }

    /// Increment a session's connection count; called when a streaming
    /// socket opens.
    pub fn increment_connections(&self, code: &str) {
        let mut sessions = self.sessions.lock();
        if let Some(entry) = sessions.get_mut(code) {
            entry.connections += 1;
        }
    }

    /// Decrement a session's connection count; called when a streaming
    /// socket closes.
    pub fn decrement_connections(&self, code: &str) {
        let mut sessions = self.sessions.lock();
        if let Some(entry) = sessions.get_mut(code) {
            entry.connections = entry.connections.saturating_sub(1);
        }
    }

    /// Delete a session, refusing if it has active connections.
    ///
    /// A session can only be deleted once its connection count is zero, so
    /// by the time it is removed here no streaming task still holds the
    /// engine's `Arc`; dropping the map entry is sufficient to stop it.
    pub fn delete(&self, code: &str) -> Result<bool> {
        let mut sessions = self.sessions.lock();
        match sessions.get(code) {
            None => Ok(false),
            Some(entry) if entry.connections > 0 => Err(CoreError::SessionBusy {
                session_code: code.to_string(),
                active_connections: entry.connections,
            }),
            Some(_) => {
                sessions.shift_remove(code);
                log::info!("deleted session {code} (remaining: {})", sessions.len());
                Ok(true)
            }
        }
    }

    /// Remove every session idle beyond the configured TTL with zero
    /// connections; returns the number removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.lock();
        let now = Instant::now();
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, entry)| {
                now.duration_since(entry.last_active) > self.ttl && entry.connections == 0
            })
            .map(|(code, _)| code.clone())
            .collect();

        for code in &expired {
            sessions.shift_remove(code);
            log::info!("cleaned up expired session {code}");
        }
        expired.len()
    }

    /// List bookkeeping info for every live session.
    pub fn list(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.lock();
        let now = Instant::now();
        sessions
            .iter()
            .map(|(code, entry)| SessionInfo {
                session_code: code.clone(),
                age_seconds: now.duration_since(entry.created_at).as_secs_f64(),
                idle_seconds: now.duration_since(entry.last_active).as_secs_f64(),
                connections: entry.connections,
            })
            .collect()
    }

    /// Aggregate counters across all sessions.
    ///
    /// `running_sessions` uses `try_lock`: an engine mid-tick is, by
    /// definition, running, so a lock held elsewhere is itself the answer
    /// and this snapshot never blocks on — or waits behind — the hot path.
    pub fn stats(&self) -> ManagerStats {
        let sessions = self.sessions.lock();
        let active_connections = sessions.values().map(|e| e.connections).sum();
        let running_sessions = sessions
            .values()
            .filter(|e| match e.engine.try_lock() {
                Ok(engine) => engine.state() == crate::engine::EngineState::Running,
                Err(_) => true,
            })
            .count();
        ManagerStats {
            total_sessions: sessions.len(),
            max_sessions: self.max_sessions,
            session_ttl: self.ttl.as_secs(),
            active_connections,
            running_sessions,
        }
    }
}

fn touch(sessions: &mut IndexMap<String, SessionEntry>, code: &str) {
    if let Some(entry) = sessions.get_mut(code) {
        entry.last_active = Instant::now();
        sessions.move_index(sessions.get_index_of(code).unwrap(), sessions.len() - 1);
    }
}

fn evict_oldest_idle(sessions: &mut IndexMap<String, SessionEntry>) {
    let oldest = sessions
        .iter()
        .find(|(_, entry)| entry.connections == 0)
        .map(|(code, _)| code.clone());
    if let Some(code) = oldest {
        sessions.shift_remove(&code);
        log::info!("evicted oldest idle session {code}");
    }
    // If every session has active connections, capacity is a soft cap:
    // the new session is created anyway rather than disconnecting a client.
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurastream_dataset::{BehaviorTrace, MemoryDataset, SpikeTrains};

    fn toy_dataset() -> Arc<dyn Dataset> {
        Arc::new(MemoryDataset::new(
            1,
            1.0,
            40.0,
            SpikeTrains::new(vec![vec![]]),
            BehaviorTrace::default(),
            vec![],
        ))
    }

    #[test]
    fn test_create_generates_unique_codes() {
        let manager = SessionManager::new(toy_dataset(), 100, 3600);
        let a = manager.create(None).unwrap();
        let b = manager.create(None).unwrap();
        assert_ne!(a, b);
        assert!(a.split('-').count() == 3);
    }

    #[test]
    fn test_create_with_existing_code_touches_and_returns_same() {
        let manager = SessionManager::new(toy_dataset(), 100, 3600);
        let code = manager.create(Some("swift-brain-7".into())).unwrap();
        let again = manager.create(Some(code.clone())).unwrap();
        assert_eq!(code, again);
        assert_eq!(manager.stats().total_sessions, 1);
    }

    #[test]
    fn test_delete_refuses_with_active_connections() {
        let manager = SessionManager::new(toy_dataset(), 100, 3600);
        let code = manager.create(None).unwrap();
        manager.increment_connections(&code);
        let err = manager.delete(&code).unwrap_err();
        assert!(matches!(err, CoreError::SessionBusy { .. }));
        manager.decrement_connections(&code);
        assert!(manager.delete(&code).unwrap());
    }

    #[test]
    fn test_capacity_is_soft_cap_when_all_sessions_busy() {
        let manager = SessionManager::new(toy_dataset(), 1, 3600);
        let first = manager.create(None).unwrap();
        manager.increment_connections(&first);
        let second = manager.create(None).unwrap();
        assert_ne!(first, second);
        assert_eq!(manager.stats().total_sessions, 2);
    }

    #[test]
    fn test_capacity_evicts_idle_session_when_not_busy() {
        let manager = SessionManager::new(toy_dataset(), 1, 3600);
        let first = manager.create(None).unwrap();
        let second = manager.create(None).unwrap();
        assert_ne!(first, second);
        assert_eq!(manager.stats().total_sessions, 1);
        assert!(!manager.contains(&first));
    }

    #[tokio::test]
    async fn test_unknown_session_errors() {
        let manager = SessionManager::new(toy_dataset(), 100, 3600);
        let err = manager
            .with_engine(&"nonexistent-code-0".to_string(), |_| ())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownSession { .. }));
    }

    #[tokio::test]
    async fn test_tick_unknown_session_errors() {
        let manager = SessionManager::new(toy_dataset(), 100, 3600);
        let err = manager.tick("nonexistent-code-0").await.unwrap_err();
        assert!(matches!(err, CoreError::UnknownSession { .. }));
    }

    #[tokio::test]
    async fn test_pause_does_not_deadlock_resume() {
        // Regression test: `tick` must release the engine lock while
        // paused so a concurrent `resume`/`stop` call for the same session
        // can always acquire it.
        let manager = Arc::new(SessionManager::new(
            Arc::new(MemoryDataset::new(
                1,
                10.0,
                40.0,
                SpikeTrains::new(vec![vec![]]),
                BehaviorTrace::default(),
                vec![],
            )),
            100,
            3600,
        ));
        let code = manager.create(None).unwrap();
        // One tick to move Fresh -> Running; `pause` is a no-op while Fresh.
        manager.tick(&code).await.unwrap();
        manager.with_engine_mut(&code, |e| e.pause()).await.unwrap();

        let ticker = Arc::clone(&manager);
        let ticker_code = code.clone();
        let tick_task = tokio::spawn(async move { ticker.tick(&ticker_code).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        manager.with_engine_mut(&code, |e| e.stop()).await.unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(1), tick_task)
            .await
            .expect("tick task must not hang while a control call is pending")
            .unwrap();
        assert!(matches!(outcome, Ok(EmitOutcome::EndOfStream)));
    }
}
