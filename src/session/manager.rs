//! Session registry keyed by worktree path.
//!
//! Owns every live session: creation, lookup with transparent eviction
//! of dead entries, visible-session bookkeeping, and teardown. At most
//! one live session exists per worktree path at any time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use anyhow::{anyhow, Result};
use tracing::debug;

use super::inactivity::InactivitySettings;
use super::reader::{join_bounded, spawn_reader, SessionShared};
use super::types::{NotificationSink, RenderSink, SessionInfo};
use crate::config::EngineConfig;
use crate::error::LaunchError;
use crate::pty::{ProcessHandle, ProcessStatus, Spawn};

/// How long teardown waits for a reader loop before detaching it.
const TEARDOWN_TIMEOUT: Duration = Duration::from_millis(1000);

/// A live session: the process handle, its reader loop, and the state
/// shared with it.
pub struct ManagedSession {
    path: PathBuf,
    command: String,
    started: SystemTime,
    handle: Box<dyn ProcessHandle>,
    shared: Arc<SessionShared>,
    reader: Option<JoinHandle<()>>,
}

impl ManagedSession {
    fn spawn(
        spawner: &dyn Spawn,
        path: &Path,
        command: &str,
        rows: u16,
        cols: u16,
        sink: Arc<dyn RenderSink>,
    ) -> Result<Self, LaunchError> {
        let launched = spawner.spawn(command, path, rows, cols)?;
        let shared = Arc::new(SessionShared::new());
        let reader = spawn_reader(
            path.to_path_buf(),
            launched.output,
            Arc::clone(&shared),
            sink,
        );
        Ok(Self {
            path: path.to_path_buf(),
            command: command.to_string(),
            started: SystemTime::now(),
            handle: launched.handle,
            shared,
            reader: Some(reader),
        })
    }

    /// Non-blocking liveness check: the reader has not seen EOF and the
    /// process probe still reports running.
    fn is_alive(&mut self) -> bool {
        !self.shared.exited.load(Ordering::SeqCst)
            && self.handle.poll() == ProcessStatus::Running
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        // Stamp before writing so the detector sees the submission even
        // if the write itself fails.
        self.shared
            .tracker
            .lock()
            .expect("tracker lock poisoned")
            .note_input(data, Instant::now());
        self.handle.write(data)
    }

    fn info(&mut self) -> SessionInfo {
        SessionInfo {
            path: self.path.clone(),
            command: self.command.clone(),
            started: self.started,
            is_alive: self.is_alive(),
        }
    }

    /// Graceful teardown: signal the process, stop the reader with a
    /// bounded wait, then drop the handle (closing the PTY descriptor
    /// exactly once, since the session has left the registry by now).
    fn shutdown(&mut self) {
        self.handle.terminate();
        self.shared.stop.store(true, Ordering::SeqCst);
        if let Some(reader) = self.reader.take() {
            join_bounded(reader, TEARDOWN_TIMEOUT);
        }
    }
}

/// Map from worktree path to live session, with the idle-check ticker.
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<PathBuf, ManagedSession>>>,
    visible: Mutex<Option<PathBuf>>,
    spawner: Arc<dyn Spawn>,
    render: Arc<dyn RenderSink>,
    settings: InactivitySettings,
    rows: u16,
    cols: u16,
    ticker_stop: Arc<AtomicBool>,
    ticker: Option<JoinHandle<()>>,
}

impl SessionRegistry {
    /// Create a registry and start its idle-check ticker.
    pub fn new(
        spawner: Arc<dyn Spawn>,
        render: Arc<dyn RenderSink>,
        notify: Arc<dyn NotificationSink>,
        config: &EngineConfig,
    ) -> Self {
        let sessions: Arc<Mutex<HashMap<PathBuf, ManagedSession>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let ticker_stop = Arc::new(AtomicBool::new(false));
        let ticker = spawn_ticker(
            Arc::clone(&sessions),
            notify,
            config.inactivity(),
            config.tick_interval(),
            Arc::clone(&ticker_stop),
        );
        Self {
            sessions,
            visible: Mutex::new(None),
            spawner,
            render,
            settings: config.inactivity(),
            rows: config.rows,
            cols: config.cols,
            ticker_stop,
            ticker: Some(ticker),
        }
    }

    /// Canonical key for a worktree path.
    fn key_for(&self, path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
    }

    /// Return the live session for `path`, launching one if needed.
    ///
    /// The map lock is held across the launch, so two concurrent calls
    /// for the same path cannot race into two live processes.
    pub fn get_or_create(
        &self,
        path: &Path,
        command: &str,
    ) -> Result<(SessionInfo, bool), LaunchError> {
        let key = path
            .canonicalize()
            .map_err(|_| LaunchError::WorkingDirMissing(path.to_path_buf()))?;
        let mut sessions = self.sessions.lock().expect("session map lock poisoned");

        if let Some(existing) = sessions.get_mut(&key) {
            if existing.is_alive() {
                return Ok((existing.info(), false));
            }
            debug!(path = %key.display(), "evicting dead session before relaunch");
            if let Some(mut dead) = sessions.remove(&key) {
                dead.shutdown();
            }
        }

        let mut session = ManagedSession::spawn(
            self.spawner.as_ref(),
            &key,
            command,
            self.rows,
            self.cols,
            Arc::clone(&self.render),
        )?;
        let info = session.info();
        sessions.insert(key, session);
        Ok((info, true))
    }

    /// Look up a live session; a dead one is evicted and reported absent
    /// rather than returned.
    pub fn get(&self, path: &Path) -> Option<SessionInfo> {
        let key = self.key_for(path);
        let dead = {
            let mut sessions = self.sessions.lock().expect("session map lock poisoned");
            let session = sessions.get_mut(&key)?;
            if session.is_alive() {
                return Some(session.info());
            }
            sessions.remove(&key)
        };
        if let Some(mut session) = dead {
            debug!(path = %key.display(), "evicting dead session");
            session.shutdown();
        }
        self.clear_visible_if(&key);
        None
    }

    /// Forward keyboard input to the session's PTY, stamping the
    /// inactivity tracker on the way.
    pub fn write_input(&self, path: &Path, data: &[u8]) -> Result<()> {
        let key = self.key_for(path);
        let mut sessions = self.sessions.lock().expect("session map lock poisoned");
        let session = sessions
            .get_mut(&key)
            .ok_or_else(|| anyhow!("No active session for {}", key.display()))?;
        session.write(data)
    }

    /// Propagate a new window size to the session's PTY.
    pub fn resize(&self, path: &Path, rows: u16, cols: u16) -> Result<()> {
        let key = self.key_for(path);
        let mut sessions = self.sessions.lock().expect("session map lock poisoned");
        let session = sessions
            .get_mut(&key)
            .ok_or_else(|| anyhow!("No active session for {}", key.display()))?;
        session.handle.resize(rows, cols)
    }

    /// Terminate and forget the session for `path`. Removing an absent
    /// path is a no-op.
    pub fn remove(&self, path: &Path) {
        let key = self.key_for(path);
        let session = self
            .sessions
            .lock()
            .expect("session map lock poisoned")
            .remove(&key);
        if let Some(mut session) = session {
            session.shutdown();
        }
        self.clear_visible_if(&key);
    }

    /// Remove every session; used at application shutdown. Best-effort:
    /// individual teardown problems are logged, not propagated.
    pub fn remove_all(&self) {
        let drained: Vec<(PathBuf, ManagedSession)> = {
            let mut sessions = self.sessions.lock().expect("session map lock poisoned");
            sessions.drain().collect()
        };
        for (path, mut session) in drained {
            debug!(path = %path.display(), "tearing down session");
            session.shutdown();
        }
        *self.visible.lock().expect("visible lock poisoned") = None;
    }

    /// Record which session's render sink is attached, returning the
    /// session (if any) so the caller can do the attach. Rendering
    /// itself is entirely the sink's concern.
    pub fn switch_visible(&self, path: &Path) -> Option<SessionInfo> {
        let info = self.get(path);
        *self.visible.lock().expect("visible lock poisoned") =
            info.as_ref().map(|i| i.path.clone());
        info
    }

    pub fn visible(&self) -> Option<PathBuf> {
        self.visible.lock().expect("visible lock poisoned").clone()
    }

    /// Paths of all registered sessions, live or not yet evicted.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.sessions
            .lock()
            .expect("session map lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    fn clear_visible_if(&self, key: &Path) {
        let mut visible = self.visible.lock().expect("visible lock poisoned");
        if visible.as_deref() == Some(key) {
            *visible = None;
        }
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.ticker_stop.store(true, Ordering::SeqCst);
        if let Some(ticker) = self.ticker.take() {
            let _ = ticker.join();
        }
        self.remove_all();
    }
}

/// Process-wide idle tick: iterate all sessions, fire notifications for
/// the ones whose tracker says the quiet period has elapsed.
fn spawn_ticker(
    sessions: Arc<Mutex<HashMap<PathBuf, ManagedSession>>>,
    notify: Arc<dyn NotificationSink>,
    settings: InactivitySettings,
    interval: Duration,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let nap = interval.min(Duration::from_millis(50));
        let mut last_tick = Instant::now();
        loop {
            if stop.load(Ordering::SeqCst) {
                break;
            }
            thread::sleep(nap);
            if last_tick.elapsed() < interval {
                continue;
            }
            last_tick = Instant::now();

            let now = Instant::now();
            let fired: Vec<PathBuf> = {
                let sessions = sessions.lock().expect("session map lock poisoned");
                sessions
                    .iter()
                    .filter(|(_, session)| {
                        session
                            .shared
                            .tracker
                            .lock()
                            .expect("tracker lock poisoned")
                            .check(now, &settings)
                    })
                    .map(|(path, _)| path.clone())
                    .collect()
            };
            // Notify outside the map lock; sinks may do arbitrary work.
            for path in fired {
                debug!(path = %path.display(), "session went idle");
                notify.session_idle(&path);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use crate::ansi::RenderOp;
    use crate::pty::{BridgeController, EmbeddedBridge, Launched};

    /// Spawner that hands out bridge-backed processes and keeps their
    /// controllers for the test to drive.
    #[derive(Default)]
    struct BridgeSpawner {
        controllers: Mutex<Vec<BridgeController>>,
        spawn_count: AtomicUsize,
        fail: bool,
    }

    impl BridgeSpawner {
        fn controller(&self, idx: usize) -> BridgeController {
            self.controllers.lock().unwrap()[idx].clone()
        }

        fn spawns(&self) -> usize {
            self.spawn_count.load(Ordering::SeqCst)
        }
    }

    impl Spawn for BridgeSpawner {
        fn spawn(
            &self,
            _command: &str,
            _working_dir: &Path,
            _rows: u16,
            _cols: u16,
        ) -> Result<Launched, LaunchError> {
            if self.fail {
                return Err(LaunchError::Spawn("spawn refused".to_string()));
            }
            self.spawn_count.fetch_add(1, Ordering::SeqCst);
            let (launched, controller) = EmbeddedBridge::create();
            self.controllers.lock().unwrap().push(controller);
            Ok(launched)
        }
    }

    #[derive(Default)]
    struct CaptureSink {
        ops: Mutex<Vec<RenderOp>>,
        ended: Mutex<Vec<PathBuf>>,
        idle: Mutex<Vec<PathBuf>>,
    }

    impl RenderSink for CaptureSink {
        fn apply(&self, _path: &Path, ops: &[RenderOp]) {
            self.ops.lock().unwrap().extend_from_slice(ops);
        }

        fn session_ended(&self, path: &Path) {
            self.ended.lock().unwrap().push(path.to_path_buf());
        }
    }

    impl NotificationSink for CaptureSink {
        fn session_idle(&self, path: &Path) {
            self.idle.lock().unwrap().push(path.to_path_buf());
        }
    }

    struct Fixture {
        registry: SessionRegistry,
        spawner: Arc<BridgeSpawner>,
        sink: Arc<CaptureSink>,
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new(config: &EngineConfig) -> Self {
            Self::with_spawner(config, BridgeSpawner::default())
        }

        fn with_spawner(config: &EngineConfig, spawner: BridgeSpawner) -> Self {
            let spawner = Arc::new(spawner);
            let sink = Arc::new(CaptureSink::default());
            let registry = SessionRegistry::new(
                Arc::clone(&spawner) as Arc<dyn Spawn>,
                Arc::clone(&sink) as Arc<dyn RenderSink>,
                Arc::clone(&sink) as Arc<dyn NotificationSink>,
                config,
            );
            Self {
                registry,
                spawner,
                sink,
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn worktree(&self) -> PathBuf {
            self.dir.path().to_path_buf()
        }
    }

    fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        done()
    }

    #[test]
    fn test_get_or_create_reuses_live_session() {
        let fx = Fixture::new(&EngineConfig::default());
        let wt = fx.worktree();

        let (info, created) = fx.registry.get_or_create(&wt, "claude").unwrap();
        assert!(created);
        assert!(info.is_alive);
        assert_eq!(info.command, "claude");

        let (_, created) = fx.registry.get_or_create(&wt, "claude").unwrap();
        assert!(!created);
        assert_eq!(fx.spawner.spawns(), 1);
    }

    #[test]
    fn test_get_or_create_rejects_missing_directory() {
        let fx = Fixture::new(&EngineConfig::default());
        let missing = fx.worktree().join("does-not-exist");
        let err = fx.registry.get_or_create(&missing, "claude").unwrap_err();
        assert!(matches!(err, LaunchError::WorkingDirMissing(_)));
        assert!(fx.registry.paths().is_empty());
    }

    #[test]
    fn test_failed_launch_registers_nothing() {
        let spawner = BridgeSpawner {
            fail: true,
            ..BridgeSpawner::default()
        };
        let fx = Fixture::with_spawner(&EngineConfig::default(), spawner);
        let wt = fx.worktree();

        assert!(fx.registry.get_or_create(&wt, "claude").is_err());
        assert!(fx.registry.paths().is_empty());
        assert!(fx.registry.get(&wt).is_none());
    }

    #[test]
    fn test_concurrent_get_or_create_launches_exactly_once() {
        let fx = Arc::new(Fixture::new(&EngineConfig::default()));
        let wt = fx.worktree();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let fx = Arc::clone(&fx);
            let wt = wt.clone();
            handles.push(thread::spawn(move || {
                fx.registry.get_or_create(&wt, "claude").unwrap().1
            }));
        }
        let created: usize = handles
            .into_iter()
            .map(|h| usize::from(h.join().unwrap()))
            .sum();
        assert_eq!(created, 1);
        assert_eq!(fx.spawner.spawns(), 1);
    }

    #[test]
    fn test_get_evicts_dead_session() {
        let fx = Fixture::new(&EngineConfig::default());
        let wt = fx.worktree();

        fx.registry.get_or_create(&wt, "claude").unwrap();
        assert!(fx.registry.get(&wt).is_some());

        fx.spawner.controller(0).finish();
        assert!(fx.registry.get(&wt).is_none());
        assert!(fx.registry.paths().is_empty());

        // A fresh launch can take the path over afterwards.
        let (_, created) = fx.registry.get_or_create(&wt, "claude").unwrap();
        assert!(created);
        assert_eq!(fx.spawner.spawns(), 2);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let fx = Fixture::new(&EngineConfig::default());
        let wt = fx.worktree();

        fx.registry.get_or_create(&wt, "claude").unwrap();
        fx.registry.remove(&wt);
        assert!(!fx.spawner.controller(0).is_running());
        assert!(fx.registry.get(&wt).is_none());

        // Second removal of the same (now absent) path is a no-op.
        fx.registry.remove(&wt);
        fx.registry.remove(Path::new("/never/registered"));
    }

    #[test]
    fn test_output_reaches_render_sink_in_order() {
        let fx = Fixture::new(&EngineConfig::default());
        let wt = fx.worktree();
        fx.registry.get_or_create(&wt, "claude").unwrap();

        let controller = fx.spawner.controller(0);
        controller.emit_output(b"hello ");
        controller.emit_output(b"world");

        assert!(wait_until(Duration::from_secs(2), || {
            let ops = fx.sink.ops.lock().unwrap();
            ops.len() == 2
        }));
        let ops = fx.sink.ops.lock().unwrap();
        assert_eq!(
            *ops,
            vec![
                RenderOp::InsertStyledText("hello ".to_string(), Default::default()),
                RenderOp::InsertStyledText("world".to_string(), Default::default()),
            ]
        );
    }

    #[test]
    fn test_session_ended_notice_on_eof() {
        let fx = Fixture::new(&EngineConfig::default());
        let wt = fx.worktree();
        fx.registry.get_or_create(&wt, "claude").unwrap();

        fx.spawner.controller(0).finish();
        assert!(wait_until(Duration::from_secs(2), || {
            !fx.sink.ended.lock().unwrap().is_empty()
        }));
        let key = wt.canonicalize().unwrap();
        assert_eq!(fx.sink.ended.lock().unwrap()[0], key);
    }

    #[test]
    fn test_write_input_reaches_process() {
        let fx = Fixture::new(&EngineConfig::default());
        let wt = fx.worktree();
        fx.registry.get_or_create(&wt, "claude").unwrap();

        fx.registry.write_input(&wt, b"ls\r").unwrap();
        assert_eq!(fx.spawner.controller(0).written(), b"ls\r");

        fx.registry.remove(&wt);
        assert!(fx.registry.write_input(&wt, b"x").is_err());
    }

    #[test]
    fn test_resize_forwarded_to_handle() {
        let fx = Fixture::new(&EngineConfig::default());
        let wt = fx.worktree();
        fx.registry.get_or_create(&wt, "claude").unwrap();

        fx.registry.resize(&wt, 48, 160).unwrap();
        assert_eq!(fx.spawner.controller(0).last_resize(), Some((48, 160)));
    }

    #[test]
    fn test_switch_visible_tracks_live_sessions() {
        let fx = Fixture::new(&EngineConfig::default());
        let wt = fx.worktree();
        let key = wt.canonicalize().unwrap();

        assert!(fx.registry.switch_visible(&wt).is_none());
        assert_eq!(fx.registry.visible(), None);

        fx.registry.get_or_create(&wt, "claude").unwrap();
        assert!(fx.registry.switch_visible(&wt).is_some());
        assert_eq!(fx.registry.visible(), Some(key));

        fx.registry.remove(&wt);
        assert_eq!(fx.registry.visible(), None);
    }

    #[test]
    fn test_remove_all_best_effort() {
        let fx = Fixture::new(&EngineConfig::default());
        let wt_a = fx.dir.path().join("a");
        let wt_b = fx.dir.path().join("b");
        std::fs::create_dir(&wt_a).unwrap();
        std::fs::create_dir(&wt_b).unwrap();

        fx.registry.get_or_create(&wt_a, "claude").unwrap();
        fx.registry.get_or_create(&wt_b, "claude").unwrap();
        // One session has already exited on its own.
        fx.spawner.controller(0).finish();

        fx.registry.remove_all();
        assert!(fx.registry.paths().is_empty());
        assert!(!fx.spawner.controller(1).is_running());
    }

    #[test]
    fn test_idle_notification_fires_once_per_submission() {
        let config = EngineConfig {
            idle_threshold_secs: 0.05,
            input_grace_secs: 0.05,
            tick_interval_secs: 0.01,
            ..EngineConfig::default()
        };
        let fx = Fixture::new(&config);
        let wt = fx.worktree();
        let key = wt.canonicalize().unwrap();

        fx.registry.get_or_create(&wt, "claude").unwrap();
        fx.registry.write_input(&wt, b"run tests\r").unwrap();
        fx.spawner.controller(0).emit_output(b"running...\n");

        assert!(wait_until(Duration::from_secs(2), || {
            !fx.sink.idle.lock().unwrap().is_empty()
        }));
        assert_eq!(*fx.sink.idle.lock().unwrap(), vec![key.clone()]);

        // No repeat without a new submission, even as time passes.
        thread::sleep(Duration::from_millis(200));
        assert_eq!(fx.sink.idle.lock().unwrap().len(), 1);

        // A new Enter re-arms the detector.
        fx.registry.write_input(&wt, b"again\r").unwrap();
        fx.spawner.controller(0).emit_output(b"more output\n");
        assert!(wait_until(Duration::from_secs(2), || {
            fx.sink.idle.lock().unwrap().len() == 2
        }));
    }

    #[test]
    fn test_idle_deferred_while_user_keeps_typing() {
        let config = EngineConfig {
            idle_threshold_secs: 0.08,
            input_grace_secs: 0.08,
            tick_interval_secs: 0.01,
            ..EngineConfig::default()
        };
        let fx = Fixture::new(&config);
        let wt = fx.worktree();

        fx.registry.get_or_create(&wt, "claude").unwrap();
        fx.registry.write_input(&wt, b"\r").unwrap();
        fx.spawner.controller(0).emit_output(b"output\n");

        // Keystrokes (no Enter) arriving faster than the grace window.
        for _ in 0..10 {
            thread::sleep(Duration::from_millis(30));
            fx.registry.write_input(&wt, b"x").unwrap();
            assert!(fx.sink.idle.lock().unwrap().is_empty());
        }

        // Once typing stops, the notification arrives.
        assert!(wait_until(Duration::from_secs(2), || {
            !fx.sink.idle.lock().unwrap().is_empty()
        }));
    }
}
