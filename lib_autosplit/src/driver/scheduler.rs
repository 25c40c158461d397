//! # Poll Scheduler
//!
//! A self-scheduling loop that polls the device and turns matching splits into
//! `on_start` / `on_split` calls on the host.
//!
//! ## Key Design Principles:
//! - **Skip, Don't Queue**: a tick starts with `try_lock` on the engine state.
//!   If the previous tick still holds it (a slow reply), the new tick is
//!   dropped. Holding the lock for the whole tick also means two ticks never
//!   interleave at a network await.
//! - **Adaptive Interval**: the tick decides the next delay. Not attached or no
//!   usable configuration means the idle interval; otherwise the active one.
//! - **Degrade, Never Die**: a failed read drops the connection and the next
//!   tick reconnects. A failed configuration load leaves the game unloaded and
//!   tells the user once. A panicking tick is logged and forces a reconnect.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};

use crate::configs::game_config::{GameConfigStore, LoadedGame, ReloadStatus};
use crate::driver::connection::ConnectionStateMachine;
use crate::driver::host::{RunPhase, TimerHost};
use crate::error::AutosplitError;
use crate::splits::arena::{RunnableList, SplitId, SplitNode};
use crate::splits::eval::Evaluator;

#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    /// Delay while not attached or without a usable configuration.
    pub idle_interval: Duration,
    /// Delay while polling an attached device.
    pub active_interval: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_millis(1000),
            active_interval: Duration::from_millis(33),
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The previous tick was still running.
    Skipped,
    NotAttached,
    NoConfig,
    /// Attached and configured but nothing to evaluate in this run phase.
    Idle,
    /// The entry was evaluated and did not (yet) match.
    Evaluated,
    Started,
    Split,
    /// A read failed; the connection was dropped.
    Disconnected,
}

enum Entry {
    Autostart(SplitId),
    Split(SplitId),
}

struct CachedRunnable {
    generation: u64,
    revision: u64,
    category: Option<String>,
    list: RunnableList,
}

/// Everything a tick mutates, behind one lock.
struct EngineState {
    store: GameConfigStore,
    evaluator: Evaluator,
    runnable: Option<CachedRunnable>,
}

pub struct PollScheduler {
    host: Arc<dyn TimerHost>,
    connection: Arc<ConnectionStateMachine>,
    settings: SchedulerSettings,
    state: Mutex<EngineState>,
    interval_ms: AtomicU64,
}

impl PollScheduler {
    pub fn new(
        host: Arc<dyn TimerHost>,
        connection: Arc<ConnectionStateMachine>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            host,
            connection,
            settings,
            state: Mutex::new(EngineState {
                store: GameConfigStore::new(),
                evaluator: Evaluator::new(),
                runnable: None,
            }),
            interval_ms: AtomicU64::new(settings.idle_interval.as_millis() as u64),
        }
    }

    pub fn connection(&self) -> &Arc<ConnectionStateMachine> {
        &self.connection
    }

    /// Delay before the next tick.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::Relaxed))
    }

    fn set_interval(&self, interval: Duration) {
        self.interval_ms
            .store(interval.as_millis() as u64, Ordering::Relaxed);
    }

    /// Timer loop: sleep the current interval, fire a tick, repeat until
    /// `shutdown` fires. Disconnects on the way out.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        log::info!("Poll scheduler started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(self.interval()) => {}
            }
            let scheduler = self.clone();
            tokio::spawn(scheduler.guarded_tick());
        }
        self.connection.disconnect().await;
        log::info!("Poll scheduler stopped");
    }

    /// Runs one tick in its own task so a panic is contained.
    async fn guarded_tick(self: Arc<Self>) {
        let inner = self.clone();
        if let Err(e) = tokio::spawn(async move { inner.tick().await }).await {
            log::error!("Tick aborted: {}", e);
            self.connection.disconnect().await;
            self.set_interval(self.settings.idle_interval);
        }
    }

    /// One poll. Never waits for a previous tick.
    pub async fn tick(&self) -> TickOutcome {
        let Ok(mut state) = self.state.try_lock() else {
            log::trace!("Previous tick still running, skipping");
            return TickOutcome::Skipped;
        };

        match self.tick_locked(&mut state).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Tick failed: {}", e);
                self.connection.disconnect().await;
                self.set_interval(self.settings.idle_interval);
                TickOutcome::Disconnected
            }
        }
    }

    async fn tick_locked(&self, state: &mut EngineState) -> Result<TickOutcome, AutosplitError> {
        if !self
            .connection
            .ensure_attached(&self.host.device_name())
            .await
        {
            self.set_interval(self.settings.idle_interval);
            return Ok(TickOutcome::NotAttached);
        }

        self.refresh_config(state);
        let Some(loaded) = state.store.current() else {
            self.set_interval(self.settings.idle_interval);
            return Ok(TickOutcome::NoConfig);
        };
        self.set_interval(self.settings.active_interval);

        state
            .evaluator
            .set_debug(self.host.debug_enabled() || loaded.game.settings.debug);
        state.evaluator.sync_generation(loaded.generation);

        let entry = match (self.host.current_run_phase(), loaded.game.autostart) {
            (RunPhase::NotRunning, Some(autostart)) if self.host.autostart_enabled() => {
                Entry::Autostart(autostart)
            }
            (RunPhase::Running, _) => {
                let index = self.host.current_split_index();
                match self.runnable(state, &loaded).get(index) {
                    Some(id) => Entry::Split(id),
                    None => return Ok(TickOutcome::Idle),
                }
            }
            _ => return Ok(TickOutcome::Idle),
        };

        let id = match entry {
            Entry::Autostart(id) | Entry::Split(id) => id,
        };
        let client = self.connection.client().clone();
        match state
            .evaluator
            .evaluate_step(client.as_ref(), &loaded.game.arena, id)
            .await
        {
            Ok(true) => match entry {
                Entry::Autostart(_) => {
                    log::info!("Autostart '{}' matched", loaded.game.arena.get(id).name);
                    self.host.on_start();
                    Ok(TickOutcome::Started)
                }
                Entry::Split(_) => {
                    log::info!("Split '{}' matched", loaded.game.arena.path(id));
                    self.host.on_split();
                    Ok(TickOutcome::Split)
                }
            },
            Ok(false) => Ok(TickOutcome::Evaluated),
            Err(e) if e.is_connection_level() => {
                log::warn!("{}; dropping the connection", e);
                self.connection.disconnect().await;
                self.set_interval(self.settings.idle_interval);
                Ok(TickOutcome::Disconnected)
            }
            Err(e) => Err(e),
        }
    }

    /// Reloads when the path changed or the host asked for it.
    fn refresh_config(&self, state: &mut EngineState) {
        let requested = self.host.config_reload_requested();
        let Some(path) = self.host.config_path() else {
            if state.store.current().is_some() {
                log::info!("Game configuration cleared");
                state.store.unload();
            }
            return;
        };

        let path_changed = state.store.path() != Some(path.as_path());
        if !path_changed && !requested {
            return;
        }

        match state.store.reload(&path) {
            Ok(ReloadStatus::Loaded { .. }) => {
                state.runnable = None;
                if let Some(loaded) = state.store.current() {
                    self.runnable(state, &loaded);
                }
            }
            Ok(ReloadStatus::Unchanged) => {}
            Err(e) => {
                log::error!("Game configuration {} rejected: {}", path.display(), e);
                self.host.show_message(&format!(
                    "The game configuration {} could not be loaded: {}",
                    path.display(),
                    e
                ));
            }
        }
    }

    /// Runnable list for the loaded game, rebuilt when the game, the toggles
    /// or the run category change.
    fn runnable(&self, state: &mut EngineState, loaded: &LoadedGame) -> RunnableList {
        let revision = self.host.toggles_revision();
        let category = self.host.category_name();
        if let Some(cached) = &state.runnable {
            if cached.generation == loaded.generation
                && cached.revision == revision
                && cached.category == category
            {
                return cached.list.clone();
            }
        }

        let host = self.host.clone();
        let enabled = move |node: &SplitNode| host.split_enabled(&node.name);
        let list = loaded.game.runnable(category.as_deref(), &enabled);

        log::info!("{} splits detected:", list.len());
        for id in list.iter() {
            log::info!("- {}", loaded.game.arena.path(id));
        }
        if let Some(segments) = self.host.segment_count() {
            if segments != list.len() {
                log::warn!(
                    "The segment count <{}> does not match the game configuration <{}>",
                    segments,
                    list.len()
                );
            }
        }

        state.runnable = Some(CachedRunnable {
            generation: loaded.generation,
            revision,
            category,
            list: list.clone(),
        });
        list
    }

    /// The host reset its run: abandon partial progress and, when enabled,
    /// reset the console.
    pub async fn handle_run_reset(&self) {
        let game_wants_reset = {
            let mut state = self.state.lock().await;
            state.evaluator.reset_progress();
            state
                .store
                .current()
                .is_some_and(|loaded| loaded.game.settings.reset_hardware)
        };

        if !(self.host.reset_hardware_enabled() || game_wants_reset) {
            return;
        }
        let client = self.connection.client();
        if !client.connected() {
            log::debug!("Run reset while disconnected, console left alone");
            return;
        }
        match client.reset().await {
            Ok(()) => log::info!("Console reset sent"),
            Err(e) => log::warn!("Console reset failed: {}", e),
        }
    }
}
