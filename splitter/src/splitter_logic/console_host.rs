//! A terminal stand-in for a timer application: keeps a minimal run model,
//! prints start/split events and takes commands from stdin.

use colored::*;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, watch};

use lib_autosplit::driver::{Mood, PollScheduler, RunPhase, TimerHost};

use super::config::Config;

#[derive(Debug, Default)]
struct RunState {
    phase: RunPhase,
    index: usize,
    started: Option<Instant>,
}

pub struct ConsoleHost {
    device: String,
    game_config: Option<PathBuf>,
    category: Option<String>,
    segments: Option<usize>,
    autostart: bool,
    debug: bool,
    reset_hardware: bool,
    reload: AtomicBool,
    run: Mutex<RunState>,
}

impl ConsoleHost {
    pub fn new(config: &Config) -> Self {
        Self {
            device: config.device.clone().unwrap_or_default(),
            game_config: config.game_config.clone(),
            category: config.category.clone(),
            segments: config.segments,
            autostart: config.autostart.unwrap_or(false),
            debug: config.debug.unwrap_or(false),
            reset_hardware: config.reset_hardware.unwrap_or(false),
            reload: AtomicBool::new(false),
            run: Mutex::new(RunState::default()),
        }
    }

    pub fn request_reload(&self) {
        self.reload.store(true, Ordering::SeqCst);
    }

    /// Starts a run by hand.
    pub fn start_run(&self) {
        let Ok(mut run) = self.run.lock() else { return };
        if run.phase == RunPhase::Running {
            return;
        }
        run.phase = RunPhase::Running;
        run.index = 0;
        run.started = Some(Instant::now());
        println!("{}", "Run started".bright_green());
    }

    /// Advances the run; past the last known segment the run ends.
    pub fn split_run(&self) {
        let Ok(mut run) = self.run.lock() else { return };
        if run.phase != RunPhase::Running {
            return;
        }
        let elapsed = run
            .started
            .map(|t| format!("{:.2}s", t.elapsed().as_secs_f64()))
            .unwrap_or_default();
        run.index += 1;
        println!("{} {} {}", "Split".bright_cyan(), run.index, elapsed.truecolor(128, 128, 128));
        if self.segments.is_some_and(|segments| run.index >= segments) {
            run.phase = RunPhase::Ended;
            println!("{} {}", "Run finished in".bright_green(), elapsed);
        }
    }

    pub fn reset_run(&self) {
        if let Ok(mut run) = self.run.lock() {
            *run = RunState::default();
        }
        println!("{}", "Run reset".bright_yellow());
    }
}

impl TimerHost for ConsoleHost {
    fn on_start(&self) {
        self.start_run();
    }

    fn on_split(&self) {
        self.split_run();
    }

    fn device_name(&self) -> String {
        self.device.clone()
    }

    fn config_path(&self) -> Option<PathBuf> {
        self.game_config.clone()
    }

    fn config_reload_requested(&self) -> bool {
        self.reload.swap(false, Ordering::SeqCst)
    }

    fn current_run_phase(&self) -> RunPhase {
        self.run.lock().map(|run| run.phase).unwrap_or_default()
    }

    fn current_split_index(&self) -> usize {
        self.run.lock().map(|run| run.index).unwrap_or_default()
    }

    fn autostart_enabled(&self) -> bool {
        self.autostart
    }

    fn debug_enabled(&self) -> bool {
        self.debug
    }

    fn reset_hardware_enabled(&self) -> bool {
        self.reset_hardware
    }

    fn category_name(&self) -> Option<String> {
        self.category.clone()
    }

    fn segment_count(&self) -> Option<usize> {
        self.segments
    }

    fn show_message(&self, message: &str) {
        eprintln!("{}", message.bright_white().on_bright_red());
    }
}

/// Reads `start`, `split`, `reset`, `reload` and `quit` from stdin.
pub async fn read_commands(
    host: Arc<ConsoleHost>,
    scheduler: Arc<PollScheduler>,
    shutdown_tx: broadcast::Sender<()>,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shutdown = shutdown_tx.subscribe();

    loop {
        let line = tokio::select! {
            _ = shutdown.recv() => break,
            line = lines.next_line() => line,
        };
        let command = match line {
            Ok(Some(command)) => command,
            // stdin closed: keep running until a signal arrives.
            Ok(None) => break,
            Err(e) => {
                log::warn!("Could not read stdin: {}", e);
                break;
            }
        };

        match command.trim().to_lowercase().as_str() {
            "" => {}
            "start" => host.start_run(),
            "split" => host.split_run(),
            "reset" => {
                host.reset_run();
                scheduler.handle_run_reset().await;
            }
            "reload" => {
                host.request_reload();
                log::info!("Game configuration reload requested");
            }
            "quit" | "exit" => {
                let _ = shutdown_tx.send(());
                break;
            }
            other => println!("Unknown command '{}' (start, split, reset, reload, quit)", other),
        }
    }
}

/// Logs every mood change, standing in for a status indicator.
pub async fn report_mood(mut moods: watch::Receiver<Mood>, mut shutdown: broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            changed = moods.changed() => {
                if changed.is_err() {
                    break;
                }
                let mood = *moods.borrow_and_update();
                let label = match mood {
                    Mood::Ready => "READY".bright_green(),
                    Mood::Connecting => "CONNECTING".bright_yellow(),
                    Mood::Error => "ERROR".bright_red(),
                    Mood::None => "DISCONNECTED".truecolor(128, 128, 128),
                };
                log::info!("Status: {}", label);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(segments: Option<usize>) -> ConsoleHost {
        ConsoleHost::new(&Config {
            segments,
            autostart: Some(true),
            ..Default::default()
        })
    }

    #[test]
    fn test_run_model() {
        let host = host(Some(2));
        assert_eq!(host.current_run_phase(), RunPhase::NotRunning);

        host.on_start();
        assert_eq!(host.current_run_phase(), RunPhase::Running);
        assert_eq!(host.current_split_index(), 0);

        host.on_split();
        assert_eq!(host.current_split_index(), 1);
        host.on_split();
        assert_eq!(host.current_run_phase(), RunPhase::Ended);

        // Ignored once the run has ended.
        host.on_split();
        assert_eq!(host.current_split_index(), 2);

        host.reset_run();
        assert_eq!(host.current_run_phase(), RunPhase::NotRunning);
        assert_eq!(host.current_split_index(), 0);
    }

    #[test]
    fn test_reload_flag_is_consumed() {
        let host = host(None);
        assert!(!host.config_reload_requested());
        host.request_reload();
        assert!(host.config_reload_requested());
        assert!(!host.config_reload_requested());
    }
}
