//! Periodic background save.
//!
//! The worker takes the game lock only long enough to capture a
//! [`SaveSnapshot`] by value; encoding and writing happen after the lock is
//! released, so a command in flight is never observed half applied.

use crate::core::error::ShellError;
use crate::core::game::Game;
use crate::core::store::{self, KvStore, SaveSnapshot};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub struct Autosaver {
    stop_tx: Option<mpsc::Sender<()>>,
    worker: Option<JoinHandle<()>>,
    saves: Arc<AtomicU64>,
}

fn capture(game: &Mutex<Game>) -> Result<SaveSnapshot, ShellError> {
    let game = game
        .lock()
        .map_err(|_| ShellError::Persistence("game state lock poisoned".to_string()))?;
    game.snapshot()
}

impl Autosaver {
    pub fn spawn(
        game: Arc<Mutex<Game>>,
        store: Arc<dyn KvStore>,
        interval: Duration,
    ) -> Result<Self, ShellError> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let saves = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&saves);

        let worker = thread::Builder::new()
            .name("breachdb-autosave".to_string())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            let saved = capture(&game)
                                .and_then(|snapshot| store::save(store.as_ref(), &snapshot));
                            match saved {
                                Ok(()) => {
                                    counter.fetch_add(1, Ordering::SeqCst);
                                }
                                Err(e) => eprintln!("warning: autosave failed: {e}"),
                            }
                        }
                    }
                }
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            worker: Some(worker),
            saves,
        })
    }

    /// Completed saves so far.
    pub fn saves(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn stop(&mut self) -> Result<(), ShellError> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| ShellError::Persistence("autosave thread panicked".to_string()))?;
        }
        Ok(())
    }
}

impl Drop for Autosaver {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
