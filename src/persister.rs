// Background snapshot persister

use crate::store::Store;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

enum Command {
    Flush,
    Stop,
}

/// Handle to a thread that periodically saves a [`Store`] to disk
///
/// Each tick calls [`Store::save_to_file`], which is a no-op unless the store
/// is dirty. Stopping (explicitly or by drop) performs one final save.
pub struct Persister {
    tx: Sender<Command>,
    handle: Option<JoinHandle<()>>,
}

impl Persister {
    /// Start persisting `store` every `interval`
    pub fn spawn(store: Arc<Store>, interval: Duration) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("kanstore-persister".to_string())
            .spawn(move || {
                info!(interval_secs = interval.as_secs_f64(), file = ?store.path(), "Persister started");
                loop {
                    match rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) | Ok(Command::Flush) => tick(&store),
                        Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                tick(&store);
                info!("Persister stopped");
            })?;

        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    /// Ask the persister to save now instead of waiting for the next tick
    pub fn flush_now(&self) {
        let _ = self.tx.send(Command::Flush);
    }

    /// Stop the thread after a final save and wait for it to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.tx.send(Command::Stop);
        if handle.join().is_err() {
            error!("Persister thread panicked");
        }
    }
}

impl Drop for Persister {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// A failing tick must never end the loop
fn tick(store: &Store) {
    match panic::catch_unwind(AssertUnwindSafe(|| store.save_to_file())) {
        Ok(true) => debug!("Persister tick saved snapshot"),
        Ok(false) => {}
        Err(_) => error!("Panic while saving snapshot, continuing"),
    }
}
