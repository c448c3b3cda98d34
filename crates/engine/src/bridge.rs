use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;

use tracing::{debug, warn};

use crate::api::{Command, Engine, EngineErrorEvent, Event};
use crate::media::MediaBackend;

const COMMAND_CHANNEL_CAPACITY: usize = 32;
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Sender used by the UI thread to dispatch commands to the engine thread.
pub type EngineCommandSender = mpsc::SyncSender<Command>;

/// Receiver used by the UI thread to read events emitted by the engine thread.
pub type EngineEventReceiver = mpsc::Receiver<Event>;

/// Runs `engine` on its own thread.
///
/// Commands are applied in order. Failed commands become `Event::Error`.
/// While a batch runs, its progress is forwarded between commands at the
/// configured poll interval. Dropping the command sender cancels a running
/// batch and stops the thread once the batch has finished.
///
/// # Example
/// ```no_run
/// use std::path::PathBuf;
/// use splitter_engine::{Command, Engine, bridge::spawn_engine_bridge};
///
/// let (commands, events) = spawn_engine_bridge(Engine::with_ffmpeg());
/// commands
///     .send(Command::OpenVideo { path: PathBuf::from("movie.mp4") })
///     .expect("engine thread is alive");
/// let _first = events.recv();
/// ```
pub fn spawn_engine_bridge<M>(mut engine: Engine<M>) -> (EngineCommandSender, EngineEventReceiver)
where
    M: MediaBackend + 'static,
{
    let (command_tx, command_rx) = mpsc::sync_channel::<Command>(COMMAND_CHANNEL_CAPACITY);
    let (event_tx, event_rx) = mpsc::sync_channel::<Event>(EVENT_CHANNEL_CAPACITY);
    let poll_interval = engine.config().batch_poll_interval();

    thread::spawn(move || {
        let send_all = |events: Vec<Event>| events.into_iter().all(|event| event_tx.send(event).is_ok());

        loop {
            let command = if engine.has_active_batch() {
                command_rx.recv_timeout(poll_interval)
            } else {
                command_rx
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected)
            };

            let delivered = match command {
                Ok(command) => {
                    let events = match engine.handle_command(command) {
                        Ok(events) => events,
                        Err(error) => vec![Event::Error(EngineErrorEvent::from_error(&error))],
                    };
                    send_all(events)
                }
                Err(RecvTimeoutError::Timeout) => true,
                Err(RecvTimeoutError::Disconnected) => {
                    if engine.has_active_batch() {
                        debug!("command channel closed, cancelling batch");
                        if let Err(error) = engine.handle_command(Command::CancelBatch) {
                            warn!(%error, "batch cancel on shutdown failed");
                        }
                        if engine.has_active_batch() {
                            match engine.wait_batch() {
                                Ok(events) => {
                                    debug!(dropped = events.len(), "batch drained on shutdown")
                                }
                                Err(error) => warn!(%error, "batch did not report on shutdown"),
                            }
                        }
                    }
                    return;
                }
            };
            if !delivered || !send_all(engine.poll_batch()) {
                return;
            }
        }
    });

    (command_tx, event_rx)
}
