use std::{
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};
use eyre::WrapErr;
use session::{Action, Session};

use crate::backend::DebuggerBackend;
use crate::commands::{Command, Delivery, Reply, Request, WorkerState};
use crate::config::BridgeConfig;
use crate::editor::EditorSurface;
use crate::error::BridgeError;
use crate::types::{BreakpointId, BufferId, Pane};
use crate::worker::Worker;

/// How long shutdown waits for room in the request queue
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Thread-safe handle to the debugger worker.
///
/// Requests never block the calling thread, except synchronous ones, which wait for their reply
/// up to a deadline.
pub struct Gateway {
    requests: Sender<Request>,
    replies: Receiver<Delivery>,
    next_seq: AtomicU64,
    stopped: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    state: Arc<Mutex<WorkerState>>,
    complete_timeout: Duration,
    modes_timeout: Duration,
}

impl Gateway {
    /// Start the worker thread, handing it the debugger and the editor surface
    #[tracing::instrument(skip(backend, editor, session))]
    pub fn spawn<B, E>(
        backend: B,
        editor: E,
        config: BridgeConfig,
        session: Session,
    ) -> eyre::Result<Self>
    where
        B: DebuggerBackend + 'static,
        E: EditorSurface + 'static,
    {
        let config = config.normalised();
        let (request_tx, request_rx) = crossbeam_channel::bounded(config.request_queue_capacity);
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        let state = Arc::new(Mutex::new(WorkerState::IdleWaiting));

        let complete_timeout = config.complete_timeout();
        let modes_timeout = config.modes_timeout();
        let worker_state = Arc::clone(&state);
        let worker_replies = (reply_tx, reply_rx.clone());
        let handle = thread::Builder::new()
            .name("debugger-worker".to_string())
            .spawn(move || {
                let worker = Worker::new(
                    Box::new(backend),
                    Box::new(editor),
                    config,
                    session,
                    request_rx,
                    worker_replies,
                    worker_state,
                );
                worker.run();
            })
            .wrap_err("spawning worker thread")?;

        Ok(Self {
            requests: request_tx,
            replies: reply_rx,
            next_seq: AtomicU64::new(1),
            stopped: AtomicBool::new(false),
            worker: Mutex::new(Some(handle)),
            state,
            complete_timeout,
            modes_timeout,
        })
    }

    /// Queue a command for the worker.
    ///
    /// With `sync`, wait for the reply, for at most `deadline` if given. A timed out request is
    /// not cancelled: it still runs, and its late reply is discarded.
    ///
    /// [`Command::Shutdown`] is handled by [`Gateway::shutdown`], which also joins the worker.
    #[tracing::instrument(skip(self, command), fields(command = command.name()))]
    pub fn submit(
        &self,
        command: Command,
        sync: bool,
        deadline: Option<Duration>,
    ) -> Result<Option<Reply>, BridgeError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(BridgeError::DeadWorker(
                "the worker has been shut down".to_string(),
            ));
        }
        if command == Command::Shutdown {
            self.shutdown()?;
            return Ok(sync.then_some(Reply::Done));
        }

        // a full reply slot holds a reply nobody waited for
        if self.replies.is_full() {
            if let Ok(stale) = self.replies.try_recv() {
                tracing::debug!(seq = stale.seq, "discarding stale reply");
            }
        }

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        match self.requests.try_send(Request { seq, command, sync }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::error!("request queue full, the worker is probably dead");
                return Err(BridgeError::DeadWorker(
                    "the request queue is full".to_string(),
                ));
            }
            Err(TrySendError::Disconnected(_)) => {
                return Err(BridgeError::DeadWorker(
                    "the worker thread has exited".to_string(),
                ));
            }
        }

        if !sync {
            return Ok(None);
        }
        self.wait_for(seq, deadline).map(Some)
    }

    fn wait_for(&self, seq: u64, deadline: Option<Duration>) -> Result<Reply, BridgeError> {
        let until = deadline.map(|d| Instant::now() + d);
        loop {
            let delivery = match until {
                Some(until) => self.replies.recv_deadline(until).map_err(|e| match e {
                    RecvTimeoutError::Timeout => BridgeError::EventLoopUnresponsive {
                        waited: deadline.unwrap_or_default(),
                    },
                    RecvTimeoutError::Disconnected => {
                        BridgeError::DeadWorker("the worker thread has exited".to_string())
                    }
                })?,
                None => self.replies.recv().map_err(|_| {
                    BridgeError::DeadWorker("the worker thread has exited".to_string())
                })?,
            };
            if delivery.seq == seq {
                return Ok(delivery.reply);
            }
            tracing::debug!(
                expected = seq,
                received = delivery.seq,
                "discarding reply to an earlier request"
            );
        }
    }

    fn send(&self, command: Command) -> Result<(), BridgeError> {
        self.submit(command, false, None).map(|_| ())
    }

    /// Run a debugger command given as tokens
    pub fn execute<I, S>(&self, tokens: I) -> Result<(), BridgeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.send(Command::Execute(tokens.into_iter().map(Into::into).collect()))
    }

    pub fn set_breakpoint(&self, path: impl Into<PathBuf>, line: u32) -> Result<(), BridgeError> {
        self.send(Command::SetBreakpoint {
            path: path.into(),
            line,
        })
    }

    pub fn toggle_breakpoint(&self, buffer: BufferId, line: u32) -> Result<(), BridgeError> {
        self.send(Command::ToggleBreakpoint { buffer, line })
    }

    pub fn delete_breakpoint(&self, id: BreakpointId) -> Result<(), BridgeError> {
        self.send(Command::DeleteBreakpoint(id))
    }

    pub fn set_pane_command(
        &self,
        pane: Pane,
        command: impl Into<String>,
    ) -> Result<(), BridgeError> {
        self.send(Command::SetPaneCommand {
            pane,
            command: command.into(),
        })
    }

    pub fn toggle_backtrace_all(&self) -> Result<(), BridgeError> {
        self.send(Command::ToggleBacktraceAll)
    }

    pub fn select_thread_and_frame(
        &self,
        thread: Option<u32>,
        frame: Option<u32>,
    ) -> Result<(), BridgeError> {
        self.send(Command::SelectThreadAndFrame { thread, frame })
    }

    pub fn put_stdin(&self, input: impl Into<String>) -> Result<(), BridgeError> {
        self.send(Command::PutStdin(input.into()))
    }

    pub fn refresh(&self) -> Result<(), BridgeError> {
        self.send(Command::Refresh)
    }

    pub fn run_actions(&self, actions: Vec<Action>) -> Result<(), BridgeError> {
        self.send(Command::RunActions(actions))
    }

    pub fn enter_mode(&self, mode: impl Into<String>) -> Result<(), BridgeError> {
        self.send(Command::EnterMode(mode.into()))
    }

    /// Completion candidates for `arg`, the word under the cursor at `pos` in `line`
    pub fn complete(
        &self,
        arg: impl Into<String>,
        line: impl Into<String>,
        pos: usize,
    ) -> Result<Vec<String>, BridgeError> {
        let command = Command::Complete {
            arg: arg.into(),
            line: line.into(),
            pos,
        };
        match self.submit(command, true, Some(self.complete_timeout))? {
            Some(Reply::Completions(candidates)) => Ok(candidates),
            other => {
                tracing::warn!(reply = ?other, "unexpected reply to completion");
                Ok(Vec::new())
            }
        }
    }

    /// Names of the modes of the loaded session
    pub fn modes(&self) -> Result<Vec<String>, BridgeError> {
        match self.submit(Command::Modes, true, Some(self.modes_timeout))? {
            Some(Reply::Modes(modes)) => Ok(modes),
            other => {
                tracing::warn!(reply = ?other, "unexpected reply to modes");
                Ok(Vec::new())
            }
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(WorkerState::Terminated)
    }

    /// Stop the worker and wait for it to exit. Later submissions fail with
    /// [`BridgeError::DeadWorker`].
    #[tracing::instrument(skip(self))]
    pub fn shutdown(&self) -> Result<(), BridgeError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let sentinel = Request {
            seq,
            command: Command::Shutdown,
            sync: false,
        };
        match self.requests.send_timeout(sentinel, SHUTDOWN_TIMEOUT) {
            Ok(()) => {}
            // the worker already exited on its own, joining returns at once
            Err(SendTimeoutError::Disconnected(_)) => {
                tracing::debug!("worker exited before shutdown");
            }
            Err(SendTimeoutError::Timeout(_)) => {
                // joining a wedged worker would hang the caller
                tracing::error!("could not deliver shutdown request");
                return Err(BridgeError::DeadWorker(
                    "the worker did not accept the shutdown request".to_string(),
                ));
            }
        }

        let handle = match self.worker.lock() {
            Ok(mut worker) => worker.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            handle
                .join()
                .map_err(|_| BridgeError::DeadWorker("the worker thread panicked".to_string()))?;
        }
        tracing::debug!("worker joined");
        Ok(())
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        tracing::debug!("dropping gateway");
        if let Err(e) = self.shutdown() {
            tracing::warn!(error = %e, "failed to shut down worker during drop");
        }
    }
}
