// Copyright (c) 2024 Mike Tsao

use crate::traits::ProvidesService;
use chordflow::{
    prelude::*,
    transformers::{TransformerFactory, TransformerState},
    util::CrossbeamChannel,
};
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use thiserror::Error;

/// Correlates an `init` or `transform` request with its reply.
pub type RequestId = u64;

/// Timeouts while waiting on `quit` report this id. Requests that get replies
/// are numbered from 1.
pub const QUIT_REQUEST_ID: RequestId = 0;

/// Messages to the pipeline thread.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PipelineServiceInput {
    /// Builds a new pipeline, replacing the current one only if the build
    /// succeeds.
    #[serde(rename_all = "kebab-case")]
    Init {
        #[allow(missing_docs)]
        id: RequestId,
        #[allow(missing_docs)]
        transformer_states: Vec<TransformerState>,
    },
    /// Runs one batch. Every one gets exactly one reply with the same id.
    #[serde(rename_all = "kebab-case")]
    Transform {
        #[allow(missing_docs)]
        id: RequestId,
        #[allow(missing_docs)]
        commands: Vec<AudioCommand>,
        #[allow(missing_docs)]
        timer_data: TimerSnapshot,
    },
    /// Clears every stage's transient state.
    Reset,
    /// Tears down the pipeline and ends the thread.
    Quit,
}

/// Messages from the pipeline thread.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PipelineServiceEvent {
    /// The pipeline was built. Lists the stage uids in order.
    Initialized {
        #[allow(missing_docs)]
        id: RequestId,
        #[allow(missing_docs)]
        uids: Vec<Uid>,
    },
    /// The pipeline couldn't be built. Any previous pipeline is still in
    /// place.
    InitFailed {
        #[allow(missing_docs)]
        id: RequestId,
        #[allow(missing_docs)]
        error: String,
    },
    /// A batch succeeded.
    Transformed {
        #[allow(missing_docs)]
        id: RequestId,
        #[allow(missing_docs)]
        commands: Vec<AudioCommand>,
    },
    /// A batch failed. `commands` is always empty.
    Failed {
        #[allow(missing_docs)]
        id: RequestId,
        #[allow(missing_docs)]
        commands: Vec<AudioCommand>,
        #[allow(missing_docs)]
        error: String,
    },
    /// The thread has ended.
    Quit,
}

/// Runs a [TransformerManager] on its own thread. Batches are handled one at a
/// time, in the order they were sent.
#[derive(Debug)]
pub struct PipelineService {
    inputs: CrossbeamChannel<PipelineServiceInput>,
    events: CrossbeamChannel<PipelineServiceEvent>,

    factory: Arc<TransformerFactory>,
}
impl ProvidesService<PipelineServiceInput, PipelineServiceEvent> for PipelineService {
    fn sender(&self) -> &Sender<PipelineServiceInput> {
        &self.inputs.sender
    }

    fn receiver(&self) -> &Receiver<PipelineServiceEvent> {
        &self.events.receiver
    }
}
impl PipelineService {
    /// Starts the thread. It has no pipeline until it receives `init`.
    pub fn new_with(factory: &Arc<TransformerFactory>) -> Self {
        let r = Self {
            inputs: Default::default(),
            events: Default::default(),
            factory: Arc::clone(factory),
        };
        r.spawn_thread();
        r
    }

    fn spawn_thread(&self) {
        let receiver = self.inputs.receiver.clone();
        let sender = self.events.sender.clone();
        let factory = Arc::clone(&self.factory);
        std::thread::spawn(move || {
            let mut daemon = PipelineServiceDaemon::new_with(receiver, sender, factory);
            daemon.execute();
        });
    }
}

struct PipelineServiceDaemon {
    receiver: Receiver<PipelineServiceInput>,
    sender: Sender<PipelineServiceEvent>,
    factory: Arc<TransformerFactory>,

    manager: Option<TransformerManager>,
}
impl PipelineServiceDaemon {
    fn new_with(
        receiver: Receiver<PipelineServiceInput>,
        sender: Sender<PipelineServiceEvent>,
        factory: Arc<TransformerFactory>,
    ) -> Self {
        Self {
            receiver,
            sender,
            factory,
            manager: None,
        }
    }

    fn send(&self, event: PipelineServiceEvent) {
        if let Err(e) = self.sender.send(event) {
            log::debug!("pipeline service: nobody is listening: {e}");
        }
    }

    fn handle_init(&mut self, id: RequestId, states: &[TransformerState]) {
        match TransformerManager::from_states(&self.factory, states) {
            Ok(manager) => {
                if let Some(mut old) = self.manager.take() {
                    old.destroy();
                }
                let uids = manager.uids();
                log::info!("pipeline service: built {} stage(s)", uids.len());
                self.manager = Some(manager);
                self.send(PipelineServiceEvent::Initialized { id, uids });
            }
            Err(e) => {
                log::warn!("pipeline service: init {id} failed: {e:#}");
                self.send(PipelineServiceEvent::InitFailed {
                    id,
                    error: format!("{e:#}"),
                });
            }
        }
    }

    fn handle_transform(
        &mut self,
        id: RequestId,
        commands: Vec<AudioCommand>,
        timer: &TimerSnapshot,
    ) {
        let Some(manager) = self.manager.as_mut() else {
            self.send(PipelineServiceEvent::Failed {
                id,
                commands: Vec::default(),
                error: PipelineError::NotInitialized.to_string(),
            });
            return;
        };
        let event = match manager.transform(commands, timer) {
            Ok(commands) => PipelineServiceEvent::Transformed { id, commands },
            Err(e) => {
                log::warn!("pipeline service: batch {id} failed: {e}");
                PipelineServiceEvent::Failed {
                    id,
                    commands: Vec::default(),
                    error: e.to_string(),
                }
            }
        };
        self.send(event);
    }

    fn execute(&mut self) {
        while let Ok(input) = self.receiver.recv() {
            match input {
                PipelineServiceInput::Init {
                    id,
                    transformer_states,
                } => {
                    self.handle_init(id, &transformer_states);
                }
                PipelineServiceInput::Transform {
                    id,
                    commands,
                    timer_data,
                } => {
                    self.handle_transform(id, commands, &timer_data);
                }
                PipelineServiceInput::Reset => {
                    if let Some(manager) = self.manager.as_mut() {
                        manager.reset();
                    }
                }
                PipelineServiceInput::Quit => {
                    log::debug!("pipeline service: quitting");
                    if let Some(mut manager) = self.manager.take() {
                        manager.destroy();
                    }
                    self.send(PipelineServiceEvent::Quit);
                    break;
                }
            }
        }
    }
}

/// Why a [PipelineClient] request didn't produce commands.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum PipelineError {
    /// No reply arrived before the deadline. A reply that arrives later is
    /// discarded.
    #[error("request {0} timed out")]
    Timeout(RequestId),
    /// The pipeline reported a failure for this request.
    #[error("request {id} failed: {error}")]
    Failed {
        #[allow(missing_docs)]
        id: RequestId,
        #[allow(missing_docs)]
        error: String,
    },
    /// The pipeline couldn't be built.
    #[error("init failed: {0}")]
    InitFailed(String),
    /// The pipeline thread has gone away.
    #[error("the pipeline service has disconnected")]
    Disconnected,
    /// A batch was sent before a pipeline was built.
    #[error("the pipeline has not been initialized")]
    NotInitialized,
}

/// A request/response front end for [PipelineService].
///
/// Each submitted batch gets a fresh [RequestId] and a slot in a pending map.
/// Replies fill their slots as they arrive, in whatever order the caller
/// waits on them. Waiting gives up after the client's timeout and forgets the
/// request.
#[derive(Debug)]
pub struct PipelineClient {
    service: PipelineService,
    timeout: Duration,
    next_id: RequestId,
    pending: FxHashMap<RequestId, Option<Result<Vec<AudioCommand>, PipelineError>>>,
    /// The `init` we're waiting on, if any. Replies to any other init are
    /// stale.
    init_request: Option<RequestId>,
    init_reply: Option<Result<Vec<Uid>, PipelineError>>,
    is_initialized: bool,
    has_quit: bool,
}
impl PipelineClient {
    /// How long a request waits unless told otherwise.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

    #[allow(missing_docs)]
    pub fn new_with(factory: &Arc<TransformerFactory>, timeout: Duration) -> Self {
        Self {
            service: PipelineService::new_with(factory),
            timeout,
            next_id: QUIT_REQUEST_ID + 1,
            pending: Default::default(),
            init_request: None,
            init_reply: None,
            is_initialized: false,
            has_quit: false,
        }
    }

    #[allow(missing_docs)]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[allow(missing_docs)]
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Whether a pipeline has been built successfully.
    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    /// How many requests are waiting on a reply.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Builds the pipeline and waits for the verdict. Returns the stage uids.
    ///
    /// If this times out, its verdict is ignored when it does arrive, and a
    /// later `init` waits for its own.
    pub fn init(&mut self, states: Vec<TransformerState>) -> Result<Vec<Uid>, PipelineError> {
        let id = self.allocate_id();
        self.init_reply = None;
        self.send(PipelineServiceInput::Init {
            id,
            transformer_states: states,
        })?;
        self.init_request = Some(id);
        let deadline = Instant::now() + self.timeout;
        let r = loop {
            if let Some(reply) = self.init_reply.take() {
                break reply;
            }
            if let Err(e) = self.pump(id, deadline) {
                break Err(e);
            }
        };
        self.init_request = None;
        r
    }

    fn allocate_id(&mut self) -> RequestId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Sends a batch without waiting. Pass the id to
    /// [PipelineClient::wait()].
    pub fn submit(
        &mut self,
        commands: Vec<AudioCommand>,
        timer: &dyn Timer,
    ) -> Result<RequestId, PipelineError> {
        if !self.is_initialized {
            return Err(PipelineError::NotInitialized);
        }
        let id = self.allocate_id();
        self.send(PipelineServiceInput::Transform {
            id,
            commands,
            timer_data: TimerSnapshot::capture(timer),
        })?;
        self.pending.insert(id, None);
        Ok(id)
    }

    /// Waits for the reply to a submitted batch. An id that isn't pending,
    /// because it already timed out or was never submitted, reports a
    /// timeout right away.
    pub fn wait(&mut self, id: RequestId) -> Result<Vec<AudioCommand>, PipelineError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match self.pending.get(&id) {
                None => return Err(PipelineError::Timeout(id)),
                Some(Some(_)) => break,
                Some(None) => self.pump(id, deadline)?,
            }
        }
        match self.pending.remove(&id) {
            Some(Some(reply)) => reply,
            _ => Err(PipelineError::Timeout(id)),
        }
    }

    /// Submits a batch and waits for its reply.
    pub fn transform(
        &mut self,
        commands: Vec<AudioCommand>,
        timer: &dyn Timer,
    ) -> Result<Vec<AudioCommand>, PipelineError> {
        let id = self.submit(commands, timer)?;
        self.wait(id)
    }

    /// Asks the pipeline to clear its transient state.
    pub fn reset(&self) -> Result<(), PipelineError> {
        self.send(PipelineServiceInput::Reset)
    }

    /// Ends the pipeline thread and waits for it to say so.
    pub fn quit(&mut self) -> Result<(), PipelineError> {
        self.send(PipelineServiceInput::Quit)?;
        let deadline = Instant::now() + self.timeout;
        while !self.has_quit {
            if let Err(e) = self.pump(QUIT_REQUEST_ID, deadline) {
                return match e {
                    PipelineError::Timeout(_) => Err(e),
                    _ => Ok(()),
                };
            }
        }
        self.is_initialized = false;
        Ok(())
    }

    fn send(&self, input: PipelineServiceInput) -> Result<(), PipelineError> {
        self.service
            .sender()
            .send(input)
            .map_err(|_| PipelineError::Disconnected)
    }

    // Handles one event, or fails if none arrives by the deadline. A timeout
    // forgets the request it was waiting for.
    fn pump(&mut self, waiting_for: RequestId, deadline: Instant) -> Result<(), PipelineError> {
        match self.service.receiver().recv_deadline(deadline) {
            Ok(event) => {
                self.handle_event(event);
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                self.pending.remove(&waiting_for);
                Err(PipelineError::Timeout(waiting_for))
            }
            Err(RecvTimeoutError::Disconnected) => Err(PipelineError::Disconnected),
        }
    }

    fn handle_event(&mut self, event: PipelineServiceEvent) {
        match event {
            PipelineServiceEvent::Initialized { id, uids } => {
                // Even a stale success means the service is running that
                // pipeline now.
                self.is_initialized = true;
                self.complete_init(id, Ok(uids));
            }
            PipelineServiceEvent::InitFailed { id, error } => {
                self.complete_init(id, Err(PipelineError::InitFailed(error)));
            }
            PipelineServiceEvent::Transformed { id, commands } => {
                self.complete(id, Ok(commands));
            }
            PipelineServiceEvent::Failed { id, error, .. } => {
                self.complete(id, Err(PipelineError::Failed { id, error }));
            }
            PipelineServiceEvent::Quit => {
                self.has_quit = true;
            }
        }
    }

    fn complete_init(&mut self, id: RequestId, reply: Result<Vec<Uid>, PipelineError>) {
        if self.init_request == Some(id) {
            self.init_reply = Some(reply);
        } else {
            log::debug!("pipeline client: dropping stale reply to init {id}");
        }
    }

    fn complete(&mut self, id: RequestId, reply: Result<Vec<AudioCommand>, PipelineError>) {
        match self.pending.get_mut(&id) {
            Some(slot) => *slot = Some(reply),
            None => log::debug!("pipeline client: dropping late reply to request {id}"),
        }
    }
}
impl Drop for PipelineClient {
    fn drop(&mut self) {
        if !self.has_quit {
            let _ = self.service.sender().try_send(PipelineServiceInput::Quit);
        }
    }
}
