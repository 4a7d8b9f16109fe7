use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::{AppSettings, SessionsConfig};
use crate::content::{ContentSource, FetchError, FetchedContent};
use crate::quiz::session::{
    AnswerOutcome, FetchOutcome, GenerationOutcome, GenerationRequest, QuizSession,
    RequestToken, SessionError, SessionSnapshot,
};
use crate::quiz::{GenerationError, QuestionGenerator, QuizItem};

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// Collaborators shared by every session. Nothing in here is mutable.
pub struct SessionDeps<G, C> {
    pub generator: Arc<G>,
    pub content_source: Arc<C>,
    pub generation_timeout: Duration,
    pub idle_timeout: Duration,
    pub channel_capacity: usize,
}

impl<G, C> Clone for SessionDeps<G, C> {
    fn clone(&self) -> Self {
        Self {
            generator: Arc::clone(&self.generator),
            content_source: Arc::clone(&self.content_source),
            generation_timeout: self.generation_timeout,
            idle_timeout: self.idle_timeout,
            channel_capacity: self.channel_capacity,
        }
    }
}

impl<G, C> SessionDeps<G, C> {
    pub fn new(generator: G, content_source: C, settings: &AppSettings) -> Self {
        Self::with_timeouts(
            generator,
            content_source,
            Duration::from_secs(settings.generator.timeout_secs),
            &settings.sessions,
        )
    }

    pub fn with_timeouts(
        generator: G,
        content_source: C,
        generation_timeout: Duration,
        sessions: &SessionsConfig,
    ) -> Self {
        Self {
            generator: Arc::new(generator),
            content_source: Arc::new(content_source),
            generation_timeout,
            idle_timeout: Duration::from_secs(sessions.idle_timeout_secs),
            channel_capacity: sessions.channel_capacity,
        }
    }
}

#[derive(Debug)]
pub enum SessionMessage {
    LoadContent {
        url: String,
        respond_to: Reply<SessionSnapshot>,
    },
    SubmitAnswer {
        option_index: usize,
        respond_to: Reply<(AnswerOutcome, SessionSnapshot)>,
    },
    RequestNext {
        respond_to: Reply<SessionSnapshot>,
    },
    Stop {
        respond_to: Reply<SessionSnapshot>,
    },
    Reset {
        respond_to: oneshot::Sender<SessionSnapshot>,
    },
    GetSnapshot {
        respond_to: oneshot::Sender<SessionSnapshot>,
    },
    Shutdown,
    InternalContentFetched {
        token: RequestToken,
        result: Result<FetchedContent, FetchError>,
    },
    InternalGenerationFinished {
        token: RequestToken,
        result: Result<QuizItem, GenerationError>,
    },
}

pub struct SessionActor<G, C> {
    receiver: mpsc::Receiver<SessionMessage>,
    self_sender: mpsc::Sender<SessionMessage>,
    session_id: Uuid,
    session: QuizSession,
    deps: SessionDeps<G, C>,
    manager_handle: Option<SessionManagerHandle>,
    /// Caller of the load/next request currently in flight.
    waiting: Option<(RequestToken, Reply<SessionSnapshot>)>,
}

impl<G, C> SessionActor<G, C>
where
    G: QuestionGenerator + 'static,
    C: ContentSource + 'static,
{
    fn new(
        receiver: mpsc::Receiver<SessionMessage>,
        self_sender: mpsc::Sender<SessionMessage>,
        session_id: Uuid,
        deps: SessionDeps<G, C>,
        manager_handle: Option<SessionManagerHandle>,
    ) -> Self {
        SessionActor {
            receiver,
            self_sender,
            session_id,
            session: QuizSession::new(),
            deps,
            manager_handle,
            waiting: None,
        }
    }

    /// Returns true when the actor should shut down.
    #[tracing::instrument(skip(self, msg), fields(
        session.id = %self.session_id,
        session.state = %self.session.state(),
    ))]
    async fn handle_message(&mut self, msg: SessionMessage) -> bool {
        match msg {
            SessionMessage::LoadContent { url, respond_to } => match self.session.begin_load() {
                Ok(token) => {
                    tracing::info!(content.url = %url, "Loading quiz content");
                    self.waiting = Some((token, respond_to));
                    self.spawn_fetch(token, url);
                }
                Err(e) => {
                    let _ = respond_to.send(Err(e));
                }
            },
            SessionMessage::SubmitAnswer {
                option_index,
                respond_to,
            } => {
                let result = self
                    .session
                    .submit_answer(option_index)
                    .map(|outcome| (outcome, self.session.snapshot()));
                let _ = respond_to.send(result);
            }
            SessionMessage::RequestNext { respond_to } => match self.session.begin_next() {
                Ok(request) => {
                    tracing::debug!(
                        asked.count = request.asked_questions.len(),
                        "Requesting next question"
                    );
                    self.waiting = Some((request.token, respond_to));
                    self.spawn_generation(request);
                }
                Err(e) => {
                    let _ = respond_to.send(Err(e));
                }
            },
            SessionMessage::Stop { respond_to } => {
                let result = self.session.stop().map(|_| self.session.snapshot());
                if result.is_ok() {
                    tracing::info!(
                        score = %self.session.score(),
                        "Quiz stopped by user"
                    );
                    self.cancel_waiting();
                }
                let _ = respond_to.send(result);
            }
            SessionMessage::Reset { respond_to } => {
                self.session.reset();
                self.cancel_waiting();
                tracing::info!("Quiz session reset");
                let _ = respond_to.send(self.session.snapshot());
            }
            SessionMessage::GetSnapshot { respond_to } => {
                let _ = respond_to.send(self.session.snapshot());
            }
            SessionMessage::Shutdown => {
                self.cancel_waiting();
                return true;
            }
            SessionMessage::InternalContentFetched { token, result } => {
                match self.session.content_fetched(token, result) {
                    FetchOutcome::Ready(request) => self.spawn_generation(request),
                    FetchOutcome::Failed => self.finish_waiting(token, true),
                    FetchOutcome::Discarded => {}
                }
            }
            SessionMessage::InternalGenerationFinished { token, result } => {
                match self.session.apply_generation(token, result) {
                    GenerationOutcome::Discarded => {}
                    GenerationOutcome::Exhausted => {
                        tracing::info!(
                            score = %self.session.score(),
                            "Quiz ended, no new questions"
                        );
                        self.finish_waiting(token, false);
                    }
                    GenerationOutcome::Question => self.finish_waiting(token, false),
                    GenerationOutcome::Failed => self.finish_waiting(token, true),
                }
            }
        }
        false
    }

    fn spawn_fetch(&self, token: RequestToken, url: String) {
        let content_source = Arc::clone(&self.deps.content_source);
        let sender = self.self_sender.clone();
        tokio::spawn(async move {
            let result = content_source.fetch(&url).await;
            if sender
                .send(SessionMessage::InternalContentFetched { token, result })
                .await
                .is_err()
            {
                tracing::debug!("Session closed before content fetch finished");
            }
        });
    }

    fn spawn_generation(&self, request: GenerationRequest) {
        let generator = Arc::clone(&self.deps.generator);
        let sender = self.self_sender.clone();
        let timeout = self.deps.generation_timeout;
        tokio::spawn(async move {
            let GenerationRequest {
                token,
                source_text,
                asked_questions,
            } = request;
            let result = match tokio::time::timeout(
                timeout,
                generator.generate(&source_text, &asked_questions),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(GenerationError::Timeout(timeout)),
            };
            if sender
                .send(SessionMessage::InternalGenerationFinished { token, result })
                .await
                .is_err()
            {
                tracing::debug!("Session closed before generation finished");
            }
        });
    }

    fn finish_waiting(&mut self, token: RequestToken, failed: bool) {
        let Some((waiting_token, respond_to)) = self.waiting.take() else {
            return;
        };
        if waiting_token != token {
            self.waiting = Some((waiting_token, respond_to));
            return;
        }
        let result = match self.session.last_error() {
            Some(failure) if failed => Err(SessionError::Failed(failure.clone())),
            _ => Ok(self.session.snapshot()),
        };
        let _ = respond_to.send(result);
    }

    fn cancel_waiting(&mut self) {
        if let Some((token, respond_to)) = self.waiting.take() {
            tracing::debug!(request.token = token, "Cancelling waiting caller");
            let _ = respond_to.send(Err(SessionError::Cancelled));
        }
    }
}

#[tracing::instrument(skip(actor), fields(session.id = %actor.session_id))]
pub async fn run_session_actor<G, C>(mut actor: SessionActor<G, C>)
where
    G: QuestionGenerator + 'static,
    C: ContentSource + 'static,
{
    tracing::info!("Session actor started");
    let idle_timeout = actor.deps.idle_timeout;
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            maybe_msg = actor.receiver.recv() => {
                match maybe_msg {
                    Some(msg) => {
                        let from_user = !matches!(
                            msg,
                            SessionMessage::InternalContentFetched { .. }
                                | SessionMessage::InternalGenerationFinished { .. }
                        );
                        if from_user {
                            last_activity = Instant::now();
                        }
                        if actor.handle_message(msg).await {
                            tracing::info!("Session shutdown requested");
                            break;
                        }
                    }
                    None => {
                        tracing::info!("Session channel closed. Shutting down");
                        break;
                    }
                }
            }
            _ = tokio::time::sleep_until(last_activity + idle_timeout) => {
                tracing::info!("Session inactivity timeout. Notifying manager for shutdown");
                if let Some(manager) = &actor.manager_handle
                    && let Err(e) = manager.notify_session_shutdown(actor.session_id).await
                {
                    tracing::error!(
                        error = %e,
                        "Failed to notify SessionManager of shutdown"
                    );
                }
                actor.cancel_waiting();
                break;
            }
        }
    }

    tracing::info!("Session actor stopped");
}

#[derive(Clone, Debug)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionMessage>,
    pub session_id: Uuid,
}

impl SessionHandle {
    pub fn spawn<G, C>(
        session_id: Uuid,
        deps: SessionDeps<G, C>,
        manager_handle: Option<SessionManagerHandle>,
    ) -> Self
    where
        G: QuestionGenerator + 'static,
        C: ContentSource + 'static,
    {
        let (sender, receiver) = mpsc::channel(deps.channel_capacity);
        let actor = SessionActor::new(
            receiver,
            sender.clone(),
            session_id,
            deps,
            manager_handle,
        );
        tokio::spawn(run_session_actor(actor));
        Self { sender, session_id }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> SessionMessage,
    ) -> Result<T, SessionError> {
        let (respond_to, rx) = oneshot::channel();
        self.sender
            .send(build(respond_to))
            .await
            .map_err(|_| SessionError::Unavailable)?;
        rx.await.map_err(|_| SessionError::Unavailable)?
    }

    async fn query(
        &self,
        build: impl FnOnce(oneshot::Sender<SessionSnapshot>) -> SessionMessage,
    ) -> Result<SessionSnapshot, SessionError> {
        let (respond_to, rx) = oneshot::channel();
        self.sender
            .send(build(respond_to))
            .await
            .map_err(|_| SessionError::Unavailable)?;
        rx.await.map_err(|_| SessionError::Unavailable)
    }

    pub async fn load_content(&self, url: String) -> Result<SessionSnapshot, SessionError> {
        self.request(|respond_to| SessionMessage::LoadContent { url, respond_to })
            .await
    }

    pub async fn submit_answer(
        &self,
        option_index: usize,
    ) -> Result<(AnswerOutcome, SessionSnapshot), SessionError> {
        self.request(|respond_to| SessionMessage::SubmitAnswer {
            option_index,
            respond_to,
        })
        .await
    }

    pub async fn request_next(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(|respond_to| SessionMessage::RequestNext { respond_to })
            .await
    }

    pub async fn stop(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(|respond_to| SessionMessage::Stop { respond_to })
            .await
    }

    pub async fn reset(&self) -> Result<SessionSnapshot, SessionError> {
        self.query(|respond_to| SessionMessage::Reset { respond_to })
            .await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.query(|respond_to| SessionMessage::GetSnapshot { respond_to })
            .await
    }

    pub async fn shutdown(&self) {
        if self.sender.send(SessionMessage::Shutdown).await.is_err() {
            tracing::debug!(session.id = %self.session_id, "Session already stopped");
        }
    }
}

#[derive(Debug)]
pub enum SessionManagerMessage {
    CreateSession {
        respond_to: oneshot::Sender<SessionHandle>,
    },
    GetSession {
        session_id: Uuid,
        respond_to: oneshot::Sender<Option<SessionHandle>>,
    },
    RemoveSession {
        session_id: Uuid,
        respond_to: oneshot::Sender<bool>,
    },
    SessionActorShutdown {
        session_id: Uuid,
    },
}

pub struct SessionManagerActor<G, C> {
    receiver: mpsc::Receiver<SessionManagerMessage>,
    self_sender: mpsc::Sender<SessionManagerMessage>,
    sessions: HashMap<Uuid, SessionHandle>,
    deps: SessionDeps<G, C>,
}

impl<G, C> SessionManagerActor<G, C>
where
    G: QuestionGenerator + 'static,
    C: ContentSource + 'static,
{
    #[tracing::instrument(skip(self, msg), fields(sessions.count = self.sessions.len()))]
    async fn handle_message(&mut self, msg: SessionManagerMessage) {
        match msg {
            SessionManagerMessage::CreateSession { respond_to } => {
                let session_id = Uuid::new_v4();
                let manager_handle = SessionManagerHandle {
                    sender: self.self_sender.clone(),
                };
                let handle =
                    SessionHandle::spawn(session_id, self.deps.clone(), Some(manager_handle));
                self.sessions.insert(session_id, handle.clone());
                tracing::info!(session.id = %session_id, "Created quiz session");
                let _ = respond_to.send(handle);
            }
            SessionManagerMessage::GetSession {
                session_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.sessions.get(&session_id).cloned());
            }
            SessionManagerMessage::RemoveSession {
                session_id,
                respond_to,
            } => {
                let removed = match self.sessions.remove(&session_id) {
                    Some(handle) => {
                        handle.shutdown().await;
                        tracing::info!(session.id = %session_id, "Removed quiz session");
                        true
                    }
                    None => false,
                };
                let _ = respond_to.send(removed);
            }
            SessionManagerMessage::SessionActorShutdown { session_id } => {
                if self.sessions.remove(&session_id).is_some() {
                    tracing::info!(
                        session.id = %session_id,
                        "Cleaning up session after actor shutdown"
                    );
                } else {
                    tracing::warn!(
                        session.id = %session_id,
                        "Received shutdown for unknown session"
                    );
                }
            }
        }
    }
}

#[tracing::instrument(skip(actor))]
pub async fn run_session_manager_actor<G, C>(mut actor: SessionManagerActor<G, C>)
where
    G: QuestionGenerator + 'static,
    C: ContentSource + 'static,
{
    tracing::info!("SessionManager actor started");
    while let Some(msg) = actor.receiver.recv().await {
        actor.handle_message(msg).await;
    }
    tracing::info!("SessionManager actor stopped");
}

#[derive(Clone, Debug)]
pub struct SessionManagerHandle {
    sender: mpsc::Sender<SessionManagerMessage>,
}

impl SessionManagerHandle {
    pub fn spawn<G, C>(buffer_size: usize, deps: SessionDeps<G, C>) -> Self
    where
        G: QuestionGenerator + 'static,
        C: ContentSource + 'static,
    {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor = SessionManagerActor {
            receiver,
            self_sender: sender.clone(),
            sessions: HashMap::new(),
            deps,
        };
        tokio::spawn(run_session_manager_actor(actor));
        Self { sender }
    }

    pub async fn create_session(&self) -> Result<SessionHandle, String> {
        let (respond_to, rx) = oneshot::channel();
        self.sender
            .send(SessionManagerMessage::CreateSession { respond_to })
            .await
            .map_err(|e| format!("Failed to send CreateSession: {}", e))?;
        rx.await
            .map_err(|e| format!("SessionManager no response: {}", e))
    }

    pub async fn get_session(&self, session_id: Uuid) -> Option<SessionHandle> {
        let (respond_to, rx) = oneshot::channel();
        if self
            .sender
            .send(SessionManagerMessage::GetSession {
                session_id,
                respond_to,
            })
            .await
            .is_err()
        {
            return None;
        }
        rx.await.ok().flatten()
    }

    pub async fn remove_session(&self, session_id: Uuid) -> Result<bool, String> {
        let (respond_to, rx) = oneshot::channel();
        self.sender
            .send(SessionManagerMessage::RemoveSession {
                session_id,
                respond_to,
            })
            .await
            .map_err(|e| format!("Failed to send RemoveSession: {}", e))?;
        rx.await
            .map_err(|e| format!("SessionManager no response: {}", e))
    }

    pub async fn notify_session_shutdown(&self, session_id: Uuid) -> Result<(), String> {
        self.sender
            .send(SessionManagerMessage::SessionActorShutdown { session_id })
            .await
            .map_err(|e| format!("Failed to send SessionActorShutdown: {}", e))
    }
}
