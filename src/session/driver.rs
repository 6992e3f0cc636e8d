use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{FollowBackend, FollowSession, SessionCommand, SessionEvent};
use crate::domain::{ReconciliationResult, TrackedState};
use crate::error::FollowError;

/// Runs a `FollowSession` against a backend.
///
/// Each reconcile and apply runs as its own task and reports back through a
/// channel, so user events keep flowing while requests are in flight. Every
/// request is bounded by `request_timeout`; running out of time counts as a
/// transport failure.
pub struct SessionDriver<B> {
    backend: Arc<B>,
    request_timeout: Duration,
}

impl<B: FollowBackend> SessionDriver<B> {
    pub fn new(backend: B, request_timeout: Duration) -> Self {
        Self {
            backend: Arc::new(backend),
            request_timeout,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Feed `input` into the session until it closes, or until `input` ends
    /// and nothing is left in flight.
    pub async fn run(
        &self,
        mut session: FollowSession,
        mut input: mpsc::Receiver<SessionEvent>,
    ) -> FollowSession {
        let (results_tx, mut results) = mpsc::unbounded_channel();
        let mut input_open = true;

        while !session.is_closed() {
            if !input_open && !session.is_busy() {
                break;
            }

            let event = tokio::select! {
                Some(event) = results.recv() => event,
                event = input.recv(), if input_open => match event {
                    Some(event) => event,
                    None => {
                        debug!("Input closed");
                        input_open = false;
                        continue;
                    }
                },
            };

            let (next, command) = session.handle(event);
            session = next;
            if let Some(command) = command {
                self.spawn(&session, command, results_tx.clone());
            }
        }

        session
    }

    /// Apply `event` and run whatever it triggers to completion.
    ///
    /// Handy for one-shot use where nothing else can interleave.
    pub async fn step(&self, session: FollowSession, event: SessionEvent) -> FollowSession {
        let (mut session, mut command) = session.handle(event);
        while let Some(current) = command.take() {
            let Some(event) = self.execute(&session, current).await else {
                break;
            };
            let (next, follow_up) = session.handle(event);
            session = next;
            command = follow_up;
        }
        session
    }

    fn spawn(
        &self,
        session: &FollowSession,
        command: SessionCommand,
        results: mpsc::UnboundedSender<SessionEvent>,
    ) {
        let backend = Arc::clone(&self.backend);
        let request_timeout = self.request_timeout;
        let tracked = session.tracked().clone();

        tokio::spawn(async move {
            if let Some(event) = execute(&*backend, request_timeout, &tracked, command).await {
                // The receiver is gone once the session has ended.
                let _ = results.send(event);
            }
        });
    }

    async fn execute(&self, session: &FollowSession, command: SessionCommand) -> Option<SessionEvent> {
        execute(&*self.backend, self.request_timeout, session.tracked(), command).await
    }
}

async fn execute<B: FollowBackend>(
    backend: &B,
    request_timeout: Duration,
    tracked: &TrackedState,
    command: SessionCommand,
) -> Option<SessionEvent> {
    match command {
        SessionCommand::Reconcile { seq, proposed } => {
            debug!(
                "Reconciling #{}: target={} files={:?}",
                seq, proposed.target_ref, proposed.file_pattern
            );
            let result = match timeout(request_timeout, backend.reconcile(tracked, &proposed)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("Reconciliation #{} timed out after {:?}", seq, request_timeout);
                    ReconciliationResult::invalid(FollowError::transport(format!(
                        "timed out after {:?}",
                        request_timeout
                    )))
                }
            };
            Some(SessionEvent::Resolved { seq, result })
        }
        SessionCommand::Apply { proposed } => {
            info!("Applying target={} files={:?}", proposed.target_ref, proposed.file_pattern);
            let event = match timeout(request_timeout, backend.apply(tracked, &proposed)).await {
                Ok(Ok(outcome)) => SessionEvent::ApplySucceeded(outcome),
                Ok(Err(error)) => SessionEvent::ApplyFailed(error),
                Err(_) => SessionEvent::ApplyFailed(FollowError::transport(format!(
                    "timed out after {:?}",
                    request_timeout
                ))),
            };
            Some(event)
        }
        SessionCommand::Refresh => {
            debug!("Change updated, refresh requested");
            None
        }
    }
}
