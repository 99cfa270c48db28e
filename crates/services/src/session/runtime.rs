use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use exam_core::model::{InputEvent, InputRuling, QuestionId, RawSignal};

use crate::backend::{BackendError, ViolationVerdict};
use crate::error::SessionError;

use super::controller::SessionController;
use super::view::{SignalOutcome, SubmissionReceipt, VerdictOutcome};

/// One event from the page host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInput {
    /// A browser-level signal (visibility, blur, fullscreen, unload).
    Signal(RawSignal),
    /// An input-layer event subject to suppression.
    Input(InputEvent),
    /// The user selected an answer.
    Answer { question: QuestionId, value: String },
    /// The user pressed submit.
    Submit,
}

/// Drives the controller on the cooperative schedule the page would have:
/// a 1 s countdown tick, a 10 s heartbeat tick, the host's input stream,
/// and the detached violation-report responses, all interleaved on one
/// task. Runs until the session finalizes.
///
/// Closing the input channel is treated as the user submitting: a headless
/// host that is done feeding events ends the exam.
pub struct SessionRuntime {
    controller: SessionController,
    inputs: mpsc::Receiver<SessionInput>,
}

type VerdictMessage = (
    exam_core::model::ViolationReason,
    Result<ViolationVerdict, BackendError>,
);

impl SessionRuntime {
    #[must_use]
    pub fn new(controller: SessionController, inputs: mpsc::Receiver<SessionInput>) -> Self {
        Self { controller, inputs }
    }

    /// Run the session loop to its terminal submission.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if local state or persistence fails; network
    /// failures are absorbed per the best-effort contract.
    pub async fn run(mut self) -> Result<SubmissionReceipt, SessionError> {
        let mut tick = tokio::time::interval(Duration::from_secs(
            self.controller.config().tick_interval_secs(),
        ));
        let mut heartbeat = tokio::time::interval(Duration::from_secs(
            self.controller.config().heartbeat_interval_secs(),
        ));
        let (verdict_tx, mut verdicts) = mpsc::channel::<VerdictMessage>(16);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let outcome = self.controller.tick().await?;
                    if let Some(receipt) = outcome.submission {
                        return Ok(receipt);
                    }
                }
                _ = heartbeat.tick() => {
                    self.controller.heartbeat();
                }
                Some((reason, response)) = verdicts.recv() => {
                    if let VerdictOutcome::Submitted(receipt) =
                        self.controller.apply_verdict(reason, response).await?
                    {
                        return Ok(receipt);
                    }
                }
                input = self.inputs.recv() => {
                    match input {
                        None => {
                            if let Some(receipt) = self.controller.submit().await? {
                                return Ok(receipt);
                            }
                        }
                        Some(SessionInput::Submit) => {
                            if let Some(receipt) = self.controller.submit().await? {
                                return Ok(receipt);
                            }
                        }
                        Some(SessionInput::Answer { question, value }) => {
                            self.controller.select_answer(question, value).await?;
                        }
                        Some(SessionInput::Input(event)) => {
                            if event.ruling() == InputRuling::Block {
                                debug!(?event, "restricted input suppressed");
                            }
                        }
                        Some(SessionInput::Signal(signal)) => {
                            if let SignalOutcome::Report(reason) =
                                self.controller.handle_signal(signal).await?
                            {
                                let backend = self.controller.backend();
                                let tx = verdict_tx.clone();
                                tokio::spawn(async move {
                                    let response = backend.report_violation(reason).await;
                                    let _ = tx.send((reason, response)).await;
                                });
                            }
                        }
                    }
                }
            }
        }
    }
}
