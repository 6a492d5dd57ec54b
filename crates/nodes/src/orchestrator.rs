//! Pipeline orchestrator: one parameterized driver for every pipeline kind.
//!
//! A run moves through a fixed sequence of states:
//!
//! ```text
//! Received -> Authorizing -> StageOneRunning -> [StageTwoRunning] -> Completed
//!                  |                |                  |
//!               Rejected          Failed             Failed
//! ```
//!
//! Authorization precedes every upstream call. Usage is recorded only after
//! every stage has succeeded, immediately before the result is returned, so a
//! failed or aborted run is never charged.

use pipeline::{
    Conversation, Identity, Message, PipelineError, PipelineKind,
    PipelineOutcome, PipelineRequest, PipelineRunId, QuotaGate, StageResult, SubscriptionOracle,
    UsageStatus,
};
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::detection::DetectionNormalizer;
use crate::settings::PipelineSettings;
use crate::stage::StageRunner;

/// Lifecycle of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// The request arrived and carries an identity.
    Received,
    /// Entitlement and quota are being checked.
    Authorizing,
    /// The first (or only) upstream call is in flight.
    StageOneRunning,
    /// The translation stage of generate-then-translate is in flight.
    StageTwoRunning,
    /// The outcome was produced and any charge recorded.
    Completed,
    /// Refused before any upstream call (identity, payload or quota).
    Rejected,
    /// An upstream or storage failure aborted the run.
    Failed,
}

impl RunState {
    /// Stable name used in log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Authorizing => "authorizing",
            Self::StageOneRunning => "stage_one_running",
            Self::StageTwoRunning => "stage_two_running",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }

    fn advance(&mut self, next: RunState) {
        debug!(from = self.as_str(), to = next.as_str(), "run state changed");
        *self = next;
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an authorized run is accounted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Charge {
    /// The pipeline kind is not chargeable.
    Exempt,
    /// An active subscription bypasses the ceiling.
    Entitled,
    /// Counts against the free tier on success.
    Metered,
}

/// Drives [`PipelineRequest`]s through authorization and their stages.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    oracle: SubscriptionOracle,
    quota: QuotaGate,
    stage: StageRunner,
    detector: DetectionNormalizer,
    settings: PipelineSettings,
}

impl Orchestrator {
    /// Creates an orchestrator over the given gate, runners and settings.
    pub fn new(
        oracle: SubscriptionOracle,
        quota: QuotaGate,
        stage: StageRunner,
        detector: DetectionNormalizer,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            oracle,
            quota,
            stage,
            detector,
            settings,
        }
    }

    /// Runs one pipeline for `identity`.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Unauthorized`] when `identity` is `None`; checked
    ///   before anything else.
    /// - [`PipelineError::InvalidRequest`] when the payload fails validation.
    /// - [`PipelineError::QuotaExceeded`] when a chargeable run is refused.
    /// - Any stage or storage failure. No usage is recorded on any error path.
    pub async fn run(
        &self,
        identity: Option<Identity>,
        request: PipelineRequest,
    ) -> Result<PipelineOutcome, PipelineError> {
        let run_id = PipelineRunId::new_random();
        let kind = request.kind();
        let span = info_span!(
            "pipeline.run",
            run_id = %run_id,
            kind = %kind,
            identity = tracing::field::Empty,
        );

        async move {
            let Some(identity) = identity else {
                warn!(state = %RunState::Rejected, "request has no identity");
                return Err(PipelineError::Unauthorized);
            };
            Span::current().record("identity", identity.as_str());

            let mut state = RunState::Received;
            let result = self.execute(&identity, request, &mut state).await;
            match &result {
                Ok(_) => info!(state = %state, "pipeline completed"),
                Err(err) => report_failure(state, err),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Current usage and entitlement for `identity`.
    pub async fn usage(&self, identity: &Identity) -> Result<UsageStatus, PipelineError> {
        let count = self.quota.count(identity).await?;
        let entitled = self.oracle.is_entitled(identity).await?;
        let limit = self.quota.limit();
        Ok(UsageStatus {
            count,
            limit,
            remaining: limit.saturating_sub(count),
            entitled,
        })
    }

    async fn execute(
        &self,
        identity: &Identity,
        request: PipelineRequest,
        state: &mut RunState,
    ) -> Result<PipelineOutcome, PipelineError> {
        request.validate()?;

        state.advance(RunState::Authorizing);
        let charge = self.authorize(identity, request.kind()).await?;
        debug!(charge = ?charge, "run authorized");

        state.advance(RunState::StageOneRunning);
        let outcome = match request {
            PipelineRequest::Detect { text } => {
                PipelineOutcome::Findings(self.detector.detect(&text).await?)
            }
            PipelineRequest::Generate { messages } => {
                let rewrite = self.generate(&messages).await?;
                PipelineOutcome::Text { text: rewrite.text }
            }
            PipelineRequest::TranslateOnly {
                text,
                target_language,
            } => {
                let translation = self.translate(&text, target_language.as_deref()).await?;
                PipelineOutcome::Text {
                    text: translation.text,
                }
            }
            PipelineRequest::GenerateThenTranslate {
                messages,
                target_language,
            } => {
                let rewrite = self.generate(&messages).await?;
                state.advance(RunState::StageTwoRunning);
                let translation = self
                    .translate(&rewrite.text, target_language.as_deref())
                    .await?;
                PipelineOutcome::Translated {
                    original_text: rewrite.text,
                    translated_text: translation.text,
                }
            }
        };

        if charge == Charge::Metered {
            let count = self.quota.increment(identity).await?;
            debug!(count, limit = self.quota.limit(), "usage recorded");
        }

        state.advance(RunState::Completed);
        Ok(outcome)
    }

    async fn authorize(
        &self,
        identity: &Identity,
        kind: PipelineKind,
    ) -> Result<Charge, PipelineError> {
        if !kind.is_chargeable(self.settings.detection_policy) {
            return Ok(Charge::Exempt);
        }
        if self.oracle.is_entitled(identity).await? {
            return Ok(Charge::Entitled);
        }
        if self.quota.authorize(identity).await? {
            return Ok(Charge::Metered);
        }
        Err(PipelineError::QuotaExceeded {
            identity: identity.clone(),
            limit: self.quota.limit(),
        })
    }

    async fn generate(&self, messages: &[Message]) -> Result<StageResult, PipelineError> {
        let conversation =
            Conversation::with_instruction(&self.settings.instructions.rewrite, messages);
        self.stage
            .run(&self.settings.generate_model, conversation)
            .await
    }

    async fn translate(
        &self,
        text: &str,
        target_language: Option<&str>,
    ) -> Result<StageResult, PipelineError> {
        let instruction = self.settings.instructions.translate(target_language);
        let conversation = Conversation::translation(&instruction, text);
        self.stage
            .run(&self.settings.translate_model, conversation)
            .await
    }
}

fn report_failure(state: RunState, err: &PipelineError) {
    let terminal = match err {
        PipelineError::InvalidRequest { .. } | PipelineError::QuotaExceeded { .. } => {
            RunState::Rejected
        }
        _ => RunState::Failed,
    };
    if err.status_code() >= 500 {
        error!(stage = %state, state = %terminal, error_code = err.code(), error = %err, "pipeline failed");
    } else {
        warn!(stage = %state, state = %terminal, error_code = err.code(), error = %err, "pipeline rejected");
    }
}
