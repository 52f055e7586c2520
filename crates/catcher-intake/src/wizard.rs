//! The async driver.
//!
//! [`Wizard`] owns a [`Session`] and everything that needs the network:
//! summarization, corrections, generation, review and free chat. Each public
//! method handles one user action, then flushes the queued render commands
//! to the [`Renderer`].

use std::sync::Arc;

use tokio::sync::watch;

use catcher_backend::extract::truncate_chars;
use catcher_backend::{ChatRequest, CritiqueRequest, IntakeBackend};
use catcher_review::{
    split_sections, Applied, Decision, ReviewPhase, ReviewSession, Section, TrackedView,
};
use catcher_types::{
    ArtifactBundle, ArtifactKind, Artifacts, CatcherError, Provenance, Result, SlotKey,
};

use crate::config::WizardConfig;
use crate::events::{EventEmitter, SessionEvent};
use crate::free_input::{Purpose, Submission};
use crate::render::{ArtifactView, RenderCommand, Renderer, ResultAction, GENERATION_STAGES};
use crate::scope::{ModalStack, Scope};
use crate::script::{summary_card, Directive, CORRECTION_CONFIRM, TEXT_RETRY, URL_RETRY};
use crate::session::Session;
use crate::transcript::Content;

const READING_URL: &str = "サイトを読みに行っています… 🔍";
const READING_TEXT: &str = "プロフィールを読んでいます… 📖";
const URL_FAILED: &str =
    "URLの読み取りがうまくいきませんでした。\nSNSプロフィール文をコピペするか、選択式で教えてください。";
const TEXT_FAILED: &str = "うまく読み取れませんでした。\n別の方法を試してみましょう。";
const SUMMARY_UNREACHABLE: &str = "通信エラーが発生しました。選択式で進めましょう。";

const APPLYING_CORRECTION: &str = "修正を反映しています… ✏️";
const CORRECTION_APPLIED: &str = "修正しました！こちらで合っていますか？";
const CORRECTION_FAILED: &str = "ありがとうございます、反映しました！次に進みますね。";

const GENERATION_CANCELLED: &str =
    "生成をキャンセルしました。もう一度試すか、質問内容を変えてみてください。";
const GENERATION_FAILED: &str = "生成中にエラーが発生しました。もう一度お試しください。";
const GENERATION_UNREACHABLE: &str = "通信エラーが発生しました。もう一度お試しください。";
const PLACEHOLDER_NOTICE: &str =
    "⚠️ AIによる生成が使えなかったため、サンプルの内容を表示しています。";
const DEGRADED_NOTICE: &str = "⚠️ AIの応答が得られなかったため、サンプルの内容で代用しています。";

const RESULTS_CLOSED: &str =
    "生成が完了しました 🎉\n結果はいつでも見直せます。\n\n他に気になることがあれば、何でも聞いてください。";

const CHAT_INTRO: &str = "何でも聞いてください 💬\n\n例えば：\n・他にどんな支援策があるか知りたい\n・似たような活動の事例を教えて\n・助成金の探し方を教えて\n・文章をもう少し変えたい\n\n自由に入力して送ってください。";
const CHAT_PLACEHOLDER: &str = "例：助成金の探し方を教えて…";
const CHAT_THINKING: &str = "考え中…";
const CHAT_FAILED: &str = "すみません、うまく答えられませんでした。もう一度お試しください。";
const CHAT_UNREACHABLE: &str = "通信エラーが発生しました。";

const REVIEW_FAILED: &str = "確認に失敗しました。もう一度お試しください。";

/// Artifacts sent along with a chat question.
const CHAT_EXCERPTS: [ArtifactKind; 2] = [ArtifactKind::Plan, ArtifactKind::Funding];

/// How a generation request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationOutcome {
    Generated(Provenance),
    Failed,
    Cancelled,
}

/// Aborts the generation request it was armed for.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    signal: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.signal.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.signal.borrow()
    }
}

/// Resolves once the signal fires. Never resolves without one.
async fn aborted(signal: Option<watch::Receiver<bool>>) {
    if let Some(mut rx) = signal {
        if rx.wait_for(|aborted| *aborted).await.is_ok() {
            return;
        }
    }
    std::future::pending::<()>().await
}

#[derive(Debug, Clone, Copy)]
enum SummarySource {
    Url,
    Text,
}

pub struct Wizard {
    session: Session,
    backend: Arc<dyn IntakeBackend>,
    renderer: Box<dyn Renderer>,
    config: WizardConfig,
    events: EventEmitter,
    scopes: ModalStack,
    artifacts: Option<Artifacts>,
    provenance: Option<Provenance>,
    view: TrackedView,
    review: ReviewSession,
    abort: Option<watch::Receiver<bool>>,
}

impl Wizard {
    pub fn new(
        backend: Arc<dyn IntakeBackend>,
        renderer: Box<dyn Renderer>,
        config: WizardConfig,
    ) -> Self {
        Self {
            session: Session::new(),
            backend,
            renderer,
            config,
            events: EventEmitter::default(),
            scopes: ModalStack::new(),
            artifacts: None,
            provenance: None,
            view: TrackedView::new(),
            review: ReviewSession::new(),
            abort: None,
        }
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn artifacts(&self) -> Option<&Artifacts> {
        self.artifacts.as_ref()
    }

    pub fn provenance(&self) -> Option<Provenance> {
        self.provenance
    }

    pub fn review(&self) -> &ReviewSession {
        &self.review
    }

    pub fn view(&self) -> &TrackedView {
        &self.view
    }

    pub fn scope(&self) -> Option<Scope> {
        self.scopes.top()
    }

    // -----------------------------------------------------------------------
    // Conversation
    // -----------------------------------------------------------------------

    pub async fn start(&mut self) {
        self.events.emit(SessionEvent::SessionStarted);
        self.session.advance();
        self.flush().await;
    }

    pub async fn select(&mut self, value: &str) -> Result<Directive> {
        self.require(None, "select a choice")?;
        let step_id = self.session.current_step().map(|s| s.id);
        let directive = self.session.select_choice(value)?;
        if let Some(step_id) = step_id {
            self.events.emit(SessionEvent::StepAnswered {
                step_id: step_id.to_string(),
                value: value.to_string(),
            });
        }
        self.flush().await;
        Ok(directive)
    }

    pub async fn go_back(&mut self) -> Result<bool> {
        self.require(None, "go back")?;
        let moved = self.session.go_to_previous_step();
        self.flush().await;
        Ok(moved)
    }

    /// Submit free text: an answer, a correction, a URL, a chat question or
    /// a request to go back.
    pub async fn submit_text(&mut self, text: &str) -> Result<()> {
        self.require(None, "submit text")?;
        match self.session.submit_text(text) {
            Submission::Ignored | Submission::Back => {}
            Submission::Chat(question) => {
                self.session.user(Content::text(&question));
                self.chat(question).await;
            }
            Submission::Deliver { purpose, text } => {
                self.session.user(Content::text(&text));
                match purpose {
                    Purpose::Url => self.summarize(SummarySource::Url, &text).await?,
                    Purpose::ProfileText => self.summarize(SummarySource::Text, &text).await?,
                    Purpose::Correction => self.correct(&text).await,
                    Purpose::Other { slot } => self.session.complete_other(slot, &text),
                }
            }
        }
        self.flush().await;
        Ok(())
    }

    pub async fn cancel_free_input(&mut self) -> bool {
        let cancelled = self.session.cancel_free_input();
        self.flush().await;
        cancelled
    }

    async fn summarize(&mut self, source: SummarySource, text: &str) -> Result<()> {
        let (loading, mode, retry, failed) = match source {
            SummarySource::Url => (READING_URL, "url", URL_RETRY, URL_FAILED),
            SummarySource::Text => (READING_TEXT, "sns", TEXT_RETRY, TEXT_FAILED),
        };
        let loading = self.session.system(Content::text(loading));
        self.flush().await;

        let result = match source {
            SummarySource::Url => self.backend.summarize_url(text).await,
            SummarySource::Text => self.backend.summarize_text(text).await,
        };
        self.session.remove_entry(loading);

        match result {
            Ok(summary) => {
                tracing::info!(mode, provenance = summary.provenance.as_str(), "Activity summarized");
                self.notice_if_degraded(summary.provenance);
                let slots = self.session.slots_mut();
                slots.set_activity_summary(summary.value);
                slots.set(SlotKey::SourceMode, mode)?;
                self.session.advance();
            }
            Err(e) if e.is_transport() => {
                tracing::warn!(mode, error = %e, "Summary service unreachable, switching to manual intake");
                self.session.system(Content::text(SUMMARY_UNREACHABLE));
                let slots = self.session.slots_mut();
                slots.clear_activity_summary();
                slots.set(SlotKey::SourceMode, "none")?;
                self.session.advance();
            }
            Err(e) => {
                tracing::warn!(mode, error = %e, "Summary failed");
                self.session.system(Content::text(failed));
                self.session.show_choices(retry);
            }
        }
        Ok(())
    }

    async fn correct(&mut self, correction: &str) {
        let loading = self.session.system(Content::text(APPLYING_CORRECTION));
        self.flush().await;

        let result = match self.session.slots().activity_summary().cloned() {
            Some(current) => self.backend.update_summary(&current, correction).await,
            None => Err(CatcherError::ValidationError("no summary to correct".into())),
        };
        self.session.remove_entry(loading);

        match result {
            Ok(updated) => {
                self.notice_if_degraded(updated.provenance);
                self.session.slots_mut().set_activity_summary(updated.value);
                if let Some(card) = summary_card(self.session.slots(), CORRECTION_APPLIED) {
                    self.session.system(card);
                }
                self.session.show_choices(CORRECTION_CONFIRM);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Summary correction failed");
                self.session.system(Content::text(CORRECTION_FAILED));
                self.session.advance();
            }
        }
    }

    // -----------------------------------------------------------------------
    // Generation
    // -----------------------------------------------------------------------

    /// Arm a cancel signal for the next [`Wizard::generate`] call.
    pub fn abort_handle(&mut self) -> AbortHandle {
        let (tx, rx) = watch::channel(false);
        self.abort = Some(rx);
        AbortHandle {
            signal: Arc::new(tx),
        }
    }

    /// Ask for the four artifacts. Only valid on the generation step. A
    /// successful run replaces earlier artifacts along with their review.
    pub async fn generate(&mut self) -> Result<GenerationOutcome> {
        self.require(None, "generate")?;
        if !self.session.at_generation() {
            return Err(CatcherError::InvalidTransition {
                state: self
                    .session
                    .current_step()
                    .map_or("not started".into(), |s| s.id.to_string()),
                action: "generate".into(),
            });
        }
        let abort = self.abort.take();

        self.scopes.enter(Scope::Loading);
        self.session.emit(RenderCommand::ClearChoices);
        self.session.emit(RenderCommand::EnterScope(Scope::Loading));
        self.session.emit(RenderCommand::GenerationPending {
            stages: &GENERATION_STAGES,
        });
        self.events.emit(SessionEvent::GenerationStarted);
        tracing::info!("Generation started");
        self.flush().await;

        let backend = Arc::clone(&self.backend);
        let slots = self.session.slots().clone();
        let request = backend.generate(&slots);
        tokio::pin!(request);
        let grace = tokio::time::sleep(self.config.cancel_grace);
        tokio::pin!(grace);
        let cancelled = aborted(abort);
        tokio::pin!(cancelled);
        let mut cancel_offered = false;

        let result = loop {
            tokio::select! {
                result = &mut request => break result,
                _ = &mut cancelled => break Err(CatcherError::Cancelled),
                _ = &mut grace, if !cancel_offered => {
                    cancel_offered = true;
                    self.renderer.render(&RenderCommand::CancelAvailable);
                }
            }
        };

        self.scopes.exit(Scope::Loading)?;
        self.session.emit(RenderCommand::GenerationDone);
        self.session.emit(RenderCommand::ExitScope(Scope::Loading));

        let outcome = match result {
            Ok(generated) => {
                let provenance = generated.provenance;
                tracing::info!(provenance = provenance.as_str(), "Generation succeeded");
                self.artifacts = Some(generated.value);
                self.provenance = Some(provenance);
                self.view = TrackedView::new();
                self.review = ReviewSession::new();
                self.events.emit(SessionEvent::GenerationSucceeded {
                    source: provenance.as_str().to_string(),
                });
                self.open_results()?;
                GenerationOutcome::Generated(provenance)
            }
            Err(e) => {
                let (reason, message, outcome) = if e.is_cancelled() {
                    ("cancelled", GENERATION_CANCELLED, GenerationOutcome::Cancelled)
                } else if e.is_transport() {
                    ("network_error", GENERATION_UNREACHABLE, GenerationOutcome::Failed)
                } else {
                    ("api_error", GENERATION_FAILED, GenerationOutcome::Failed)
                };
                tracing::warn!(reason, error = %e, "Generation did not complete");
                self.session.system(Content::text(message));
                self.session.emit(RenderCommand::GenerateButton);
                self.events.emit(SessionEvent::GenerationFailed {
                    reason: reason.to_string(),
                });
                outcome
            }
        };
        self.flush().await;
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Results
    // -----------------------------------------------------------------------

    fn artifact_view(&self, kind: ArtifactKind) -> Option<ArtifactView> {
        let artifacts = self.artifacts.as_ref()?;
        Some(ArtifactView {
            kind,
            markdown: artifacts.get(kind).to_string(),
            html: self.view.render(artifacts, kind),
            pending_marks: self.view.pending(kind),
        })
    }

    fn open_results(&mut self) -> Result<()> {
        let artifacts = self.artifacts.as_ref().ok_or(CatcherError::ArtifactsMissing)?;
        let sections = split_sections(&artifacts.messages);
        let tabs = ArtifactKind::ALL
            .into_iter()
            .filter_map(|k| self.artifact_view(k))
            .collect();
        let notice = self
            .provenance
            .filter(|p| p.is_placeholder())
            .map(|_| PLACEHOLDER_NOTICE.to_string());

        self.scopes.enter(Scope::Results);
        self.session.emit(RenderCommand::EnterScope(Scope::Results));
        self.session.emit(RenderCommand::Results {
            tabs,
            sections,
            notice,
        });
        Ok(())
    }

    pub async fn close_results(&mut self) -> Result<()> {
        self.require(Some(Scope::Results), "close results")?;
        self.scopes.exit(Scope::Results)?;
        self.session.emit(RenderCommand::ExitScope(Scope::Results));
        self.session.system(Content::text(RESULTS_CLOSED));
        self.session.emit(RenderCommand::ResultActions(vec![
            ResultAction::Reopen,
            ResultAction::Export,
            ResultAction::Chat,
        ]));
        self.flush().await;
        Ok(())
    }

    pub async fn reopen_results(&mut self) -> Result<()> {
        self.require(None, "reopen results")?;
        if self.artifacts.is_none() {
            return Err(CatcherError::ArtifactsMissing);
        }
        self.events.emit(SessionEvent::ResultsReopened);
        self.open_results()?;
        self.flush().await;
        Ok(())
    }

    /// Replace one artifact with hand-edited markdown.
    pub async fn edit_artifact(&mut self, kind: ArtifactKind, markdown: &str) -> Result<()> {
        self.require(Some(Scope::Results), "edit an artifact")?;
        let artifacts = self.artifacts.as_mut().ok_or(CatcherError::ArtifactsMissing)?;
        artifacts.set(kind, markdown);
        self.view.discard(kind);
        tracing::info!(%kind, "Artifact edited by hand");
        if let Some(view) = self.artifact_view(kind) {
            self.session.emit(RenderCommand::ArtifactUpdated(view));
        }
        self.flush().await;
        Ok(())
    }

    /// Switch the text field to open-ended questions about the results.
    pub async fn enter_free_chat(&mut self) -> Result<()> {
        self.require(None, "start chatting")?;
        if self.artifacts.is_none() {
            return Err(CatcherError::ArtifactsMissing);
        }
        self.session.system(Content::text(CHAT_INTRO));
        self.session.enter_chat(CHAT_PLACEHOLDER);
        self.session.emit(RenderCommand::ResultActions(vec![
            ResultAction::Reopen,
            ResultAction::Export,
        ]));
        self.flush().await;
        Ok(())
    }

    async fn chat(&mut self, message: String) {
        let thinking = self.session.system(Content::text(CHAT_THINKING));
        self.flush().await;

        let excerpts = match &self.artifacts {
            Some(artifacts) => CHAT_EXCERPTS
                .into_iter()
                .map(|k| {
                    let excerpt = truncate_chars(artifacts.get(k), self.config.chat_excerpt_chars);
                    (k, excerpt.to_string())
                })
                .collect(),
            None => Vec::new(),
        };
        let request = ChatRequest {
            message,
            context: self.session.slots().to_json(),
            excerpts,
        };
        let result = self.backend.chat(&request).await;
        self.session.remove_entry(thinking);

        let reply = match result {
            Ok(reply) => reply.value,
            Err(e) => {
                tracing::warn!(error = %e, "Chat failed");
                if e.is_transport() {
                    CHAT_UNREACHABLE.to_string()
                } else {
                    CHAT_FAILED.to_string()
                }
            }
        };
        self.session.system(Content::text(reply));
        self.session.emit(RenderCommand::ResultActions(vec![
            ResultAction::Reopen,
            ResultAction::Export,
        ]));
    }

    // -----------------------------------------------------------------------
    // Review
    // -----------------------------------------------------------------------

    /// Reviewable sections of the message pack.
    pub fn sections(&self) -> Vec<Section> {
        self.artifacts
            .as_ref()
            .map(|a| split_sections(&a.messages))
            .unwrap_or_default()
    }

    /// Fetch a critique for one message section and start walking it.
    /// A failed critique leaves the results exactly as they were.
    pub async fn request_review(&mut self, index: usize) -> Result<ReviewPhase> {
        self.require(Some(Scope::Results), "request a review")?;
        let artifacts = self.artifacts.clone().ok_or(CatcherError::ArtifactsMissing)?;
        let section = split_sections(&artifacts.messages)
            .into_iter()
            .nth(index)
            .ok_or(CatcherError::SectionNotFound(index))?;

        self.review.begin(&section)?;
        self.scopes.enter(Scope::Review);
        self.session.emit(RenderCommand::EnterScope(Scope::Review));
        self.session.emit(RenderCommand::ReviewLoading {
            section: index,
            title: section.title.clone(),
        });
        self.events.emit(SessionEvent::ExpertReviewStarted { section: index });
        self.flush().await;

        let request = CritiqueRequest {
            artifacts,
            section_index: index,
            section_title: section.title,
            section_text: section.text,
        };
        match self.backend.critique(&request).await {
            Ok(critique) => {
                self.notice_if_degraded(critique.provenance);
                self.review.load(critique.value)?;
                self.session.emit(RenderCommand::Reviewer {
                    persona: self.review.reviewer().cloned(),
                    suggestions: self.review.suggestions().len(),
                });
                self.present_suggestion();
            }
            Err(e) => {
                tracing::warn!(section = index, error = %e, "Critique failed");
                self.review.fail()?;
                self.scopes.exit(Scope::Review)?;
                self.session.emit(RenderCommand::ExitScope(Scope::Review));
                self.session.emit(RenderCommand::Toast(REVIEW_FAILED.to_string()));
                self.events.emit(SessionEvent::ExpertReviewFailed {
                    error: e.to_string(),
                });
            }
        }
        self.flush().await;
        Ok(self.review.phase().clone())
    }

    pub async fn review_decide(&mut self, decision: Decision) -> Result<Option<Applied>> {
        self.require(Some(Scope::Review), "decide")?;
        let kind = self.review.current().map(|(_, s)| s.tab);
        let artifacts = self.artifacts.as_mut().ok_or(CatcherError::ArtifactsMissing)?;
        let applied = self.review.decide(decision, artifacts, &mut self.view)?;

        if let (Some(kind), Some(_)) = (kind, applied) {
            if let Some(view) = self.artifact_view(kind) {
                self.session.emit(RenderCommand::ArtifactUpdated(view));
            }
        }
        self.present_suggestion();
        self.flush().await;
        Ok(applied)
    }

    /// Accept the track changes and re-render every artifact from source.
    pub async fn finalize_review(&mut self) -> Result<usize> {
        self.require(Some(Scope::Review), "finalize")?;
        let section = self.review.finalize(&mut self.view)?;
        for kind in ArtifactKind::ALL {
            if let Some(view) = self.artifact_view(kind) {
                self.session.emit(RenderCommand::ArtifactUpdated(view));
            }
        }
        self.close_review(section)?;
        self.flush().await;
        Ok(section)
    }

    /// Leave the review. Applied decisions stay.
    pub async fn skip_review(&mut self) -> Result<usize> {
        self.require(Some(Scope::Review), "skip")?;
        let section = self.review.skip()?;
        self.close_review(section)?;
        self.flush().await;
        Ok(section)
    }

    fn close_review(&mut self, section: usize) -> Result<()> {
        self.scopes.exit(Scope::Review)?;
        self.session.emit(RenderCommand::ExitScope(Scope::Review));
        self.session.emit(RenderCommand::ReviewClosed {
            section,
            reviewed: self.review.reviewed_sections().collect(),
        });
        Ok(())
    }

    fn present_suggestion(&mut self) {
        let total = self.review.suggestions().len();
        if let Some((position, suggestion)) = self.review.current() {
            let suggestion = suggestion.clone();
            self.session.emit(RenderCommand::Suggestion {
                position,
                total,
                suggestion,
            });
        } else if *self.review.phase() == ReviewPhase::Complete {
            let summary = self.review.summary();
            self.events.emit(SessionEvent::ExpertReviewCompleted {
                accepted: summary.accepted,
                rejected: summary.rejected,
            });
            self.session.emit(RenderCommand::ReviewComplete {
                summary,
                message: summary.message(),
            });
        }
    }

    // -----------------------------------------------------------------------
    // Export
    // -----------------------------------------------------------------------

    pub fn export_markdown(&self, generated_on: chrono::NaiveDate) -> Result<String> {
        self.artifacts
            .as_ref()
            .map(|a| a.to_combined_markdown(generated_on))
            .ok_or(CatcherError::ArtifactsMissing)
    }

    pub fn bundle(&self) -> Result<ArtifactBundle> {
        let artifacts = self.artifacts.clone().ok_or(CatcherError::ArtifactsMissing)?;
        Ok(ArtifactBundle::new(
            artifacts,
            self.provenance.unwrap_or(Provenance::Mock),
        ))
    }

    /// Load previously exported artifacts and show them.
    pub async fn open_bundle(&mut self, bundle: ArtifactBundle) -> Result<()> {
        self.require(None, "open a bundle")?;
        self.artifacts = Some(bundle.artifacts);
        self.provenance = Some(bundle.provenance);
        self.view = TrackedView::new();
        self.review = ReviewSession::new();
        self.open_results()?;
        self.flush().await;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    fn require(&self, scope: Option<Scope>, action: &str) -> Result<()> {
        if self.scopes.accepts(scope) {
            return Ok(());
        }
        Err(CatcherError::InvalidTransition {
            state: self
                .scopes
                .top()
                .map_or("conversation".to_string(), |s| format!("{s:?}").to_lowercase()),
            action: action.to_string(),
        })
    }

    fn notice_if_degraded(&mut self, provenance: Provenance) {
        if provenance.is_degraded() {
            self.session.emit(RenderCommand::Notice(DEGRADED_NOTICE.to_string()));
        }
    }

    /// Hand queued commands to the renderer, pausing after each typing
    /// indicator.
    async fn flush(&mut self) {
        for command in self.session.drain() {
            self.renderer.render(&command);
            if command == RenderCommand::Typing {
                let pause = self.config.thinking.sample();
                if !pause.is_zero() {
                    tokio::time::sleep(pause).await;
                }
            }
        }
    }
}
