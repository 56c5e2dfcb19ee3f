//! Staged query pipeline
//!
//! A run walks retrieve → analyze → draft → (critique → refine)* and reports
//! through a bounded channel: one progress label before each stage, then
//! exactly one terminal [`Outcome`]. The runner never touches the HTTP
//! response; the server forwards the channel to the client.

pub mod critique;
pub mod stage;

pub use critique::Verdict;
pub use stage::{PipelineState, Stage};

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::Error;
use crate::generation::{KbProfile, PromptBuilder};
use crate::providers::{Generator, Retriever};
use crate::types::{Outcome, QueryRequest, SourceRef, StreamEvent};

/// Why a run stopped early
enum Halt {
    /// The event receiver went away
    Cancelled,
    /// A stage failed
    Failed(Error),
}

impl From<Error> for Halt {
    fn from(e: Error) -> Self {
        Halt::Failed(e)
    }
}

/// Executes pipeline runs against shared collaborators
pub struct StageRunner {
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn Generator>,
    config: PipelineConfig,
}

impl StageRunner {
    /// Create a new runner
    pub fn new(
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn Generator>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            retriever,
            generator,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Start a run on its own task and return its event stream
    pub fn spawn(self: &Arc<Self>, request: QueryRequest) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(self.config.event_buffer.max(1));
        let runner = Arc::clone(self);
        tokio::spawn(async move {
            runner.run(request, tx).await;
        });
        rx
    }

    /// Execute one run to completion, sending its events on `tx`
    ///
    /// Returns the final state: `Complete` after a `complete` event, `Failed`
    /// after an `error` event or when the receiver was dropped.
    pub async fn run(&self, request: QueryRequest, tx: mpsc::Sender<StreamEvent>) -> PipelineState {
        let request_id = Uuid::new_v4();
        tracing::info!(
            "Pipeline {} started (kb: {}, doc_id: {:?})",
            request_id,
            request.kb,
            request.doc_id
        );

        let mut run = Run {
            id: request_id,
            runner: self,
            request: &request,
            tx: &tx,
            state: PipelineState::Idle,
        };

        let limit = self.config.request_timeout_secs;
        let result = match timeout(
            Duration::from_secs(limit),
            AssertUnwindSafe(run.execute()).catch_unwind(),
        )
        .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(Halt::Failed(Error::internal(format!(
                "Pipeline panicked: {}",
                panic_message(&*panic)
            )))),
            Err(_) => Err(Halt::Failed(Error::Timeout(limit))),
        };

        match result {
            Ok(outcome) => {
                run.transition(PipelineState::Complete);
                tracing::info!("Pipeline {} complete", request_id);
                let _ = tx.send(StreamEvent::Done(outcome)).await;
            }
            Err(Halt::Cancelled) => {
                tracing::info!(
                    "Pipeline {} cancelled during {:?}: client disconnected",
                    request_id,
                    run.state
                );
                run.transition(PipelineState::Failed);
            }
            Err(Halt::Failed(e)) => {
                tracing::warn!("Pipeline {} failed during {:?}: {}", request_id, run.state, e);
                run.transition(PipelineState::Failed);
                let _ = tx.send(StreamEvent::Done(Outcome::error(e.to_string()))).await;
            }
        }

        run.state
    }
}

/// State of a single run
struct Run<'a> {
    id: Uuid,
    runner: &'a StageRunner,
    request: &'a QueryRequest,
    tx: &'a mpsc::Sender<StreamEvent>,
    state: PipelineState,
}

impl Run<'_> {
    fn transition(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::debug!("Pipeline {}: {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
    }

    /// Announce a stage, or stop if nobody is listening anymore
    async fn enter(&mut self, stage: Stage) -> Result<(), Halt> {
        if self.tx.is_closed() {
            return Err(Halt::Cancelled);
        }
        self.transition(stage.state());
        self.tx
            .send(StreamEvent::Progress(stage.label().to_string()))
            .await
            .map_err(|_| Halt::Cancelled)
    }

    async fn execute(&mut self) -> Result<Outcome, Halt> {
        let runner = self.runner;
        let request = self.request;
        let generator = &runner.generator;
        let profile = KbProfile::from_kb(&request.kb);

        self.enter(Stage::Retrieve).await?;
        let chunks = runner
            .retriever
            .retrieve(
                &request.kb,
                &request.prompt,
                request.doc_id.as_deref(),
                runner.config.top_k,
            )
            .await?;
        tracing::debug!("Pipeline {}: retrieved {} chunks", self.id, chunks.len());

        self.enter(Stage::Analyze).await?;
        let mut summaries = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let summary = generator
                .generate(
                    PromptBuilder::ANALYST_SYSTEM,
                    &PromptBuilder::analyze_prompt(profile, &chunk.text),
                )
                .await?;
            summaries.push(summary);
        }
        let context = PromptBuilder::build_context(&summaries);

        self.enter(Stage::Draft).await?;
        let mut draft = generator
            .generate(
                profile.system_prompt(),
                &PromptBuilder::draft_prompt(&request.prompt, &context),
            )
            .await?;

        let refine_system = PromptBuilder::refine_system(profile);
        for round in 1..=runner.config.max_refine_rounds.max(1) {
            self.enter(Stage::Critique).await?;
            let critique = generator
                .generate(
                    PromptBuilder::CRITIC_SYSTEM,
                    &PromptBuilder::critique_prompt(&request.prompt, &context, &draft),
                )
                .await?;

            let verdict = Verdict::parse(&critique);
            tracing::debug!("Pipeline {}: round {} verdict {:?}", self.id, round, verdict);
            // The first draft is always refined once.
            if round > 1 && verdict.is_approved() {
                break;
            }

            self.enter(Stage::Refine).await?;
            let refined = generator
                .generate(
                    &refine_system,
                    &PromptBuilder::refine_prompt(&request.prompt, &context, &draft, &critique),
                )
                .await?;

            if refined.trim().is_empty() {
                tracing::warn!(
                    "Pipeline {}: refine round {} returned no text, keeping previous draft",
                    self.id,
                    round
                );
            } else {
                draft = refined;
            }
        }

        let sources: Vec<SourceRef> = chunks.into_iter().map(|c| c.source).collect();
        Ok(Outcome::Complete {
            answer: draft,
            sources,
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{GROUNDING_RULE, NO_SOURCES};
    use crate::generation::prompt::REFINE_INSTRUCTION;
    use crate::providers::RetrievedChunk;
    use crate::error::Result;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Analyze,
        Draft,
        Critique,
        Refine,
    }

    fn classify(system: &str) -> Call {
        if system == PromptBuilder::ANALYST_SYSTEM {
            Call::Analyze
        } else if system == PromptBuilder::CRITIC_SYSTEM {
            Call::Critique
        } else if system.ends_with(REFINE_INSTRUCTION) {
            Call::Refine
        } else {
            Call::Draft
        }
    }

    /// Generator answering by stage with canned replies
    struct ScriptedGenerator {
        critique: String,
        refine: String,
        fail_on: Option<Call>,
        panic_on: Option<Call>,
        stall_on: Option<Call>,
        calls: Mutex<Vec<(Call, String)>>,
    }

    impl ScriptedGenerator {
        fn new() -> Self {
            Self {
                critique: "NEEDS IMPROVEMENT\nAdd more detail.".to_string(),
                refine: "refined answer".to_string(),
                fail_on: None,
                panic_on: None,
                stall_on: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn count(&self, call: Call) -> usize {
            self.calls.lock().iter().filter(|(c, _)| *c == call).count()
        }

        fn prompts(&self, call: Call) -> Vec<String> {
            self.calls
                .lock()
                .iter()
                .filter(|(c, _)| *c == call)
                .map(|(_, p)| p.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn generate(&self, system: &str, prompt: &str) -> Result<String> {
            let call = classify(system);
            self.calls.lock().push((call, prompt.to_string()));

            if self.stall_on == Some(call) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.panic_on == Some(call) {
                panic!("generator blew up");
            }
            if self.fail_on == Some(call) {
                return Err(Error::llm("quota exceeded"));
            }

            Ok(match call {
                Call::Analyze => format!("summary of: {}", prompt.lines().last().unwrap_or("")),
                Call::Draft => "first draft".to_string(),
                Call::Critique => self.critique.clone(),
                Call::Refine => self.refine.clone(),
            })
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    struct FixedRetriever {
        chunks: Vec<RetrievedChunk>,
        calls: Mutex<Vec<(String, Option<String>, usize)>>,
    }

    impl FixedRetriever {
        fn new(chunks: Vec<RetrievedChunk>) -> Self {
            Self {
                chunks,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn retrieve(
            &self,
            kb: &str,
            _query: &str,
            document_id: Option<&str>,
            top_k: usize,
        ) -> Result<Vec<RetrievedChunk>> {
            self.calls
                .lock()
                .push((kb.to_string(), document_id.map(str::to_string), top_k));
            if kb == "missing" {
                return Err(Error::KnowledgeBaseNotFound(kb.to_string()));
            }
            Ok(self.chunks.iter().take(top_k).cloned().collect())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    /// Drops the event receiver while retrieval is in flight
    struct DisconnectingRetriever {
        receiver: Mutex<Option<mpsc::Receiver<StreamEvent>>>,
    }

    #[async_trait]
    impl Retriever for DisconnectingRetriever {
        async fn retrieve(
            &self,
            _kb: &str,
            _query: &str,
            _document_id: Option<&str>,
            _top_k: usize,
        ) -> Result<Vec<RetrievedChunk>> {
            drop(self.receiver.lock().take());
            Ok(vec![chunk("oatmeal.md", 0, "Oats.")])
        }

        fn name(&self) -> &str {
            "disconnecting"
        }
    }

    fn chunk(source: &str, index: u32, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            text: text.to_string(),
            source: SourceRef {
                document_id: format!("doc-{}", source),
                source: source.to_string(),
                content_type: "text/markdown".to_string(),
                chunk_index: index,
                title: source.to_string(),
                pages: None,
            },
            similarity: 0.9,
        }
    }

    fn runner(
        retriever: Arc<dyn Retriever>,
        generator: Arc<ScriptedGenerator>,
        config: PipelineConfig,
    ) -> Arc<StageRunner> {
        Arc::new(StageRunner::new(retriever, generator, config))
    }

    async fn collect(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn labels(events: &[StreamEvent]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Progress(label) => Some(label.as_str()),
                StreamEvent::Done(_) => None,
            })
            .collect()
    }

    fn assert_single_terminal_last(events: &[StreamEvent]) {
        let terminals = events.iter().filter(|e| e.is_terminal()).count();
        assert_eq!(terminals, 1, "events: {:?}", events);
        assert!(events.last().map(StreamEvent::is_terminal).unwrap_or(false));
    }

    fn outcome(events: &[StreamEvent]) -> &Outcome {
        match events.last() {
            Some(StreamEvent::Done(outcome)) => outcome,
            other => panic!("expected terminal event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let retriever = Arc::new(FixedRetriever::new(vec![
            chunk("a.md", 0, "Alpha."),
            chunk("b.md", 3, "Beta."),
        ]));
        let generator = Arc::new(ScriptedGenerator::new());
        let runner = runner(retriever.clone(), generator.clone(), PipelineConfig::default());

        let events = collect(runner.spawn(QueryRequest::new("api_docs", "how do I auth?"))).await;

        assert_single_terminal_last(&events);
        assert_eq!(
            labels(&events),
            vec![
                Stage::Retrieve.label(),
                Stage::Analyze.label(),
                Stage::Draft.label(),
                Stage::Critique.label(),
                Stage::Refine.label(),
                Stage::Critique.label(),
                Stage::Refine.label(),
            ]
        );
        match outcome(&events) {
            Outcome::Complete { answer, sources } => {
                assert_eq!(answer, "refined answer");
                let order: Vec<_> = sources.iter().map(|s| (s.source.as_str(), s.chunk_index)).collect();
                assert_eq!(order, vec![("a.md", 0), ("b.md", 3)]);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(generator.count(Call::Analyze), 2);
        assert_eq!(retriever.calls.lock()[0], ("api_docs".to_string(), None, 5));
    }

    #[tokio::test]
    async fn test_run_reports_complete_state() {
        let generator = Arc::new(ScriptedGenerator::new());
        let runner = runner(Arc::new(FixedRetriever::new(vec![])), generator, PipelineConfig::default());
        let (tx, rx) = mpsc::channel(16);

        let state = runner.run(QueryRequest::new("recipes", "anything"), tx).await;
        assert_eq!(state, PipelineState::Complete);
        assert_single_terminal_last(&collect(rx).await);
    }

    #[tokio::test]
    async fn test_empty_retrieval_still_completes() {
        let generator = Arc::new(ScriptedGenerator::new());
        let runner = runner(
            Arc::new(FixedRetriever::new(vec![])),
            generator.clone(),
            PipelineConfig::default(),
        );

        let events = collect(runner.spawn(QueryRequest::new("resumes", "rust skills?"))).await;

        assert_single_terminal_last(&events);
        assert!(matches!(outcome(&events), Outcome::Complete { sources, .. } if sources.is_empty()));
        assert_eq!(labels(&events)[1], Stage::Analyze.label());
        assert_eq!(generator.count(Call::Analyze), 0);
        assert!(generator.prompts(Call::Draft)[0].contains(NO_SOURCES));
    }

    #[tokio::test]
    async fn test_critique_rounds_are_bounded() {
        let generator = Arc::new(ScriptedGenerator::new());
        let config = PipelineConfig {
            max_refine_rounds: 3,
            ..PipelineConfig::default()
        };
        let runner = runner(
            Arc::new(FixedRetriever::new(vec![chunk("a.md", 0, "Alpha.")])),
            generator.clone(),
            config,
        );

        let events = collect(runner.spawn(QueryRequest::new("recipes", "improve it"))).await;

        assert_single_terminal_last(&events);
        assert_eq!(generator.count(Call::Critique), 3);
        assert_eq!(generator.count(Call::Refine), 3);
        assert!(outcome(&events).is_complete());
    }

    #[tokio::test]
    async fn test_approval_ends_loop_after_first_refine() {
        let mut generator = ScriptedGenerator::new();
        generator.critique = "APPROVED\nNothing to add.".to_string();
        let generator = Arc::new(generator);
        let runner = runner(
            Arc::new(FixedRetriever::new(vec![chunk("a.md", 0, "Alpha.")])),
            generator.clone(),
            PipelineConfig::default(),
        );

        let events = collect(runner.spawn(QueryRequest::new("recipes", "improve it"))).await;

        assert_eq!(
            &labels(&events)[2..],
            &[
                Stage::Draft.label(),
                Stage::Critique.label(),
                Stage::Refine.label(),
                Stage::Critique.label(),
            ]
        );
        assert_eq!(generator.count(Call::Refine), 1);
        assert!(matches!(outcome(&events), Outcome::Complete { answer, .. } if answer == "refined answer"));
    }

    #[tokio::test]
    async fn test_blank_refine_keeps_previous_draft() {
        let mut generator = ScriptedGenerator::new();
        generator.refine = "   \n".to_string();
        let generator = Arc::new(generator);
        let runner = runner(
            Arc::new(FixedRetriever::new(vec![])),
            generator.clone(),
            PipelineConfig::default(),
        );

        let events = collect(runner.spawn(QueryRequest::new("recipes", "x"))).await;

        assert!(matches!(outcome(&events), Outcome::Complete { answer, .. } if answer == "first draft"));
    }

    #[tokio::test]
    async fn test_draft_failure_stops_after_draft_label() {
        let mut generator = ScriptedGenerator::new();
        generator.fail_on = Some(Call::Draft);
        let generator = Arc::new(generator);
        let runner = runner(
            Arc::new(FixedRetriever::new(vec![chunk("a.md", 0, "Alpha.")])),
            generator.clone(),
            PipelineConfig::default(),
        );

        let events = collect(runner.spawn(QueryRequest::new("recipes", "x"))).await;

        assert_single_terminal_last(&events);
        assert_eq!(
            labels(&events),
            vec![Stage::Retrieve.label(), Stage::Analyze.label(), Stage::Draft.label()]
        );
        assert!(matches!(outcome(&events), Outcome::Error { message } if message.contains("quota exceeded")));
        assert_eq!(generator.count(Call::Critique), 0);
    }

    #[tokio::test]
    async fn test_retrieval_error_is_terminal() {
        let generator = Arc::new(ScriptedGenerator::new());
        let runner = runner(
            Arc::new(FixedRetriever::new(vec![])),
            generator.clone(),
            PipelineConfig::default(),
        );

        let events = collect(runner.spawn(QueryRequest::new("missing", "x"))).await;

        assert_eq!(events.len(), 2);
        assert_eq!(labels(&events), vec![Stage::Retrieve.label()]);
        assert!(matches!(outcome(&events), Outcome::Error { message } if message.contains("missing")));
        assert!(generator.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_ungrounded_query_reaches_draft_with_rule() {
        let oatmeal = "Overnight oats: combine rolled oats, milk, and chia seeds; refrigerate overnight.";
        let generator = Arc::new(ScriptedGenerator::new());
        let retriever = Arc::new(FixedRetriever::new(vec![chunk("oatmeal.md", 0, oatmeal)]));
        let runner = runner(retriever.clone(), generator.clone(), PipelineConfig::default());

        let request = QueryRequest::new("recipes", "suggest a sandwich").with_document("doc-oatmeal.md");
        let events = collect(runner.spawn(request)).await;

        assert!(outcome(&events).is_complete());
        let draft = &generator.prompts(Call::Draft)[0];
        assert!(draft.contains(GROUNDING_RULE));
        assert!(draft.contains(oatmeal));
        assert!(draft.contains("suggest a sandwich"));
        assert_eq!(retriever.calls.lock()[0].1.as_deref(), Some("doc-oatmeal.md"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_becomes_error_event() {
        let mut generator = ScriptedGenerator::new();
        generator.stall_on = Some(Call::Draft);
        let config = PipelineConfig {
            request_timeout_secs: 5,
            ..PipelineConfig::default()
        };
        let runner = runner(
            Arc::new(FixedRetriever::new(vec![])),
            Arc::new(generator),
            config,
        );

        let events = collect(runner.spawn(QueryRequest::new("recipes", "x"))).await;

        assert_single_terminal_last(&events);
        assert!(matches!(
            outcome(&events),
            Outcome::Error { message } if message == "Request timed out after 5s"
        ));
    }

    #[tokio::test]
    async fn test_panic_becomes_error_event() {
        let mut generator = ScriptedGenerator::new();
        generator.panic_on = Some(Call::Critique);
        let runner = runner(
            Arc::new(FixedRetriever::new(vec![])),
            Arc::new(generator),
            PipelineConfig::default(),
        );
        let (tx, rx) = mpsc::channel(16);

        let state = runner.run(QueryRequest::new("recipes", "x"), tx).await;
        let events = collect(rx).await;

        assert_eq!(state, PipelineState::Failed);
        assert_single_terminal_last(&events);
        assert!(matches!(
            outcome(&events),
            Outcome::Error { message } if message.contains("generator blew up")
        ));
    }

    #[tokio::test]
    async fn test_disconnect_stops_before_next_stage() {
        let generator = Arc::new(ScriptedGenerator::new());
        let (tx, rx) = mpsc::channel(16);
        let retriever = Arc::new(DisconnectingRetriever {
            receiver: Mutex::new(Some(rx)),
        });
        let runner = runner(retriever, generator.clone(), PipelineConfig::default());

        let state = runner.run(QueryRequest::new("recipes", "x"), tx).await;

        assert_eq!(state, PipelineState::Failed);
        assert!(generator.calls.lock().is_empty());
    }
}
