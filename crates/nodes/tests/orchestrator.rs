//! End-to-end orchestrator behaviour over hand-written stub ports.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nodes::{
    DetectionNormalizer, Instructions, Orchestrator, PipelineSettings, RetryConfig, StageRunner,
};
use pipeline::{
    ChatRequest, Classification, Clock, DetectionPolicy, DetectionService, Identity, LlmProvider,
    Message, ModelId, PipelineError, PipelineOutcome, PipelineRequest, PriceId, ProviderError,
    QuotaGate, Role, StoreError, SubscriptionOracle, SubscriptionRecord, SubscriptionStore,
    Timestamp, UpstreamService, UsageStore,
};
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Stubs
// ---------------------------------------------------------------------------

/// Replays scripted replies in order and records every request.
#[derive(Default)]
struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<Value, ProviderError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedLlm {
    fn with(replies: Vec<Result<Value, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::default(),
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, index: usize) -> ChatRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<Value, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Transport("no scripted reply".into())))
    }
}

struct ScriptedDetector {
    reply: Result<Value, ProviderError>,
    calls: AtomicU32,
}

impl ScriptedDetector {
    fn with(reply: Result<Value, ProviderError>) -> Self {
        Self {
            reply,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl DetectionService for ScriptedDetector {
    fn name(&self) -> &str {
        "scripted-detector"
    }

    async fn detect(&self, _text: &str) -> Result<Value, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone()
    }
}

#[derive(Default)]
struct CountingUsage {
    counts: Mutex<HashMap<String, u32>>,
    increments: AtomicU32,
    fail_increment: bool,
}

impl CountingUsage {
    fn seeded(identity: &str, count: u32) -> Self {
        let usage = Self::default();
        usage.counts.lock().unwrap().insert(identity.into(), count);
        usage
    }

    fn increments(&self) -> u32 {
        self.increments.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UsageStore for CountingUsage {
    async fn count(&self, identity: &Identity) -> Result<u32, StoreError> {
        Ok(*self.counts.lock().unwrap().get(identity.as_str()).unwrap_or(&0))
    }

    async fn increment(&self, identity: &Identity, ceiling: u32) -> Result<u32, StoreError> {
        self.increments.fetch_add(1, Ordering::SeqCst);
        if self.fail_increment {
            return Err(StoreError::Backend("disk full".into()));
        }
        let mut counts = self.counts.lock().unwrap();
        let entry = counts.entry(identity.to_string()).or_insert(0);
        *entry = (*entry + 1).min(ceiling);
        Ok(*entry)
    }
}

#[derive(Default)]
struct MapSubscriptions(HashMap<String, SubscriptionRecord>);

#[async_trait]
impl SubscriptionStore for MapSubscriptions {
    async fn find(&self, identity: &Identity) -> Result<Option<SubscriptionRecord>, StoreError> {
        Ok(self.0.get(identity.as_str()).cloned())
    }
}

struct FixedClock(Timestamp);

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

const NOW_MS: i64 = 1_760_000_000_000;
const DAY_MS: i64 = 86_400_000;
const LIMIT: u32 = 5;

struct Harness {
    llm: Arc<ScriptedLlm>,
    detector: Arc<ScriptedDetector>,
    usage: Arc<CountingUsage>,
    orchestrator: Orchestrator,
}

struct Setup {
    llm: ScriptedLlm,
    detector: ScriptedDetector,
    usage: CountingUsage,
    subscriptions: MapSubscriptions,
    detection_policy: DetectionPolicy,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            llm: ScriptedLlm::default(),
            detector: ScriptedDetector::with(Ok(json!({}))),
            usage: CountingUsage::default(),
            subscriptions: MapSubscriptions::default(),
            detection_policy: DetectionPolicy::Free,
        }
    }
}

impl Setup {
    fn build(self) -> Harness {
        let llm = Arc::new(self.llm);
        let detector = Arc::new(self.detector);
        let usage = Arc::new(self.usage);
        let retry = RetryConfig {
            max_attempts: 3,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        };
        let clock = Arc::new(FixedClock(Timestamp::from_epoch_millis(NOW_MS).unwrap()));

        let orchestrator = Orchestrator::new(
            SubscriptionOracle::new(Arc::new(self.subscriptions), clock),
            QuotaGate::new(usage.clone(), LIMIT),
            StageRunner::new(llm.clone(), retry.clone()),
            DetectionNormalizer::new(detector.clone(), retry),
            PipelineSettings {
                generate_model: ModelId::new("gpt-rewrite").unwrap(),
                translate_model: ModelId::new("gpt-translate").unwrap(),
                instructions: Instructions::default(),
                detection_policy: self.detection_policy,
            },
        );

        Harness {
            llm,
            detector,
            usage,
            orchestrator,
        }
    }
}

fn completion(text: &str) -> Result<Value, ProviderError> {
    Ok(json!({
        "id": "chatcmpl-1",
        "choices": [{"message": {"role": "assistant", "content": text}, "finish_reason": "stop"}]
    }))
}

fn detection_body() -> Value {
    json!({
        "documents": [{
            "predicted_class": "ai",
            "confidence_category": "high",
            "confidence_score": 0.97,
            "sentences": [
                {"sentence": "S1", "generated_prob": 0.9},
                {"sentence": "S2", "generated_prob": 0.8},
                {"sentence": "S3", "generated_prob": 0.1}
            ]
        }]
    })
}

fn user() -> Option<Identity> {
    Identity::new("user_1")
}

fn subscribed(period_end_ms: i64) -> MapSubscriptions {
    let mut map = HashMap::new();
    map.insert(
        "user_1".to_owned(),
        SubscriptionRecord {
            identity: Identity::new("user_1").unwrap(),
            current_period_end: Timestamp::from_epoch_millis(period_end_ms),
            price_id: PriceId::new("price_pro"),
            customer_id: None,
            subscription_id: None,
        },
    );
    MapSubscriptions(map)
}

fn hello() -> Vec<Message> {
    vec![Message::user("Hello world")]
}

// ---------------------------------------------------------------------------
// Happy paths
// ---------------------------------------------------------------------------

#[tokio::test]
async fn generate_then_translate_returns_both_texts_and_charges_once() {
    let h = Setup {
        llm: ScriptedLlm::with(vec![completion("Bonjour monde"), completion("你好世界")]),
        ..Setup::default()
    }
    .build();

    let outcome = h
        .orchestrator
        .run(
            user(),
            PipelineRequest::GenerateThenTranslate {
                messages: hello(),
                target_language: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(
        outcome,
        PipelineOutcome::Translated {
            original_text: "Bonjour monde".into(),
            translated_text: "你好世界".into(),
        }
    );
    assert_eq!(
        serde_json::to_value(&outcome).unwrap(),
        json!({"originalText": "Bonjour monde", "translatedText": "你好世界"})
    );
    assert_eq!(h.usage.increments(), 1);
    assert_eq!(h.llm.calls(), 2);

    // Stage two translates stage one's output with the translate model.
    let second = h.llm.request(1);
    assert_eq!(second.model.as_str(), "gpt-translate");
    let messages = second.messages.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::System);
    assert!(messages[0].content.contains("Chinese"));
    assert_eq!(messages[1], Message::user("Bonjour monde"));
}

#[tokio::test]
async fn generate_prepends_instruction_exactly_once() {
    let h = Setup {
        llm: ScriptedLlm::with(vec![completion("rewritten"), completion("rewritten again")]),
        ..Setup::default()
    }
    .build();
    let instruction = Instructions::default().rewrite;
    let caller = vec![Message::system(instruction.clone()), Message::user("draft")];
    let before = caller.clone();

    for _ in 0..2 {
        h.orchestrator
            .run(
                user(),
                PipelineRequest::Generate {
                    messages: caller.clone(),
                },
            )
            .await
            .unwrap();
    }

    assert_eq!(caller, before);
    for index in 0..2 {
        let request = h.llm.request(index);
        let systems: Vec<_> = request
            .messages
            .messages()
            .iter()
            .filter(|m| m.role == Role::System)
            .collect();
        assert_eq!(systems.len(), 1);
        assert_eq!(request.messages.messages()[0].content, instruction);
        assert_eq!(request.model.as_str(), "gpt-rewrite");
    }
}

#[tokio::test]
async fn translate_only_uses_requested_language() {
    let h = Setup {
        llm: ScriptedLlm::with(vec![completion("Hallo Welt")]),
        ..Setup::default()
    }
    .build();

    let outcome = h
        .orchestrator
        .run(
            user(),
            PipelineRequest::TranslateOnly {
                text: "Hello world".into(),
                target_language: Some("German".into()),
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome, PipelineOutcome::Text { text: "Hallo Welt".into() });
    assert!(h.llm.request(0).messages.messages()[0].content.contains("German"));
    assert_eq!(h.usage.increments(), 1);
}

#[tokio::test]
async fn detect_is_free_by_default() {
    let h = Setup {
        detector: ScriptedDetector::with(Ok(detection_body())),
        usage: CountingUsage::seeded("user_1", LIMIT),
        ..Setup::default()
    }
    .build();

    let outcome = h
        .orchestrator
        .run(user(), PipelineRequest::Detect { text: "Some essay.".into() })
        .await
        .unwrap();

    let PipelineOutcome::Findings(findings) = outcome else {
        panic!("expected findings");
    };
    let sentences: Vec<_> = findings.iter().map(|f| f.sentence.as_str()).collect();
    assert_eq!(sentences, ["S1", "S2", "S3"]);
    assert!(findings.iter().all(|f| f.classification == Classification::Ai));
    assert_eq!(h.usage.increments(), 0);
}

#[tokio::test]
async fn metered_detection_is_gated_and_charged() {
    let h = Setup {
        detector: ScriptedDetector::with(Ok(detection_body())),
        detection_policy: DetectionPolicy::Metered,
        ..Setup::default()
    }
    .build();

    h.orchestrator
        .run(user(), PipelineRequest::Detect { text: "Some essay.".into() })
        .await
        .unwrap();
    assert_eq!(h.usage.increments(), 1);

    let exhausted = Setup {
        detector: ScriptedDetector::with(Ok(detection_body())),
        usage: CountingUsage::seeded("user_1", LIMIT),
        detection_policy: DetectionPolicy::Metered,
        ..Setup::default()
    }
    .build();
    let err = exhausted
        .orchestrator
        .run(user(), PipelineRequest::Detect { text: "Some essay.".into() })
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::QuotaExceeded { .. }));
    assert_eq!(exhausted.detector.calls.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Authorization
// ---------------------------------------------------------------------------

#[tokio::test]
async fn quota_exhausted_is_refused_before_any_upstream_call() {
    let h = Setup {
        llm: ScriptedLlm::with(vec![completion("never")]),
        usage: CountingUsage::seeded("user_1", LIMIT),
        ..Setup::default()
    }
    .build();

    let err = h
        .orchestrator
        .run(user(), PipelineRequest::Generate { messages: hello() })
        .await
        .unwrap_err();

    assert_eq!(
        err,
        PipelineError::QuotaExceeded {
            identity: Identity::new("user_1").unwrap(),
            limit: LIMIT,
        }
    );
    assert_eq!(err.status_code(), 403);
    assert_eq!(h.llm.calls(), 0);
    assert_eq!(h.usage.increments(), 0);
}

#[tokio::test]
async fn entitled_identity_is_never_charged_even_over_the_limit() {
    let h = Setup {
        llm: ScriptedLlm::with(vec![completion("a"), completion("b")]),
        usage: CountingUsage::seeded("user_1", LIMIT + 10),
        subscriptions: subscribed(NOW_MS + 30 * DAY_MS),
        ..Setup::default()
    }
    .build();

    for _ in 0..2 {
        h.orchestrator
            .run(user(), PipelineRequest::Generate { messages: hello() })
            .await
            .unwrap();
    }
    assert_eq!(h.usage.increments(), 0);
}

#[tokio::test]
async fn lapsed_subscription_falls_back_to_quota() {
    let h = Setup {
        llm: ScriptedLlm::with(vec![completion("never")]),
        usage: CountingUsage::seeded("user_1", LIMIT),
        subscriptions: subscribed(NOW_MS - 2 * DAY_MS),
        ..Setup::default()
    }
    .build();

    let err = h
        .orchestrator
        .run(user(), PipelineRequest::Generate { messages: hello() })
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::QuotaExceeded { .. }));
}

#[tokio::test]
async fn missing_identity_is_unauthorized_before_validation() {
    let h = Setup::default().build();
    let err = h
        .orchestrator
        .run(None, PipelineRequest::Generate { messages: vec![] })
        .await
        .unwrap_err();
    assert_eq!(err, PipelineError::Unauthorized);
    assert_eq!(h.llm.calls(), 0);
}

#[tokio::test]
async fn invalid_payload_is_rejected_without_upstream_calls() {
    let h = Setup::default().build();

    let err = h
        .orchestrator
        .run(user(), PipelineRequest::Generate { messages: vec![] })
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);

    let err = h
        .orchestrator
        .run(user(), PipelineRequest::Detect { text: "   ".into() })
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidRequest { .. }));

    assert_eq!(h.llm.calls(), 0);
    assert_eq!(h.detector.calls.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Failures never charge
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stage_two_failure_discards_stage_one() {
    let h = Setup {
        llm: ScriptedLlm::with(vec![
            completion("Bonjour monde"),
            Err(ProviderError::Transport("HTTP 500 Internal Server Error: boom".into())),
        ]),
        ..Setup::default()
    }
    .build();

    let err = h
        .orchestrator
        .run(
            user(),
            PipelineRequest::GenerateThenTranslate {
                messages: hello(),
                target_language: Some("French".into()),
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::UpstreamError { service: UpstreamService::Llm, .. }
    ));
    assert_eq!(err.status_code(), 502);
    assert_eq!(h.usage.increments(), 0);
}

#[tokio::test]
async fn empty_llm_reply_is_invalid_response() {
    let h = Setup {
        llm: ScriptedLlm::with(vec![Ok(json!({}))]),
        ..Setup::default()
    }
    .build();

    let err = h
        .orchestrator
        .run(user(), PipelineRequest::Generate { messages: hello() })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::UpstreamInvalidResponse { service: UpstreamService::Llm, .. }
    ));
    assert_eq!(err.status_code(), 500);
    assert_eq!(h.usage.increments(), 0);
}

#[tokio::test]
async fn blank_llm_content_is_not_coerced_to_empty_text() {
    let h = Setup {
        llm: ScriptedLlm::with(vec![completion("")]),
        ..Setup::default()
    }
    .build();

    let err = h
        .orchestrator
        .run(user(), PipelineRequest::Generate { messages: hello() })
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::UpstreamInvalidResponse { .. }));
}

#[tokio::test]
async fn persistent_throttling_becomes_upstream_error_after_three_calls() {
    let throttled = || Err(ProviderError::Throttled { retry_after: None });
    let h = Setup {
        llm: ScriptedLlm::with(vec![throttled(), throttled(), throttled(), completion("late")]),
        ..Setup::default()
    }
    .build();

    let err = h
        .orchestrator
        .run(user(), PipelineRequest::Generate { messages: hello() })
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::UpstreamError { .. }));
    assert_eq!(h.llm.calls(), 3);
    assert_eq!(h.usage.increments(), 0);
}

#[tokio::test]
async fn transient_throttling_is_absorbed() {
    let h = Setup {
        llm: ScriptedLlm::with(vec![
            Err(ProviderError::Throttled { retry_after: None }),
            completion("ok"),
        ]),
        ..Setup::default()
    }
    .build();

    let outcome = h
        .orchestrator
        .run(user(), PipelineRequest::Generate { messages: hello() })
        .await
        .unwrap();
    assert_eq!(outcome, PipelineOutcome::Text { text: "ok".into() });
    assert_eq!(h.usage.increments(), 1);
}

#[tokio::test]
async fn malformed_detection_is_invalid_response() {
    let h = Setup {
        detector: ScriptedDetector::with(Ok(json!({"documents": []}))),
        ..Setup::default()
    }
    .build();

    let err = h
        .orchestrator
        .run(user(), PipelineRequest::Detect { text: "essay".into() })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::UpstreamInvalidResponse { service: UpstreamService::Detection, .. }
    ));
}

#[tokio::test]
async fn failed_increment_is_a_storage_error() {
    let h = Setup {
        llm: ScriptedLlm::with(vec![completion("done")]),
        usage: CountingUsage {
            fail_increment: true,
            ..CountingUsage::default()
        },
        ..Setup::default()
    }
    .build();

    let err = h
        .orchestrator
        .run(user(), PipelineRequest::Generate { messages: hello() })
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Storage { .. }));
    assert_eq!(err.status_code(), 500);
}

// ---------------------------------------------------------------------------
// Usage
// ---------------------------------------------------------------------------

#[tokio::test]
async fn usage_reports_count_and_remaining() {
    let h = Setup {
        usage: CountingUsage::seeded("user_1", 2),
        ..Setup::default()
    }
    .build();

    let status = h.orchestrator.usage(&user().unwrap()).await.unwrap();
    assert_eq!(status.count, 2);
    assert_eq!(status.limit, LIMIT);
    assert_eq!(status.remaining, LIMIT - 2);
    assert!(!status.entitled);
}
