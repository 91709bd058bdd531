//! 轮次编排集成测试：优先级合并、降级、周报节奏与按用户串行

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use echo::config::AppConfig;
use echo::core::orchestrator::{COPING_SOURCE, FALLBACK_SOURCE, PRESENCE_FALLBACK, RETRY_MESSAGE};
use echo::core::{CrisisPolicy, EchoBuilder, SessionState, TurnOrchestrator};
use echo::llm::{LlmError, ScriptedLlmClient};
use echo::lookup::NoopLookup;
use echo::store::{MemorySessionStore, SessionStore, StoreError};
use echo::tasks::crisis::CRISIS_FALLBACK;
use echo::tasks::PromptTemplates;

const CRISIS: &str = "safety monitor";
const EMPATHY: &str = "You are Echo, the warmest";
const MOOD: &str = "Output ONLY the number";
const CHECK: &str = "strict validator";
const GENERATE: &str = "Coping Strategy Researcher";
const REFINE: &str = "final optimizer";
const REPORT: &str = "growth guide";

const EMPATHY_REPLY: &str = "That sounds really heavy. I'm right here with you.";
const COPING_REPLY: &str = "If it feels okay, breathe in for four counts and out for six.";
const REPORT_REPLY: &str = "You reached out every time things felt hard this week.";

/// 默认脚本：模型只对 "end it all" 判危机；情绪分固定为 mood
fn reply(system: &str, user: &str, mood: &str) -> Result<String, LlmError> {
    let text = if system.contains(CRISIS) {
        if user.contains("end it all") {
            "I'm really worried about you. Please call 988 or someone you trust."
        } else {
            "NONE"
        }
    } else if system.contains(MOOD) {
        mood
    } else if system.contains(CHECK) {
        "APPROVED"
    } else if system.contains(GENERATE) || system.contains(REFINE) {
        COPING_REPLY
    } else if system.contains(REPORT) {
        REPORT_REPLY
    } else {
        EMPATHY_REPLY
    };
    Ok(text.to_string())
}

fn scripted(mood: &'static str) -> Arc<ScriptedLlmClient> {
    Arc::new(ScriptedLlmClient::new(move |system, user| reply(system, user, mood)))
}

fn build_with(
    cfg: AppConfig,
    llm: Arc<ScriptedLlmClient>,
    store: Arc<dyn SessionStore>,
) -> TurnOrchestrator {
    EchoBuilder::new(cfg)
        .with_llm(llm)
        .with_store(store)
        .with_lookup(Arc::new(NoopLookup))
        .with_prompts(PromptTemplates::default())
        .with_task_timeout(Duration::from_millis(300))
        .build()
        .unwrap()
}

fn build(llm: Arc<ScriptedLlmClient>) -> (TurnOrchestrator, Arc<MemorySessionStore>) {
    let store = Arc::new(MemorySessionStore::new());
    let orchestrator = build_with(AppConfig::default(), llm, store.clone());
    (orchestrator, store)
}

async fn state_of(store: &MemorySessionStore, user_id: &str) -> SessionState {
    store.get(user_id).await.unwrap().unwrap()
}

/// 可切换为写入失败的存储
#[derive(Default)]
struct FlakyStore {
    inner: MemorySessionStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

#[async_trait]
impl SessionStore for FlakyStore {
    async fn get(&self, user_id: &str) -> Result<Option<SessionState>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("read refused".to_string()));
        }
        self.inner.get(user_id).await
    }

    async fn put(&self, state: &SessionState) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("disk full".to_string()));
        }
        self.inner.put(state).await
    }

    async fn list(&self) -> Result<Vec<SessionState>, StoreError> {
        self.inner.list().await
    }
}

#[tokio::test]
async fn test_low_mood_gets_empathy_then_coping() {
    let llm = scripted("3");
    let (orchestrator, store) = build(llm.clone());

    let result = orchestrator
        .process_turn("alice", "I failed my exam and feel stupid")
        .await;

    assert_eq!(result.sources(), vec!["empathy_agent", COPING_SOURCE]);
    assert_eq!(result.texts(), vec![EMPATHY_REPLY, COPING_REPLY]);

    let state = state_of(&store, "alice").await;
    assert_eq!(state.message_count, 1);
    assert_eq!(state.mood_history.to_vec(), vec![3]);
    assert!(!state.crisis_flag);
    assert_eq!(state.history.len(), 2);
    assert_eq!(llm.count_calls(CHECK), 1);
}

#[tokio::test]
async fn test_mood_at_threshold_gets_empathy_only() {
    let llm = scripted("6");
    let (orchestrator, _) = build(llm.clone());

    let result = orchestrator.process_turn("bob", "Today was okay I guess").await;
    assert_eq!(result.sources(), vec!["empathy_agent"]);
    assert_eq!(llm.count_calls(GENERATE), 0);
}

#[tokio::test]
async fn test_model_crisis_is_exclusive_and_sticky() {
    let llm = scripted("2");
    let (orchestrator, store) = build(llm.clone());

    let result = orchestrator.process_turn("carol", "I want to end it all").await;
    assert_eq!(result.fragments.len(), 1);
    assert_eq!(result.sources(), vec!["crisis_detector"]);
    assert!(result.render().contains("988"));
    assert_eq!(llm.count_calls(GENERATE), 0);

    let state = state_of(&store, "carol").await;
    assert!(state.crisis_flag);
    assert_eq!(state.message_count, 1);
    assert_eq!(state.mood_history.to_vec(), vec![2]);

    let next = orchestrator.process_turn("carol", "thanks for listening").await;
    assert!(!next.sources().contains(&"crisis_detector"));
    assert!(state_of(&store, "carol").await.crisis_flag);
}

#[tokio::test]
async fn test_keyword_crisis_without_model_signal_uses_fallback() {
    let (orchestrator, store) = build(scripted("2"));

    let result = orchestrator.process_turn("dan", "sometimes I want to die").await;
    assert_eq!(result.texts(), vec![CRISIS_FALLBACK]);
    assert!(state_of(&store, "dan").await.crisis_flag);
}

#[tokio::test]
async fn test_crisis_task_failure_still_honours_keywords() {
    let llm = Arc::new(ScriptedLlmClient::new(|system, user| {
        if system.contains(CRISIS) {
            Err(LlmError::ApiError("down".to_string()))
        } else {
            reply(system, user, "2")
        }
    }));
    let (orchestrator, _) = build(llm);

    let result = orchestrator.process_turn("erin", "I feel hopeless").await;
    assert_eq!(result.texts(), vec![CRISIS_FALLBACK]);
}

#[tokio::test]
async fn test_follow_through_policy_continues_after_crisis() {
    let mut cfg = AppConfig::default();
    cfg.orchestrator.crisis_policy = CrisisPolicy::FollowThrough;
    let store = Arc::new(MemorySessionStore::new());
    let orchestrator = build_with(cfg, scripted("2"), store.clone());

    let result = orchestrator.process_turn("fay", "I want to end it all").await;
    assert_eq!(
        result.sources(),
        vec!["crisis_detector", "empathy_agent", COPING_SOURCE]
    );
    assert!(state_of(&store, "fay").await.crisis_flag);
}

#[tokio::test]
async fn test_weekly_report_every_seventh_message() {
    let llm = scripted("8");
    let (orchestrator, store) = build(llm.clone());

    for turn in 1..=14u64 {
        let result = orchestrator.process_turn("gus", "had a nice walk today").await;
        if turn % 7 == 0 {
            assert_eq!(result.sources(), vec!["empathy_agent", "weekly_reporter"], "turn {turn}");
            assert_eq!(result.texts()[1], REPORT_REPLY);
        } else {
            assert_eq!(result.sources(), vec!["empathy_agent"], "turn {turn}");
        }
    }
    assert_eq!(llm.count_calls(REPORT), 2);

    // 周报看到的情绪序列包含本轮
    let report_call = llm
        .calls()
        .into_iter()
        .find(|c| c.system.contains(REPORT))
        .unwrap();
    assert!(report_call.system.contains("[8, 8, 8, 8, 8, 8, 8]"));

    let state = state_of(&store, "gus").await;
    assert_eq!(state.message_count, 14);
    assert_eq!(state.last_report_at_count, Some(14));
}

#[tokio::test]
async fn test_report_due_on_crisis_turn_is_skipped() {
    let llm = scripted("7");
    let (orchestrator, store) = build(llm.clone());

    for _ in 0..6 {
        orchestrator.process_turn("hal", "just checking in").await;
    }
    let crisis_turn = orchestrator.process_turn("hal", "I want to end it all").await;
    assert_eq!(crisis_turn.sources(), vec!["crisis_detector"]);

    let after = orchestrator.process_turn("hal", "I'm a bit calmer now").await;
    assert_eq!(after.sources(), vec!["empathy_agent"]);
    assert_eq!(llm.count_calls(REPORT), 0);
    assert_eq!(state_of(&store, "hal").await.last_report_at_count, Some(7));
}

#[tokio::test]
async fn test_unparseable_mood_leaves_history_unchanged() {
    let llm = scripted("I'd say fairly low");
    let (orchestrator, store) = build(llm.clone());

    let result = orchestrator.process_turn("ivy", "meh").await;
    assert_eq!(result.sources(), vec!["empathy_agent"]);
    assert_eq!(llm.count_calls(GENERATE), 0);

    let state = state_of(&store, "ivy").await;
    assert!(state.mood_history.is_empty());
    assert_eq!(state.message_count, 1);
}

#[tokio::test]
async fn test_empathy_failure_falls_back_to_presence() {
    let llm = Arc::new(ScriptedLlmClient::new(|system, user| {
        if system.contains(EMPATHY) {
            Err(LlmError::ApiError("429 Too Many Requests".to_string()))
        } else {
            reply(system, user, "8")
        }
    }));
    let (orchestrator, _) = build(llm);

    let result = orchestrator.process_turn("jon", "good day overall").await;
    assert_eq!(result.sources(), vec![FALLBACK_SOURCE]);
    assert_eq!(result.texts(), vec![PRESENCE_FALLBACK]);
}

#[tokio::test]
async fn test_slow_empathy_times_out_but_coping_still_sent() {
    let llm = Arc::new(
        ScriptedLlmClient::new(|system, user| reply(system, user, "2"))
            .with_delay(EMPATHY, Duration::from_secs(2)),
    );
    let (orchestrator, _) = build(llm);

    let result = orchestrator.process_turn("kim", "everything is falling apart").await;
    assert_eq!(result.sources(), vec![COPING_SOURCE]);
}

#[tokio::test]
async fn test_generator_failure_suppresses_coping() {
    let llm = Arc::new(ScriptedLlmClient::new(|system, user| {
        if system.contains(GENERATE) {
            Ok("   ".to_string())
        } else {
            reply(system, user, "1")
        }
    }));
    let (orchestrator, _) = build(llm);

    let result = orchestrator.process_turn("lea", "I can't sleep and I'm exhausted").await;
    assert_eq!(result.sources(), vec!["empathy_agent"]);
}

#[tokio::test]
async fn test_store_write_failure_returns_retry_and_keeps_state() {
    let llm = scripted("8");
    let store = Arc::new(FlakyStore::default());
    let orchestrator = build_with(AppConfig::default(), llm, store.clone());

    orchestrator.process_turn("max", "first message").await;
    store.fail_writes.store(true, Ordering::SeqCst);

    let result = orchestrator.process_turn("max", "second message").await;
    assert_eq!(result.texts(), vec![RETRY_MESSAGE]);

    store.fail_writes.store(false, Ordering::SeqCst);
    let state = store.get("max").await.unwrap().unwrap();
    assert_eq!(state.message_count, 1);
    assert_eq!(state.mood_history.to_vec(), vec![8]);
}

#[tokio::test]
async fn test_crisis_message_survives_store_write_failure() {
    let store = Arc::new(FlakyStore::default());
    store.fail_writes.store(true, Ordering::SeqCst);
    let orchestrator = build_with(AppConfig::default(), scripted("2"), store);

    let result = orchestrator.process_turn("rae", "I want to end it all").await;
    assert_eq!(result.sources(), vec!["crisis_detector", "system"]);
    assert!(result.texts()[0].contains("988"));
    assert_eq!(result.texts()[1], RETRY_MESSAGE);
}

#[tokio::test]
async fn test_keyword_crisis_survives_store_read_failure() {
    let llm = scripted("2");
    let store = Arc::new(FlakyStore::default());
    store.fail_reads.store(true, Ordering::SeqCst);
    let orchestrator = build_with(AppConfig::default(), llm.clone(), store);

    let result = orchestrator.process_turn("sam", "I want to end it all").await;
    assert_eq!(result.texts(), vec![CRISIS_FALLBACK, RETRY_MESSAGE]);
    assert!(llm.calls().is_empty());
}

#[tokio::test]
async fn test_model_crisis_reply_starting_with_none_is_not_all_clear() {
    let llm = Arc::new(ScriptedLlmClient::new(|system, user| {
        if system.contains(CRISIS) {
            Ok("None of this is your fault, and I'm really worried about you. Please call 988.".to_string())
        } else {
            reply(system, user, "2")
        }
    }));
    let (orchestrator, store) = build(llm);

    let result = orchestrator.process_turn("tia", "I just can't do this anymore").await;
    assert_eq!(result.sources(), vec!["crisis_detector"]);
    assert!(state_of(&store, "tia").await.crisis_flag);
}

#[tokio::test]
async fn test_store_read_failure_returns_retry_without_running_tasks() {
    let llm = scripted("8");
    let store = Arc::new(FlakyStore::default());
    store.fail_reads.store(true, Ordering::SeqCst);
    let orchestrator = build_with(AppConfig::default(), llm.clone(), store);

    let result = orchestrator.process_turn("ned", "hello").await;
    assert_eq!(result.texts(), vec![RETRY_MESSAGE]);
    assert!(llm.calls().is_empty());
}

#[tokio::test]
async fn test_concurrent_turns_for_same_user_are_serialized() {
    let llm = Arc::new(
        ScriptedLlmClient::new(|system, user| reply(system, user, "5"))
            .with_delay(MOOD, Duration::from_millis(20)),
    );
    let (orchestrator, store) = build(llm);
    let orchestrator = Arc::new(orchestrator);

    let mut handles = Vec::new();
    for i in 0..5 {
        let orchestrator = Arc::clone(&orchestrator);
        handles.push(tokio::spawn(async move {
            orchestrator.process_turn("oli", &format!("message {i}")).await
        }));
    }
    let other = orchestrator.process_turn("pam", "hi there").await;
    for handle in handles {
        assert!(!handle.await.unwrap().is_empty());
    }
    assert!(!other.is_empty());

    let state = state_of(&store, "oli").await;
    assert_eq!(state.message_count, 5);
    assert_eq!(state.mood_history.len(), 5);
    assert_eq!(state_of(&store, "pam").await.message_count, 1);
}

#[tokio::test]
async fn test_first_message_includes_intro_then_never_again() {
    let llm = scripted("7");
    let (orchestrator, _) = build(llm.clone());

    orchestrator.process_turn("quin", "hello").await;
    orchestrator.process_turn("quin", "hello again").await;

    let empathy_calls: Vec<_> = llm
        .calls()
        .into_iter()
        .filter(|c| c.system.contains(EMPATHY))
        .collect();
    assert_eq!(empathy_calls.len(), 2);
    assert!(empathy_calls[0].system.contains("I'm Echo, a non-clinical companion"));
    assert!(empathy_calls[1].system.contains("DO NOT repeat the intro"));
}
