//! End-to-end turns against a scripted LLM and in-memory stores.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use taskpilot_agent::{
    AgentError, Assistant, Language, LanguagePipeline, LlmClient, LlmError, LlmRequest,
};
use taskpilot_conversations::ConversationStore;
use taskpilot_core::{Clock, ManualClock, TaskpilotConfig};
use taskpilot_store::{NewTask, Priority, StatusFilter, TaskFilter, TaskStore};

/// Replays a fixed script of completions and records every request.
struct FakeLlm {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl FakeLlm {
    fn new(script: Vec<Result<String, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, idx: usize) -> LlmRequest {
        self.requests.lock().unwrap()[idx].clone()
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    async fn complete(&self, req: &LlmRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(req.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Unavailable("script exhausted".to_string())))
    }
}

struct Harness {
    assistant: Assistant,
    llm: Arc<FakeLlm>,
    tasks: Arc<TaskStore>,
    conversations: Arc<ConversationStore>,
    clock: Arc<ManualClock>,
}

fn now() -> DateTime<Utc> {
    "2025-01-10T12:00:00Z".parse().unwrap()
}

fn harness(script: Vec<Result<String, LlmError>>) -> Harness {
    let llm = Arc::new(FakeLlm::new(script));
    let tasks = Arc::new(TaskStore::new(Connection::open_in_memory().unwrap()).unwrap());
    let conversations =
        Arc::new(ConversationStore::new(Connection::open_in_memory().unwrap()).unwrap());
    let clock = Arc::new(ManualClock::new(now()));
    let assistant = Assistant::new(
        Arc::clone(&llm) as Arc<dyn LlmClient>,
        Arc::clone(&tasks),
        Arc::clone(&conversations),
        Arc::clone(&clock) as Arc<dyn Clock>,
        &TaskpilotConfig::default(),
    );
    Harness {
        assistant,
        llm,
        tasks,
        conversations,
        clock,
    }
}

fn all_filter() -> TaskFilter {
    TaskFilter {
        status: StatusFilter::All,
        ..Default::default()
    }
}

#[tokio::test]
async fn urdu_create_translates_and_persists() -> Result<()> {
    let h = harness(vec![
        Ok(r#"{"action":"create_task","arguments":{"title":"buy milk"},"reply":"Created."}"#
            .to_string()),
        Ok("ٹاسک #1 بن گیا: دودھ خریدنا".to_string()),
    ]);

    let outcome = h
        .assistant
        .handle_chat_request("u1", None, "add task buy milk", Some("ur"))
        .await?;

    // The task exists with defaults applied.
    let tasks = h.tasks.list_tasks("u1", &all_filter(), now())?;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "buy milk");
    assert_eq!(tasks[0].user_id, "u1");
    assert_eq!(tasks[0].priority, Priority::Medium);
    assert!(!tasks[0].is_completed);

    // The reply was translated: it classifies as Urdu by the same heuristic.
    let pipeline = LanguagePipeline::new(&[]);
    assert_eq!(pipeline.classify(&outcome.assistant_text), Language::Urdu);
    assert_eq!(outcome.performed_action.as_deref(), Some("create_task"));
    assert!(!outcome.conversation_id.is_empty());

    // Two LLM calls: the turn itself plus the translation fallback.
    assert_eq!(h.llm.request_count(), 2);
    let translation = h.llm.request(1);
    assert!(translation.messages[1].content.contains("Translate"));

    // Exactly one user and one assistant message were persisted, and the
    // persisted assistant text is the translated one.
    let messages = h
        .conversations
        .all_messages("u1", &outcome.conversation_id)?;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, "add task buy milk");
    assert_eq!(messages[1].content, outcome.assistant_text);
    Ok(())
}

#[tokio::test]
async fn list_with_priority_filter_enumerates_exact_matches() -> Result<()> {
    let h = harness(vec![Ok(
        r#"{"action":"list_tasks","arguments":{"priority":"high"}}"#.to_string(),
    )]);

    h.tasks.create_task(
        "u1",
        NewTask {
            title: "Write report".into(),
            priority: Some(Priority::High),
            ..Default::default()
        },
        now(),
    )?;
    let milk = h.tasks.create_task(
        "u1",
        NewTask {
            title: "Buy milk".into(),
            ..Default::default()
        },
        now(),
    )?;
    h.tasks.set_completed("u1", milk.id, true, now())?;
    h.tasks.create_task(
        "u1",
        NewTask {
            title: "Deploy".into(),
            priority: Some(Priority::Critical),
            ..Default::default()
        },
        now(),
    )?;

    let outcome = h
        .assistant
        .handle_chat_request("u1", None, "show me high priority tasks", Some("en"))
        .await?;

    // Exact-match semantics: critical is not high.
    assert!(outcome.assistant_text.contains("Write report"));
    assert!(outcome.assistant_text.contains("#1"));
    assert!(!outcome.assistant_text.contains("Deploy"));
    assert!(!outcome.assistant_text.contains("Buy milk"));
    Ok(())
}

#[tokio::test]
async fn completing_a_missing_task_reports_not_found() -> Result<()> {
    let h = harness(vec![Ok(
        r#"{"action":"complete_task","arguments":{"task_id":999}}"#.to_string(),
    )]);

    let outcome = h
        .assistant
        .handle_chat_request("u1", None, "mark task 999 as done", Some("en"))
        .await?;

    assert!(outcome.assistant_text.contains("couldn't find task 999"));
    assert_eq!(outcome.performed_action, None);
    assert!(h.tasks.list_tasks("u1", &all_filter(), now())?.is_empty());
    Ok(())
}

#[tokio::test]
async fn cross_user_task_ids_behave_as_missing() -> Result<()> {
    let h = harness(vec![Ok(
        r#"{"action":"complete_task","arguments":{"task_id":1}}"#.to_string(),
    )]);

    let owned = h.tasks.create_task(
        "u1",
        NewTask {
            title: "private".into(),
            ..Default::default()
        },
        now(),
    )?;
    assert_eq!(owned.id, 1);

    let outcome = h
        .assistant
        .handle_chat_request("u2", None, "complete task 1", Some("en"))
        .await?;

    assert!(outcome.assistant_text.contains("couldn't find task 1"));
    // No row changed for the real owner.
    assert!(!h.tasks.get_task("u1", owned.id)?.is_completed);
    Ok(())
}

#[tokio::test]
async fn llm_outage_persists_both_turns_and_errors() -> Result<()> {
    let h = harness(vec![Err(LlmError::Unavailable("timeout".to_string()))]);

    let err = h
        .assistant
        .handle_chat_request("u1", None, "add task buy milk", Some("en"))
        .await
        .unwrap_err();

    let AgentError::LlmUnavailable {
        conversation_id,
        assistant_text,
    } = err
    else {
        panic!("expected LlmUnavailable");
    };
    assert!(assistant_text.contains("temporarily unavailable"));

    // The user's input is not lost, and the apology is the error turn.
    let messages = h.conversations.all_messages("u1", &conversation_id)?;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, "add task buy milk");
    assert!(messages[1].content.contains("temporarily unavailable"));

    assert!(h.tasks.list_tasks("u1", &all_filter(), now())?.is_empty());
    Ok(())
}

#[tokio::test]
async fn urdu_outage_apology_is_localised_without_the_llm() -> Result<()> {
    let h = harness(vec![Err(LlmError::Unavailable("down".to_string()))]);

    let err = h
        .assistant
        .handle_chat_request("u1", None, "kaam add karo", Some("ur"))
        .await
        .unwrap_err();

    let AgentError::LlmUnavailable { assistant_text, .. } = err else {
        panic!("expected LlmUnavailable");
    };
    let pipeline = LanguagePipeline::new(&[]);
    assert_eq!(pipeline.classify(&assistant_text), Language::Urdu);
    // Only the failed turn call: no translation attempt while the LLM is down.
    assert_eq!(h.llm.request_count(), 1);
    Ok(())
}

#[tokio::test]
async fn task_store_outage_persists_the_error_turn() -> Result<()> {
    // A second connection to a shared in-memory database lets the test
    // break the task store underneath a fully built assistant.
    let flags = rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
        | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
        | rusqlite::OpenFlags::SQLITE_OPEN_URI;
    let uri = "file:task_store_outage?mode=memory&cache=shared";
    let saboteur = Connection::open_with_flags(uri, flags)?;
    let store_conn = Connection::open_with_flags(uri, flags)?;

    let llm = Arc::new(FakeLlm::new(vec![Ok("never reached".to_string())]));
    let tasks = Arc::new(TaskStore::new(store_conn)?);
    let conversations = Arc::new(ConversationStore::new(Connection::open_in_memory()?)?);
    let clock = Arc::new(ManualClock::new(now()));
    let assistant = Assistant::new(
        Arc::clone(&llm) as Arc<dyn LlmClient>,
        Arc::clone(&tasks),
        Arc::clone(&conversations),
        clock as Arc<dyn Clock>,
        &TaskpilotConfig::default(),
    );

    saboteur.execute_batch("DROP TABLE tasks;")?;

    let err = assistant
        .handle_chat_request("u1", None, "add task buy milk", Some("en"))
        .await
        .unwrap_err();

    let AgentError::StorageUnavailable {
        conversation_id: Some(conversation_id),
        assistant_text,
    } = err
    else {
        panic!("expected StorageUnavailable with a conversation id");
    };
    assert!(assistant_text.contains("temporarily unavailable"));

    // The user message and the apology both made it into the transcript.
    let messages = conversations.all_messages("u1", &conversation_id)?;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, "add task buy milk");
    assert!(messages[1].content.contains("temporarily unavailable"));

    // The turn never reached the LLM.
    assert_eq!(llm.request_count(), 0);
    Ok(())
}

#[tokio::test]
async fn prose_reply_invokes_no_tool() -> Result<()> {
    let h = harness(vec![Ok(
        "You have no tasks right now. Enjoy your day!".to_string()
    )]);

    let outcome = h
        .assistant
        .handle_chat_request("u1", None, "anything for me today?", Some("en"))
        .await?;

    assert_eq!(outcome.performed_action, None);
    assert_eq!(
        outcome.assistant_text,
        "You have no tasks right now. Enjoy your day!"
    );
    assert!(h.tasks.list_tasks("u1", &all_filter(), now())?.is_empty());
    Ok(())
}

#[tokio::test]
async fn fenced_action_json_is_recovered() -> Result<()> {
    let h = harness(vec![Ok(
        "Sure!\n```json\n{\"action\": \"create_task\", \"arguments\": {\"title\": \"call mom\"}}\n```"
            .to_string(),
    )]);

    let outcome = h
        .assistant
        .handle_chat_request("u1", None, "remind me to call mom", Some("en"))
        .await?;

    assert_eq!(outcome.performed_action.as_deref(), Some("create_task"));
    let tasks = h.tasks.list_tasks("u1", &all_filter(), now())?;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "call mom");
    Ok(())
}

#[tokio::test]
async fn invalid_tool_input_degrades_to_the_models_reply() -> Result<()> {
    let long_title = "x".repeat(201);
    let h = harness(vec![Ok(format!(
        r#"{{"action":"create_task","arguments":{{"title":"{long_title}"}},"reply":"Adding it!"}}"#
    ))]);

    let outcome = h
        .assistant
        .handle_chat_request("u1", None, "add that huge task", Some("en"))
        .await?;

    assert_eq!(outcome.performed_action, None);
    assert_eq!(outcome.assistant_text, "Adding it!");
    assert!(h.tasks.list_tasks("u1", &all_filter(), now())?.is_empty());
    Ok(())
}

#[tokio::test]
async fn unknown_action_is_conversational() -> Result<()> {
    let h = harness(vec![Ok(
        r#"{"action":"send_rocket","arguments":{},"reply":"I can't do that."}"#.to_string(),
    )]);

    let outcome = h
        .assistant
        .handle_chat_request("u1", None, "launch a rocket", Some("en"))
        .await?;

    assert_eq!(outcome.performed_action, None);
    assert_eq!(outcome.assistant_text, "I can't do that.");
    Ok(())
}

#[tokio::test]
async fn turns_accumulate_in_one_conversation() -> Result<()> {
    let h = harness(vec![
        Ok("Hello! What can I do for you?".to_string()),
        Ok("Still here.".to_string()),
    ]);

    let first = h
        .assistant
        .handle_chat_request("u1", None, "hi", Some("en"))
        .await?;
    h.clock.advance(chrono::Duration::seconds(5));
    let second = h
        .assistant
        .handle_chat_request("u1", Some(&first.conversation_id), "you there?", Some("en"))
        .await?;

    assert_eq!(first.conversation_id, second.conversation_id);
    let messages = h
        .conversations
        .all_messages("u1", &first.conversation_id)?;
    assert_eq!(messages.len(), 4);

    // The second turn's prompt window contained the earlier exchange.
    let req = h.llm.request(1);
    assert!(req.messages.iter().any(|m| m.content == "hi"));
    Ok(())
}

#[tokio::test]
async fn foreign_conversation_id_is_rejected() -> Result<()> {
    let h = harness(vec![Ok("hello".to_string())]);
    let own = h
        .assistant
        .handle_chat_request("u1", None, "hi", Some("en"))
        .await?;

    let err = h
        .assistant
        .handle_chat_request("u2", Some(&own.conversation_id), "hi", Some("en"))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::NotFound { .. }));
    Ok(())
}

#[tokio::test]
async fn conversation_listing_and_delete_roundtrip() -> Result<()> {
    let h = harness(vec![Ok("hi!".to_string()), Ok("hello again".to_string())]);

    let a = h
        .assistant
        .handle_chat_request("u1", None, "first conversation", Some("en"))
        .await?;
    h.clock.advance(chrono::Duration::seconds(5));
    let b = h
        .assistant
        .handle_chat_request("u1", None, "second conversation", Some("en"))
        .await?;

    let listed = h.assistant.list_conversations("u1")?;
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, b.conversation_id);
    assert_eq!(listed[0].title.as_deref(), Some("second conversation"));

    let transcript = h
        .assistant
        .get_conversation_messages("u1", &a.conversation_id)?;
    assert_eq!(transcript.len(), 2);

    h.assistant.delete_conversation("u1", &a.conversation_id)?;
    assert!(matches!(
        h.assistant.get_conversation_messages("u1", &a.conversation_id),
        Err(AgentError::NotFound { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn empty_message_is_rejected_before_any_write() -> Result<()> {
    let h = harness(vec![]);
    let err = h
        .assistant
        .handle_chat_request("u1", None, "   ", Some("en"))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::InvalidInput { .. }));
    assert!(h.assistant.list_conversations("u1")?.is_empty());
    assert_eq!(h.llm.request_count(), 0);
    Ok(())
}
