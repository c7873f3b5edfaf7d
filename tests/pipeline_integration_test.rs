//! 管线集成测试
//!
//! 用脚本化 LLM 与内存数据源驱动完整管线，覆盖挂起/恢复协议、
//! 双层重试阶梯与各协议违规场景。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Notify;

use nectar::core::{AgentError, SessionState};
use nectar::datasource::{DataSourceError, MemoryDataSource, QueryExecutor, TabularResult};
use nectar::graph::{
    default_graph, CheckpointStore, Engine, InterruptBroker, MemoryCheckpointStore, ResumeCommand,
    RetryPolicy, RunOutcome, Services, STEP_LIMIT,
};
use nectar::llm::{LlmClient, LlmError, Message};

const INTENT_JSON: &str = r#"{"is_data_query": true, "reason": "费用统计"}"#;
const TABLES_JSON: &str = r#"[{"table_name": "cost_items", "fields": []}]"#;
const SQL: &str = "SELECT * FROM cost_items";
const REVIEW_PASS: &str = r#"{"passed": true, "refined_answer": "结果完整"}"#;
const FINAL_ANSWER: &str = "各部门成本合计 74300 元";

/// 脚本化 LLM：按调用顺序弹出预设响应，并记录收到的提示词
struct ScriptedLlm {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    fn new(responses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Some(m) = messages.last() {
            self.prompts.lock().unwrap().push(m.content.clone());
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::Request("script exhausted".to_string()))
    }
}

/// 按提示词判断节点、可无限应答的 LLM（步数上限与升级场景用）
struct SniffingLlm {
    intent_calls: AtomicUsize,
    validation_verdict: &'static str,
}

impl SniffingLlm {
    fn new(validation_verdict: &'static str) -> Arc<Self> {
        Arc::new(Self {
            intent_calls: AtomicUsize::new(0),
            validation_verdict,
        })
    }

    fn intent_calls(&self) -> usize {
        self.intent_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for SniffingLlm {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let prompt = messages.last().map(|m| m.content.as_str()).unwrap_or("");
        let response = if prompt.contains("问题分类器") {
            self.intent_calls.fetch_add(1, Ordering::SeqCst);
            INTENT_JSON.to_string()
        } else if prompt.contains("识别需要加载的表") {
            TABLES_JSON.to_string()
        } else if prompt.contains("SQL 生成助手") {
            SQL.to_string()
        } else if prompt.contains("SQL 校验助手") {
            self.validation_verdict.to_string()
        } else if prompt.contains("结果审查助手") {
            r#"{"passed": false, "refined_answer": "结果不完整"}"#.to_string()
        } else {
            FINAL_ANSWER.to_string()
        };
        Ok(response)
    }
}

/// 记录每次收到的 SQL 并返回固定表格的执行器
#[derive(Default)]
struct CountingExecutor {
    queries: Mutex<Vec<String>>,
}

impl CountingExecutor {
    fn calls(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryExecutor for CountingExecutor {
    async fn execute(&self, query: &str) -> Result<TabularResult, DataSourceError> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(TabularResult {
            columns: vec!["dept".to_string(), "total".to_string()],
            rows: vec![
                vec![json!("研发部"), json!(16200)],
                vec![json!("市场部"), json!(58100)],
            ],
        })
    }
}

/// 总是失败的执行器
#[derive(Default)]
struct FailingExecutor {
    calls: AtomicUsize,
}

#[async_trait]
impl QueryExecutor for FailingExecutor {
    async fn execute(&self, _query: &str) -> Result<TabularResult, DataSourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(DataSourceError::Execution(
            "relation \"cost_items\" does not exist".to_string(),
        ))
    }
}

/// 等到通知才返回的执行器（验证并发 resume 拒绝）
struct BlockingExecutor {
    release: Notify,
}

#[async_trait]
impl QueryExecutor for BlockingExecutor {
    async fn execute(&self, _query: &str) -> Result<TabularResult, DataSourceError> {
        self.release.notified().await;
        Ok(TabularResult::default())
    }
}

fn make_engine(
    llm: Arc<dyn LlmClient>,
    executor: Arc<dyn QueryExecutor>,
    policy: RetryPolicy,
) -> (Arc<Engine>, Arc<MemoryCheckpointStore>) {
    let datasource = Arc::new(MemoryDataSource::with_sample_data());
    let services = Arc::new(Services {
        llm,
        datasource,
        broker: InterruptBroker::new(executor),
        skill: None,
    });
    let store = Arc::new(MemoryCheckpointStore::default());
    let engine = Arc::new(Engine::new(
        default_graph().unwrap(),
        services,
        store.clone(),
        policy,
    ));
    (engine, store)
}

fn suspended(outcome: RunOutcome) -> (String, nectar::graph::ActionRequest) {
    match outcome {
        RunOutcome::Suspended {
            session_id,
            request,
        } => (session_id, request),
        other => panic!("expected suspension, got {other:?}"),
    }
}

fn completed(outcome: RunOutcome) -> SessionState {
    match outcome {
        RunOutcome::Completed(state) => *state,
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn test_happy_path_suspends_then_completes() {
    let llm = ScriptedLlm::new(&[
        INTENT_JSON,
        TABLES_JSON,
        SQL,
        "VALID",
        REVIEW_PASS,
        FINAL_ANSWER,
    ]);
    let executor = Arc::new(CountingExecutor::default());
    let (engine, _) = make_engine(llm.clone(), executor.clone(), RetryPolicy::default());

    let outcome = engine
        .run(SessionState::new("统计各部门成本"))
        .await
        .unwrap();
    let (session_id, request) = suspended(outcome);

    // 挂起点在执行之前：动作请求携带生成的 SQL，网关尚未被调用
    assert_eq!(request.action_name, "execute_sql");
    assert_eq!(request.proposed_params, json!({ "query": SQL }));
    assert_eq!(executor.calls(), 0);

    let outcome = engine
        .resume(&session_id, Some(ResumeCommand::accept()))
        .await
        .unwrap();
    let state = completed(outcome);

    // accept：以挂起时捕获的参数原样执行
    assert_eq!(executor.queries(), vec![SQL.to_string()]);
    assert_eq!(state.retry_count, 1);
    assert_eq!(state.final_answer.as_deref(), Some(FINAL_ANSWER));
    assert!(state.pending_action.is_none());
    assert!(state.execution_result().is_some());
}

#[tokio::test]
async fn test_resume_edit_replaces_query() {
    let llm = ScriptedLlm::new(&[
        INTENT_JSON,
        TABLES_JSON,
        SQL,
        "VALID",
        REVIEW_PASS,
        FINAL_ANSWER,
    ]);
    let executor = Arc::new(CountingExecutor::default());
    let (engine, _) = make_engine(llm, executor.clone(), RetryPolicy::default());

    let outcome = engine.run(SessionState::new("统计成本")).await.unwrap();
    let (session_id, _) = suspended(outcome);

    let edited_sql = "SELECT dept, SUM(amount) AS total_amount FROM cost_items GROUP BY dept";
    let outcome = engine
        .resume(
            &session_id,
            Some(ResumeCommand::edit(json!({ "query": edited_sql }))),
        )
        .await
        .unwrap();
    let state = completed(outcome);

    // edit：外部参数整体替换，原参数被丢弃；后续阶段看到实际执行的 SQL
    assert_eq!(executor.queries(), vec![edited_sql.to_string()]);
    assert_eq!(state.candidate_query.as_deref(), Some(edited_sql));
}

#[tokio::test]
async fn test_resume_respond_skips_execution() {
    let llm = ScriptedLlm::new(&[
        INTENT_JSON,
        TABLES_JSON,
        SQL,
        "VALID",
        REVIEW_PASS,
        FINAL_ANSWER,
    ]);
    let executor = Arc::new(CountingExecutor::default());
    let (engine, _) = make_engine(llm.clone(), executor.clone(), RetryPolicy::default());

    let outcome = engine.run(SessionState::new("统计成本")).await.unwrap();
    let (session_id, _) = suspended(outcome);

    let outcome = engine
        .resume(
            &session_id,
            Some(ResumeCommand::respond("口径不对，不要执行这条 SQL")),
        )
        .await
        .unwrap();
    let state = completed(outcome);

    // respond：执行网关零调用，执行结果与错误都保持为空
    assert_eq!(executor.calls(), 0);
    assert!(state.execution_result().is_none());
    assert!(state.execution_error().is_none());
    assert_eq!(
        state.decision_feedback.as_deref(),
        Some("口径不对，不要执行这条 SQL")
    );

    // 审查以反馈文本作为事实结果
    let review_prompt = llm
        .prompts()
        .into_iter()
        .find(|p| p.contains("结果审查助手"))
        .unwrap();
    assert!(review_prompt.contains("口径不对"));
}

#[tokio::test]
async fn test_invalid_sql_retries_then_succeeds() {
    let llm = ScriptedLlm::new(&[
        INTENT_JSON,
        TABLES_JSON,
        "SELECT * FROM wrong_table",
        "INVALID: 表不存在",
        SQL,
        "VALID",
        REVIEW_PASS,
        FINAL_ANSWER,
    ]);
    let executor = Arc::new(CountingExecutor::default());
    let (engine, _) = make_engine(llm.clone(), executor.clone(), RetryPolicy::default());

    let outcome = engine.run(SessionState::new("统计成本")).await.unwrap();
    let (session_id, request) = suspended(outcome);

    // 第二次生成才通过校验；重试计数随生成次数增长
    assert_eq!(request.proposed_params, json!({ "query": SQL }));

    let state = completed(
        engine
            .resume(&session_id, Some(ResumeCommand::accept()))
            .await
            .unwrap(),
    );
    assert_eq!(state.retry_count, 2);

    // 校验错误作为纠错上下文进入第二次生成提示词
    let second_generation = llm
        .prompts()
        .into_iter()
        .filter(|p| p.contains("SQL 生成助手"))
        .nth(1)
        .unwrap();
    assert!(second_generation.contains("表不存在"));
}

#[tokio::test]
async fn test_retry_ceiling_degrades_to_final_answer() {
    // 上限 2：两轮无效生成后直接收尾，执行网关从未被触碰
    let llm = ScriptedLlm::new(&[
        INTENT_JSON,
        TABLES_JSON,
        "DROP TABLE cost_items",
        "SELECT 奇怪的语法",
        "INVALID: 语法错误",
        "查询未能生成有效 SQL，请换个问法。",
    ]);
    let executor = Arc::new(CountingExecutor::default());
    let policy = RetryPolicy {
        max_retries: 2,
        escalation_threshold: 1,
    };
    let (engine, _) = make_engine(llm, executor.clone(), policy);

    let state = completed(engine.run(SessionState::new("统计成本")).await.unwrap());

    assert_eq!(executor.calls(), 0);
    assert_eq!(state.retry_count, 2);
    assert!(!state.is_valid);
    assert!(state.final_answer.is_some());
}

#[tokio::test]
async fn test_execution_failure_escalates_and_clears_intent() {
    // 软阈值 2：第二次执行失败后回到意图分析重新理解问题
    let llm = SniffingLlm::new("VALID");
    let executor = Arc::new(FailingExecutor::default());
    let policy = RetryPolicy {
        max_retries: 5,
        escalation_threshold: 2,
    };
    let (engine, store) = make_engine(llm.clone(), executor.clone(), policy);

    let outcome = engine.run(SessionState::new("统计成本")).await.unwrap();
    let (session_id, _) = suspended(outcome);
    assert_eq!(llm.intent_calls(), 1);

    // 第一次失败：retry_count=1 < 阈值，只重新生成
    let outcome = engine
        .resume(&session_id, Some(ResumeCommand::accept()))
        .await
        .unwrap();
    let (session_id, _) = suspended(outcome);
    assert_eq!(llm.intent_calls(), 1);

    // 第二次失败：retry_count=2 触发升级，意图被清空并重新分析
    let outcome = engine
        .resume(&session_id, Some(ResumeCommand::accept()))
        .await
        .unwrap();
    let (session_id, _) = suspended(outcome);
    assert_eq!(llm.intent_calls(), 2);

    let checkpoint = store.load(&session_id).await.unwrap();
    assert_eq!(checkpoint.retry_count, 3);
    assert!(checkpoint.understood_intent.is_some());
}

#[tokio::test]
async fn test_resume_unknown_session() {
    let llm = ScriptedLlm::new(&[]);
    let executor = Arc::new(CountingExecutor::default());
    let (engine, _) = make_engine(llm, executor, RetryPolicy::default());

    let err = engine
        .resume("no-such-session", Some(ResumeCommand::accept()))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::UnknownSession(id) if id == "no-such-session"));
}

#[tokio::test]
async fn test_resume_missing_decision_then_recovers() {
    let llm = ScriptedLlm::new(&[
        INTENT_JSON,
        TABLES_JSON,
        SQL,
        "VALID",
        REVIEW_PASS,
        FINAL_ANSWER,
    ]);
    let executor = Arc::new(CountingExecutor::default());
    let (engine, _) = make_engine(llm, executor.clone(), RetryPolicy::default());

    let outcome = engine.run(SessionState::new("统计成本")).await.unwrap();
    let (session_id, _) = suspended(outcome);

    // 无决策恢复是协议违规，且不得默认 accept（网关零调用）
    let err = engine.resume(&session_id, None).await.unwrap_err();
    assert!(matches!(err, AgentError::MissingDecision));
    assert_eq!(executor.calls(), 0);

    // 会话仍然挂起，补上决策后正常完成
    let state = completed(
        engine
            .resume(&session_id, Some(ResumeCommand::accept()))
            .await
            .unwrap(),
    );
    assert!(state.is_complete());
}

#[tokio::test]
async fn test_resume_unsupported_decision() {
    let llm = ScriptedLlm::new(&[INTENT_JSON, TABLES_JSON, SQL, "VALID"]);
    let executor = Arc::new(CountingExecutor::default());
    let (engine, _) = make_engine(llm, executor.clone(), RetryPolicy::default());

    let outcome = engine.run(SessionState::new("统计成本")).await.unwrap();
    let (session_id, _) = suspended(outcome);

    let command = ResumeCommand {
        action: "approve".to_string(),
        params: None,
        feedback: None,
    };
    let err = engine.resume(&session_id, Some(command)).await.unwrap_err();
    assert!(matches!(err, AgentError::UnsupportedDecision(a) if a == "approve"));
    assert_eq!(executor.calls(), 0);
}

#[tokio::test]
async fn test_concurrent_resume_is_rejected() {
    let llm = ScriptedLlm::new(&[
        INTENT_JSON,
        TABLES_JSON,
        SQL,
        "VALID",
        REVIEW_PASS,
        FINAL_ANSWER,
    ]);
    let executor = Arc::new(BlockingExecutor {
        release: Notify::new(),
    });
    let (engine, _) = make_engine(llm, executor.clone(), RetryPolicy::default());

    let outcome = engine.run(SessionState::new("统计成本")).await.unwrap();
    let (session_id, _) = suspended(outcome);

    let first = {
        let engine = engine.clone();
        let session_id = session_id.clone();
        tokio::spawn(async move {
            engine
                .resume(&session_id, Some(ResumeCommand::accept()))
                .await
        })
    };
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    // 第一个 resume 还卡在执行网关上，第二个必须被拒绝
    let err = engine
        .resume(&session_id, Some(ResumeCommand::accept()))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::SessionBusy(_)));

    executor.release.notify_one();
    let state = completed(first.await.unwrap().unwrap());
    assert!(state.is_complete());
}

#[tokio::test]
async fn test_step_limit_aborts_runaway_session() {
    // 校验永远不过、预算近乎无限：生成/校验循环必须被步数上限掐断
    let llm = SniffingLlm::new("INVALID: 永远不过");
    let executor = Arc::new(CountingExecutor::default());
    let policy = RetryPolicy {
        max_retries: 1000,
        escalation_threshold: 1000,
    };
    let (engine, _) = make_engine(llm, executor, policy);

    let err = engine.run(SessionState::new("统计成本")).await.unwrap_err();
    assert!(matches!(
        err,
        AgentError::StepLimitExceeded { steps } if steps > STEP_LIMIT
    ));
}

#[tokio::test]
async fn test_resume_from_rebuilt_engine() {
    // 挂起后丢弃引擎，用同一检查点存储重建：会话状态完全外部化
    let store = Arc::new(MemoryCheckpointStore::default());
    let datasource = Arc::new(MemoryDataSource::with_sample_data());
    let executor = Arc::new(CountingExecutor::default());

    let session_id = {
        let llm = ScriptedLlm::new(&[INTENT_JSON, TABLES_JSON, SQL, "VALID"]);
        let services = Arc::new(Services {
            llm,
            datasource: datasource.clone(),
            broker: InterruptBroker::new(executor.clone()),
            skill: None,
        });
        let engine = Engine::new(
            default_graph().unwrap(),
            services,
            store.clone(),
            RetryPolicy::default(),
        );
        let outcome = engine.run(SessionState::new("统计成本")).await.unwrap();
        suspended(outcome).0
    };

    let llm = ScriptedLlm::new(&[REVIEW_PASS, FINAL_ANSWER]);
    let services = Arc::new(Services {
        llm,
        datasource,
        broker: InterruptBroker::new(executor.clone()),
        skill: None,
    });
    let engine = Engine::new(
        default_graph().unwrap(),
        services,
        store.clone(),
        RetryPolicy::default(),
    );

    let state = completed(
        engine
            .resume(&session_id, Some(ResumeCommand::accept()))
            .await
            .unwrap(),
    );
    assert_eq!(executor.calls(), 1);
    assert_eq!(state.final_answer.as_deref(), Some(FINAL_ANSWER));

    // 完成后检查点被归档
    assert!(store.load(&session_id).await.is_err());
}
