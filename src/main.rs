//! Nectar 入口：驱动一次自然语言查询，或以外部决策恢复一个挂起的会话
//!
//! 用法：
//!   nectar --query "统计各部门成本"
//!   nectar --resume <session_id> --action accept
//!   nectar --resume <session_id> --action edit --params '{"query": "SELECT ..."}'
//!   nectar --resume <session_id> --action respond --feedback "口径不对，不要执行"
//!   nectar --list-skills

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use nectar::config::load_config;
use nectar::core::SessionState;
use nectar::datasource::MemoryDataSource;
use nectar::graph::{
    default_graph, Engine, FileCheckpointStore, InterruptBroker, ResumeCommand, RunOutcome,
    Services,
};
use nectar::llm::create_llm_from_config;
use nectar::skills::SkillLoader;

#[derive(Debug, Default)]
struct CliArgs {
    query: Option<String>,
    resume: Option<String>,
    action: Option<String>,
    params: Option<String>,
    feedback: Option<String>,
    skill: Option<String>,
    config: Option<PathBuf>,
    list_skills: bool,
}

fn parse_args() -> anyhow::Result<CliArgs> {
    let mut args = CliArgs::default();
    let mut iter = std::env::args().skip(1);
    while let Some(flag) = iter.next() {
        let mut take = |name: &str| {
            iter.next()
                .with_context(|| format!("{name} requires a value"))
        };
        match flag.as_str() {
            "--query" => args.query = Some(take("--query")?),
            "--resume" => args.resume = Some(take("--resume")?),
            "--action" => args.action = Some(take("--action")?),
            "--params" => args.params = Some(take("--params")?),
            "--feedback" => args.feedback = Some(take("--feedback")?),
            "--skill" => args.skill = Some(take("--skill")?),
            "--config" => args.config = Some(PathBuf::from(take("--config")?)),
            "--list-skills" => args.list_skills = true,
            other => anyhow::bail!("Unknown flag: {other}"),
        }
    }
    Ok(args)
}

fn print_usage() {
    println!(
        "Usage:\n  \
         nectar --query <TEXT> [--skill <ID>] [--config <PATH>]\n  \
         nectar --resume <SESSION_ID> --action accept|edit|respond [--params <JSON>] [--feedback <TEXT>]\n  \
         nectar --list-skills"
    );
}

fn print_outcome(outcome: RunOutcome) {
    match outcome {
        RunOutcome::Completed(state) => {
            println!("\nQuery: {}", state.query_text);
            if let Some(sql) = &state.candidate_query {
                println!("SQL: {sql}");
            }
            if let Some(result) = state.execution_result() {
                println!("Result:\n{result}");
            }
            if let Some(answer) = &state.final_answer {
                println!("Answer: {answer}");
            }
        }
        RunOutcome::Suspended {
            session_id,
            request,
        } => {
            // 动作请求以 JSON 发往外部，等待决策
            println!("\nSession suspended: {session_id}");
            println!(
                "Action request:\n{}",
                serde_json::to_string_pretty(&request).unwrap_or_default()
            );
            println!("\nResume with:\n  nectar --resume {session_id} --action accept");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    nectar::observability::init();

    let args = parse_args()?;
    let cfg = load_config(args.config.clone()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        Default::default()
    });

    let skills_dir = cfg
        .app
        .skills_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("skills"));
    let loader = SkillLoader::new(&skills_dir);
    loader.load_all().await.context("Failed to load skills")?;

    if args.list_skills {
        println!("Available skills:");
        for summary in loader.list_summaries().await {
            println!("  - {summary}");
        }
        return Ok(());
    }

    let skill_id = args.skill.clone().or_else(|| cfg.app.skill.clone());
    let skill = match skill_id {
        Some(ref id) => {
            let skill = loader.get(id).await;
            if skill.is_none() {
                tracing::warn!("Skill {} not found, continuing without skill", id);
            }
            skill
        }
        None => None,
    };

    // 具体数据后端是外部协作者；这里用内存数据源跑通管线
    let datasource = Arc::new(MemoryDataSource::with_sample_data());
    let llm = create_llm_from_config(&cfg);
    let services = Arc::new(Services {
        llm,
        datasource: datasource.clone(),
        broker: InterruptBroker::new(datasource),
        skill,
    });

    let checkpoint_dir = cfg
        .app
        .checkpoint_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(".nectar/checkpoints"));
    let engine = Engine::new(
        default_graph()?,
        services,
        Arc::new(FileCheckpointStore::new(checkpoint_dir)),
        cfg.pipeline.retry_policy(),
    );

    if let Some(query) = args.query {
        let outcome = engine.run(SessionState::new(query)).await?;
        print_outcome(outcome);
        return Ok(());
    }

    if let Some(session_id) = args.resume {
        let command = match args.action {
            Some(action) => {
                let params = args
                    .params
                    .as_deref()
                    .map(serde_json::from_str)
                    .transpose()
                    .context("--params must be valid JSON")?;
                Some(ResumeCommand {
                    action,
                    params,
                    feedback: args.feedback.clone(),
                })
            }
            None => None,
        };
        let outcome = engine.resume(&session_id, command).await?;
        print_outcome(outcome);
        return Ok(());
    }

    print_usage();
    Ok(())
}
