//! Salesbot Webhook 服务
//!
//! 接收 Evolution API 的 messages.upsert 事件，对每位客户跑销售对话。
//!
//! 环境变量:
//! - OPENAI_API_KEY: 模型 API Key（或 SALESBOT__LLM__API_KEY）
//! - EVOLUTION_API_KEY: Evolution API Key（或 SALESBOT__MESSAGING__API_KEY）
//! - SALESBOT__APP__OPERATOR_NUMBER 等: 覆盖 config/default.toml
//!
//! 启动: cargo run --bin salesbot

#[cfg(feature = "webhook")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use std::path::PathBuf;
    use std::sync::Arc;

    use anyhow::Context;
    use salesbot::agent::{create_agent_components, SalesAgent};
    use salesbot::config::load_config;
    use salesbot::core::install_signal_handlers;
    use salesbot::integrations::webhook::create_router;
    use salesbot::integrations::EvolutionGateway;
    use salesbot::llm::OpenAiGateway;
    use salesbot::persistence::SqliteConversationStore;

    salesbot::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    cfg.validate()?;

    let system_prompt = std::fs::read_to_string(&cfg.app.system_prompt_path).with_context(|| {
        format!("Failed to read system prompt {}", cfg.app.system_prompt_path.display())
    })?;
    let catalog = std::fs::read(&cfg.app.catalog_path)
        .with_context(|| format!("Failed to read catalog {}", cfg.app.catalog_path.display()))?;

    let store = SqliteConversationStore::connect(&cfg.storage.database_url)
        .await
        .context("Failed to open conversation store")?;
    let model = OpenAiGateway::new(cfg.llm.base_url.as_deref(), cfg.llm.api_key.as_deref());
    let messaging = EvolutionGateway::new(
        &cfg.messaging.base_url,
        &cfg.messaging.instance_id,
        &cfg.messaging.resolved_api_key(),
        cfg.messaging.timeout_secs,
    )?;

    let components = create_agent_components(
        &cfg,
        Arc::new(model),
        Arc::new(messaging),
        Arc::new(store),
        &system_prompt,
        &catalog,
    );
    let agent = Arc::new(SalesAgent::new(components));
    let app = create_router(agent);

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.server.bind))?;
    tracing::info!("Salesbot listening on http://{}", cfg.server.bind);
    tracing::info!("Webhook URL: http://YOUR_HOST/webhook");

    let shutdown = install_signal_handlers();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("Salesbot stopped");
    Ok(())
}

#[cfg(not(feature = "webhook"))]
fn main() {
    eprintln!("请使用 --features webhook 编译: cargo run --bin salesbot --features webhook");
    std::process::exit(1);
}
