//! Axum-based chat gateway for the AZ Jeff-bot widget. Config-driven via CoreConfig.

mod handlers;

use axum::{
    extract::State,
    http::Method,
    routing::{get, post},
    Router,
};
use azbot_core::{CoreConfig, KnowledgeBase};
use azbot_skills::{CompletionService, ModelRouter};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) config: Arc<CoreConfig>,
    pub(crate) knowledge: Arc<KnowledgeBase>,
    pub(crate) llm: Arc<dyn CompletionService>,
}

/// Knowledge document named in config, or the built-in team document.
fn load_knowledge(config: &CoreConfig) -> Result<KnowledgeBase, BoxError> {
    let kb = match config.knowledge_path.as_deref() {
        Some(path) => KnowledgeBase::load_path(path)?,
        None => KnowledgeBase::builtin()?,
    };
    Ok(kb)
}

/// Pre-flight check: config, knowledge document, credential, and port.
fn run_verify() -> Result<(), String> {
    let config = CoreConfig::load().map_err(|e| format!("Config load failed: {}", e))?;

    print!("Checking knowledge document... ");
    let kb = load_knowledge(&config).map_err(|e| format!("Knowledge document invalid: {}", e))?;
    println!(
        "OK ({} sections, {} keywords)",
        kb.section_names().len(),
        kb.keywords().len()
    );

    print!("Checking {}... ", azbot_core::ENV_OPENAI_API_KEY);
    azbot_core::openai_api_key().map_err(|e| e.to_string())?;
    println!("OK");

    let addr = format!("{}:{}", config.host, config.port);
    print!("Checking {}... ", addr);
    match std::net::TcpListener::bind(&addr) {
        Ok(listener) => {
            drop(listener);
            println!("OK (available)");
        }
        Err(e) => return Err(format!("{} BLOCKED: {}", addr, e)),
    }

    println!("\nAll checks passed. Ready to start gateway.");
    Ok(())
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[azbot-gateway] .env not loaded: {} (using system environment)", e);
    }

    if std::env::args().any(|a| a == "--verify") {
        match run_verify() {
            Ok(()) => std::process::exit(0),
            Err(e) => {
                eprintln!("PRE-FLIGHT FAILED: {}", e);
                std::process::exit(1);
            }
        }
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!("Gateway failed to start: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), BoxError> {
    let config = Arc::new(CoreConfig::load()?);
    let knowledge = Arc::new(load_knowledge(&config)?);
    let llm: Arc<dyn CompletionService> = Arc::new(ModelRouter::from_config(&config)?);

    tracing::info!(
        sections = knowledge.section_names().len(),
        keywords = knowledge.keywords().len(),
        model = %llm.model(),
        "Knowledge base ready"
    );

    let app = build_app(AppState {
        config: Arc::clone(&config),
        knowledge,
        llm,
    });

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("{} listening on {}", config.app_name, listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

fn frontend_root_dir() -> std::path::PathBuf {
    // Prefer a working-directory relative path (run from workspace root), else the
    // workspace-root path relative to this crate's manifest.
    let cwd = std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."));
    let from_cwd = cwd.join("azbot-frontend");
    if from_cwd.exists() {
        return from_cwd;
    }

    std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("azbot-frontend")
}

fn build_app(state: AppState) -> Router {
    let frontend_enabled = state.config.frontend_enabled;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/api/chat", post(handlers::chat::chat))
        .route("/api/v1/health", get(health))
        .route("/api/v1/status", get(status))
        .with_state(state);

    if frontend_enabled {
        let frontend_dir = frontend_root_dir();
        let index_file = frontend_dir.join("index.html");

        // Map `/` -> `azbot-frontend/index.html`
        app = app.route_service("/", ServeFile::new(index_file));
        // Map `/ui/*` -> `azbot-frontend/*` (app.js, styles)
        app = app.nest_service("/ui", ServeDir::new(frontend_dir));
    }

    app.layer(cors)
}

/// GET /api/v1/health – liveness check.
async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

/// GET /api/v1/status – app identity, model, and knowledge layout.
async fn status(State(state): State<AppState>) -> axum::Json<serde_json::Value> {
    let triggers: Vec<&str> = state
        .knowledge
        .keywords()
        .entries()
        .iter()
        .map(|e| e.trigger())
        .collect();
    axum::Json(serde_json::json!({
        "app_name": state.config.app_name,
        "model": state.llm.model(),
        "sections": state.knowledge.section_names(),
        "keywords": triggers,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use azbot_core::{ChatMessage, Role, FALLBACK_PHRASE, PERSONA_INSTRUCTION};
    use azbot_skills::{CompletionError, TokenStream};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Mutex;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    /// What the stub returns for a single call.
    #[derive(Clone)]
    enum Script {
        Chunks(Vec<&'static str>),
        BreakAfter(Vec<&'static str>),
        Reject,
    }

    /// Scripted completion backend that records every request it receives.
    struct StubCompletion {
        script: Script,
        calls: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl StubCompletion {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Vec<ChatMessage>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl CompletionService for StubCompletion {
        fn model(&self) -> &str {
            "gpt-4o-mini"
        }

        async fn stream_chat(
            &self,
            messages: Vec<ChatMessage>,
        ) -> Result<TokenStream, CompletionError> {
            self.calls.lock().unwrap().push(messages);
            let (tx, rx) = mpsc::channel(16);
            let (chunks, fail) = match self.script.clone() {
                Script::Chunks(c) => (c, false),
                Script::BreakAfter(c) => (c, true),
                Script::Reject => {
                    return Err(CompletionError::Status {
                        status: 503,
                        body: "upstream overloaded".to_string(),
                    })
                }
            };
            tokio::spawn(async move {
                for c in chunks {
                    if tx.send(Ok(c.to_string())).await.is_err() {
                        return;
                    }
                }
                if fail {
                    let _ = tx
                        .send(Err(CompletionError::Stream("connection reset".to_string())))
                        .await;
                }
            });
            Ok(rx)
        }
    }

    fn test_config(frontend_enabled: bool) -> CoreConfig {
        CoreConfig {
            app_name: "Test Jeff".to_string(),
            frontend_enabled,
            ..CoreConfig::default()
        }
    }

    fn test_app(llm: Arc<StubCompletion>, frontend_enabled: bool) -> Router {
        build_app(AppState {
            config: Arc::new(test_config(frontend_enabled)),
            knowledge: Arc::new(KnowledgeBase::builtin().unwrap()),
            llm,
        })
    }

    fn chat_request(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap()
    }

    async fn body_text(res: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_chat_streams_reply_with_knowledge_in_system_message() {
        let llm = StubCompletion::new(Script::Chunks(vec!["We're ", "from Sterling", ", VA!"]));
        let app = test_app(Arc::clone(&llm), false);

        let res = app
            .oneshot(chat_request(serde_json::json!({
                "messages": [
                    { "role": "user", "content": "hi jeff" },
                    { "role": "assistant", "content": "Sup." },
                    { "id": "m3", "role": "user", "content": "Where is your team based?" }
                ]
            })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers().get("content-type").unwrap(),
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_text(res).await, "We're from Sterling, VA!");

        let calls = llm.calls();
        assert_eq!(calls.len(), 1);
        let sent = &calls[0];
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[0].role, Role::System);
        assert!(sent[0].content.starts_with(PERSONA_INSTRUCTION));
        assert!(sent[0].content.contains("\"Sterling, Virginia\""));
        assert_eq!(sent[1], ChatMessage::user("hi jeff"));
        assert_eq!(sent[2], ChatMessage::assistant("Sup."));
        assert_eq!(sent[3], ChatMessage::user("Where is your team based?"));
    }

    #[tokio::test]
    async fn test_chat_uses_fallback_phrase_when_nothing_matches() {
        let llm = StubCompletion::new(Script::Chunks(vec!["No clue, honestly."]));
        let app = test_app(Arc::clone(&llm), false);

        let res = app
            .oneshot(chat_request(serde_json::json!({
                "messages": [{ "role": "user", "content": "xylophone quartet" }]
            })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_text(res).await, "No clue, honestly.");

        let system = &llm.calls()[0][0];
        assert!(system.content.starts_with(PERSONA_INSTRUCTION));
        assert!(system.content.contains(FALLBACK_PHRASE));
    }

    #[tokio::test]
    async fn test_empty_messages_rejected_without_upstream_call() {
        let llm = StubCompletion::new(Script::Chunks(vec!["unused"]));
        let app = test_app(Arc::clone(&llm), false);

        let res = app
            .oneshot(chat_request(serde_json::json!({ "messages": [] })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(res).await, "Invalid messages structure");
        assert!(llm.calls().is_empty());
    }

    async fn post_raw(app: Router, raw: &'static str) -> axum::response::Response {
        let req = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(raw))
            .unwrap();
        app.oneshot(req).await.unwrap()
    }

    #[tokio::test]
    async fn test_missing_or_non_array_messages_rejected_with_400() {
        let llm = StubCompletion::new(Script::Chunks(vec!["unused"]));
        for raw in ["{\"messages\": 5}", "{\"prompt\": \"hi\"}"] {
            let res = post_raw(test_app(Arc::clone(&llm), false), raw).await;
            assert_eq!(res.status(), StatusCode::BAD_REQUEST, "body: {raw}");
            assert_eq!(body_text(res).await, "Invalid messages structure");
        }
        assert!(llm.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_body_or_message_returns_500() {
        let llm = StubCompletion::new(Script::Chunks(vec!["unused"]));
        for raw in [
            "{not json",
            "{\"messages\":[{\"role\":\"user\",\"content\":5}]}",
        ] {
            let res = post_raw(test_app(Arc::clone(&llm), false), raw).await;
            assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR, "body: {raw}");
            assert_eq!(body_text(res).await, "Internal Server Error");
        }
        assert!(llm.calls().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_rejection_returns_generic_500() {
        let llm = StubCompletion::new(Script::Reject);
        let app = test_app(Arc::clone(&llm), false);

        let res = app
            .oneshot(chat_request(serde_json::json!({
                "messages": [{ "role": "user", "content": "lift system upgrades" }]
            })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let text = body_text(res).await;
        assert_eq!(text, "Internal Server Error");
        assert!(!text.contains("overloaded"));
        assert_eq!(llm.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_ends_body_early() {
        let llm = StubCompletion::new(Script::BreakAfter(vec!["Our lift ", "uses Viper"]));
        let app = test_app(Arc::clone(&llm), false);

        let res = app
            .oneshot(chat_request(serde_json::json!({
                "messages": [{ "role": "user", "content": "tell me about the lift" }]
            })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_text(res).await, "Our lift uses Viper");
    }

    #[tokio::test]
    async fn test_health_and_status() {
        let llm = StubCompletion::new(Script::Chunks(vec![]));
        let app = test_app(llm, false);

        let res = app
            .clone()
            .oneshot(Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let res = app
            .oneshot(Request::builder().uri("/api/v1/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_text(res).await).unwrap();
        assert_eq!(json["app_name"], "Test Jeff");
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["sections"][0], "TeamOverview");
        assert_eq!(json["keywords"][0], "chassis");
    }

    #[tokio::test]
    async fn test_frontend_index_served_when_enabled() {
        let llm = StubCompletion::new(Script::Chunks(vec![]));
        let app = test_app(llm, true);

        let res = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(body_text(res).await.contains("AZ Jeff-bot"));

        let res = test_app(StubCompletion::new(Script::Chunks(vec![])), true)
            .oneshot(Request::builder().uri("/ui/app.js").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_frontend_not_served_when_disabled() {
        let llm = StubCompletion::new(Script::Chunks(vec![]));
        let app = test_app(llm, false);

        let res = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
