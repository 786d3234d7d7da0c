//! Shared test infrastructure
//!
//! The mock Ollama server lets integration tests drive the real HTTP backend
//! without a model running locally.

use std::net::SocketAddr;

use axum::{
    extract::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// In-process Ollama stand-in bound to an ephemeral port
pub struct MockOllamaServer {
    base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
}

impl MockOllamaServer {
    pub async fn start() -> Self {
        let router = Router::new()
            .route("/api/tags", get(tags))
            .route("/api/generate", post(generate));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        let (shutdown, rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            shutdown: Some(shutdown),
        }
    }

    pub fn url(&self) -> String {
        self.base_url.clone()
    }
}

impl Drop for MockOllamaServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn tags() -> Json<TagsBody> {
    Json(TagsBody {
        models: vec![TagModel {
            name: "llama3.2:latest".into(),
            modified_at: "2024-06-01T00:00:00Z".into(),
            size: 2_000_000_000,
        }],
    })
}

/// Answer classification prompts by keyword-matching the description line
async fn generate(Json(req): Json<GenerateBody>) -> Json<GenerateReply> {
    let description = description_line(&req.prompt).to_uppercase();

    let (category, confidence) = if description.contains("CAFE") || description.contains("COFFEE") {
        ("Dining", 90)
    } else if description.contains("GYM") || description.contains("FITNESS") {
        ("Health", 80)
    } else if description.contains("PARKING") || description.contains("TOLL") {
        ("Transport", 75)
    } else {
        ("Uncategorized", 40)
    };

    Json(GenerateReply {
        model: req.model,
        response: format!(r#"{{"category": "{}", "confidence": {}}}"#, category, confidence),
        done: true,
    })
}

fn description_line(prompt: &str) -> &str {
    prompt
        .lines()
        .find_map(|line| line.strip_prefix("Description: "))
        .map(str::trim)
        .unwrap_or(prompt)
}

#[derive(Serialize)]
struct TagsBody {
    models: Vec<TagModel>,
}

#[derive(Serialize)]
struct TagModel {
    name: String,
    modified_at: String,
    size: u64,
}

#[derive(Deserialize)]
struct GenerateBody {
    model: String,
    prompt: String,
    #[allow(dead_code)]
    stream: bool,
}

#[derive(Serialize)]
struct GenerateReply {
    model: String,
    response: String,
    done: bool,
}
