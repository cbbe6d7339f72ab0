//! Built-in demo application.
//!
//! - `GET /health` answers with a small JSON document (buffered path).
//! - `POST /chat` streams the words of `{"message": "..."}` back as
//!   server-sent events, one event per word, then `data: [DONE]`.
//! - `POST /echo` returns the request body unchanged.
//!
//! Everything else is a 404.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use streamgate_bridge::{Framework, REPLAY_HEADER, ResponseWriter};
use streamgate_http::{IncomingRequest, Method};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
}

#[derive(Debug, Clone)]
pub struct DemoApp {
    /// Pause between streamed tokens.
    token_delay: Duration,
}

impl Default for DemoApp {
    fn default() -> Self {
        Self {
            token_delay: Duration::from_millis(50),
        }
    }
}

impl DemoApp {
    #[cfg(test)]
    fn without_delay() -> Self {
        Self {
            token_delay: Duration::ZERO,
        }
    }

    async fn chat(&self, mut req: IncomingRequest, mut res: ResponseWriter) -> anyhow::Result<()> {
        let body = req.take_body()?;
        let chat: ChatRequest = match serde_json::from_slice(&body) {
            Ok(chat) => chat,
            Err(e) => {
                res.set_status(400)?;
                res.set_header("content-type", "text/plain")?;
                res.end_with(format!("invalid chat request: {e}\n")).await?;
                return Ok(());
            }
        };
        if req.headers().contains(REPLAY_HEADER) {
            debug!("chat request replayed on the buffered path");
        }

        res.set_header("content-type", "text/event-stream")?;
        res.set_header("cache-control", "no-cache")?;
        for word in chat.message.split_whitespace() {
            res.write_chunk(format!("data: {word}\n\n")).await?;
            if !self.token_delay.is_zero() {
                tokio::time::sleep(self.token_delay).await;
            }
        }
        res.end_with("data: [DONE]\n\n").await?;
        Ok(())
    }
}

#[async_trait]
impl Framework for DemoApp {
    async fn dispatch(
        &self,
        mut req: IncomingRequest,
        mut res: ResponseWriter,
    ) -> anyhow::Result<()> {
        match (req.method(), req.path()) {
            (&Method::GET, "/health") => {
                res.set_header("content-type", "application/json")?;
                res.end_with(r#"{"status":"ok"}"#).await?;
            }
            (&Method::POST, "/chat") => return self.chat(req, res).await,
            (&Method::POST, "/echo") => {
                let body = req.take_body()?;
                if let Some(content_type) = req.headers().get("content-type") {
                    res.set_header("content-type", content_type)?;
                }
                res.end_with(body).await?;
            }
            _ => {
                res.set_status(404)?;
                res.set_header("content-type", "text/plain")?;
                res.end_with("not found\n").await?;
            }
        }
        Ok(())
    }
}
