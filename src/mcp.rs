use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::*,
    tool, tool_handler, tool_router, ServerHandler,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

use chatdrive_core::{ChatConfig, ChatSession};

const ERR_NO_SESSION: &str = "No chat open. Use send first.";

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SendRequest {
    #[schemars(description = "Message to send to the chat agent")]
    pub text: String,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

fn err(e: impl std::fmt::Display) -> ErrorData {
    ErrorData::internal_error(e.to_string(), None::<Value>)
}

fn text_ok(s: impl Into<String>) -> Result<CallToolResult, ErrorData> {
    Ok(CallToolResult::success(vec![Content::text(s.into())]))
}

#[derive(Clone)]
pub struct ChatServer {
    config: Arc<ChatConfig>,
    session: Arc<Mutex<Option<ChatSession>>>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl ChatServer {
    pub fn new(config: ChatConfig) -> Self {
        Self {
            config: Arc::new(config),
            session: Arc::new(Mutex::new(None)),
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Send a message to the chat agent and wait for its complete reply. Opens the browser on first call. Returns the reply text, or a message starting with 'Timeout:' or 'Error:'."
    )]
    async fn send(&self, req: Parameters<SendRequest>) -> Result<CallToolResult, ErrorData> {
        // Holding the lock for the whole turn keeps turns sequential
        let mut guard = self.session.lock().await;
        if guard.is_none() {
            *guard = Some(ChatSession::open(&self.config).await.map_err(err)?);
        }
        let session = guard
            .as_mut()
            .ok_or_else(|| ErrorData::internal_error(ERR_NO_SESSION, None::<Value>))?;
        let reply = session.send(&req.0.text).await;
        text_ok(reply)
    }

    #[tool(description = "Get the text of the last reply currently shown on the page.")]
    async fn last_reply(&self) -> Result<CallToolResult, ErrorData> {
        let guard = self.session.lock().await;
        let session = guard
            .as_ref()
            .ok_or_else(|| ErrorData::internal_error(ERR_NO_SESSION, None::<Value>))?;
        let text = session.last_reply().await.map_err(err)?;
        text_ok(if text.is_empty() {
            "No reply on the page yet.".into()
        } else {
            text
        })
    }

    #[tool(description = "Close the browser and end the conversation. The next send starts a new one.")]
    async fn close(&self) -> Result<CallToolResult, ErrorData> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.take() {
            let turns = session.turns();
            session.close().await.map_err(err)?;
            return text_ok(format!("Chat closed after {} turns.", turns));
        }
        text_ok("No chat open.")
    }
}

#[tool_handler]
impl ServerHandler for ChatServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "chatdrive".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(format!(
                "Conversation with the web chat agent at {}. Use 'send' for each message; \
                 turns share one transcript until 'close'. Replies can take up to {}s.",
                self.config.target.url,
                self.config.detect.timeout_ms / 1000
            )),
        }
    }
}

pub async fn run_server(config: ChatConfig) -> anyhow::Result<()> {
    use rmcp::ServiceExt;

    let server = ChatServer::new(config);
    let session = server.session.clone();
    let service = server.serve(rmcp::transport::stdio()).await?;
    service.waiting().await?;

    // Client went away; don't leave Chrome running
    if let Some(open) = session.lock().await.take() {
        open.close().await?;
    }
    Ok(())
}
