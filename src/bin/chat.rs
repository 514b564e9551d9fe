//! Terminal chat client
//!
//! Reads lines from stdin. Plain text is sent to the selected conversation
//! (a new one is created for the first message); commands start with `/`.

use chat_relay::client::ChatClient;
use chat_relay::db::{Conversation, Message};
use chat_relay::llm::MessageRole;
use chat_relay::orchestrator::{ChatView, Orchestrator};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HELP: &str = "Commands: /new, /list, /open <id>, /clear, /help, /quit";

/// Prints the reply as it streams
struct TerminalView {
    streaming: bool,
}

impl TerminalView {
    fn end_stream(&mut self) {
        if self.streaming {
            println!();
            self.streaming = false;
        }
    }
}

impl ChatView for TerminalView {
    fn on_conversation_created(&mut self, conversation: &Conversation) {
        println!("[conversation {} created]", conversation.id);
    }

    fn on_chunk(&mut self, delta: &str, _accumulated: &str) {
        if !self.streaming {
            print!("assistant> ");
            self.streaming = true;
        }
        print!("{delta}");
        let _ = std::io::stdout().flush();
    }

    fn on_history(&mut self, conversation_id: Option<i64>, messages: &[Message]) {
        self.end_stream();
        match conversation_id {
            Some(id) => println!("[conversation {id}: {} messages]", messages.len()),
            None => println!("[no conversation selected]"),
        }
    }

    fn on_error(&mut self, message: &str) {
        self.end_stream();
        eprintln!("error: {message}");
    }
}

fn print_messages(messages: &[Message]) {
    for message in messages {
        let who = match message.role {
            MessageRole::User => "you",
            MessageRole::Assistant => "assistant",
        };
        println!("{who}> {}", message.content);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_relay=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr),
        )
        .init();

    let base_url =
        std::env::var("CHAT_SERVER_URL").unwrap_or_else(|_| "http://127.0.0.1:8000".to_string());
    let client = ChatClient::new(base_url)?;
    println!("Connected to {}. {HELP}", client.base_url());

    let mut orchestrator = Orchestrator::new(client, TerminalView { streaming: false });
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut parts = line.splitn(2, ' ');
        match (parts.next(), parts.next()) {
            (Some("/quit"), _) => break,
            (Some("/help"), _) => println!("{HELP}"),
            (Some("/new"), _) => orchestrator.select_conversation(None).await,
            (Some("/list"), _) => match orchestrator.backend().list_conversations().await {
                Ok(conversations) => {
                    for c in conversations {
                        let created = c.created_at.format("%Y-%m-%d %H:%M");
                        println!("{:>4}  {}  ({created})", c.id, c.title);
                    }
                }
                Err(e) => eprintln!("error: {e}"),
            },
            (Some("/open"), Some(id)) => match id.trim().parse::<i64>() {
                Ok(id) => {
                    orchestrator.select_conversation(Some(id)).await;
                    if let Ok(messages) = orchestrator.backend().get_messages(id).await {
                        print_messages(&messages);
                    }
                }
                Err(_) => eprintln!("error: invalid conversation id"),
            },
            (Some("/clear"), _) => match orchestrator.state().conversation_id() {
                Some(id) => {
                    if let Err(e) = orchestrator.backend().clear_messages(id).await {
                        eprintln!("error: {e}");
                    }
                    orchestrator.select_conversation(Some(id)).await;
                }
                None => eprintln!("error: no conversation selected"),
            },
            (Some(cmd), _) if cmd.starts_with('/') => println!("{HELP}"),
            _ => {
                if let Err(e) = orchestrator.send_message(line).await {
                    eprintln!("error: {e}");
                }
            }
        }
    }

    Ok(())
}
