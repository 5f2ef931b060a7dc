//! System prompt assembly.
//!
//! The prompt pins the model to the structured JSON reply contract the
//! parser expects, and optionally folds in three opaque context blocks
//! (goals, priorities, todos) from an external state collaborator.

use anyhow::Result;
use async_trait::async_trait;
use indoc::indoc;
use tracing::warn;

/// Read-only view of the user's durable state. The blocks are opaque text;
/// this crate never interprets them.
#[async_trait]
pub trait ContextSource: Send + Sync {
    async fn goals(&self) -> Result<String>;
    async fn priorities(&self) -> Result<String>;
    async fn todos(&self) -> Result<String>;
}

const PERSONA: &str = indoc! {r#"
    You are a personal assistant that helps the user capture ideas, manage
    tasks, and answer questions. Be concise and concrete.

    Always reply with a single JSON object of this shape:
    {
      "response": "<your natural-language reply to the user>",
      "classification": "<one of: capture, task, question, content_connect, update>",
      "stateChanges": [{"type": "<change tag>", "payload": { ... }}]
    }

    classification meanings:
    - capture: the user is saving an idea or piece of content
    - task: the user wants something tracked or done
    - question: the user is asking for information
    - content_connect: the user is relating shared content to their goals
    - update: the user is changing existing goals, status, or priorities

    Leave stateChanges empty unless the user asked for durable state to
    change. Do not wrap the JSON in a code fence.
"#};

/// Build the system prompt, appending whatever context blocks the source can
/// produce. A failing accessor drops its block with a warning; it never
/// fails the request.
pub async fn build_system_prompt(context: Option<&dyn ContextSource>) -> String {
    let mut prompt = PERSONA.to_string();

    let Some(source) = context else {
        return prompt;
    };

    let blocks = [
        ("Goals", source.goals().await),
        ("Current priorities", source.priorities().await),
        ("Active todos", source.todos().await),
    ];

    for (title, block) in blocks {
        match block {
            Ok(text) if !text.trim().is_empty() => {
                prompt.push_str(&format!("\n## {}\n{}\n", title, text.trim()));
            }
            Ok(_) => {}
            Err(error) => {
                warn!(block = title, %error, "context block unavailable, omitting");
            }
        }
    }

    prompt
}
