use rustyline::{Config, Editor, Result};

use super::topic::Topic;

pub fn generate_prompt(topic: Topic) -> String {
    format!("[{}] > ", topic)
}

pub fn rl() -> Result<Editor<()>> {
    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(false)
        .completion_type(rustyline::CompletionType::List)
        .build();
    Editor::with_config(config)
}
