use std::fmt;

use chrono::{DateTime, Utc};

use super::templates::TemplateKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "User"),
            Role::Assistant => write!(f, "Assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

/// One generated answer from a templated tab, keyed by what the user asked for.
#[derive(Debug, Clone)]
pub struct NamedResponse {
    pub label: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl NamedResponse {
    pub fn new(label: &str, body: &str) -> Self {
        Self {
            label: label.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Session-lifetime memory: the chat history plus one response list per templated tab.
///
/// Turns are only ever appended. Named responses are only ever prepended, so
/// each list reads newest first.
#[derive(Debug, Default)]
pub struct ConversationState {
    messages: Vec<Turn>,
    report_responses: Vec<NamedResponse>,
    best_practices_responses: Vec<NamedResponse>,
    error_responses: Vec<NamedResponse>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user_message(&mut self, message: &str) {
        self.messages.push(Turn {
            role: Role::User,
            content: message.to_string(),
        });
    }

    pub fn add_assistant_message(&mut self, message: &str) {
        self.messages.push(Turn {
            role: Role::Assistant,
            content: message.to_string(),
        });
    }

    pub fn get_messages(&self) -> &[Turn] {
        &self.messages
    }

    /// Every turn as `"<Role>: <content>\n"`, oldest first.
    pub fn render_history(&self) -> String {
        self.messages
            .iter()
            .map(|turn| format!("{}: {}\n", turn.role, turn.content))
            .collect()
    }

    pub fn push_response(&mut self, kind: TemplateKind, response: NamedResponse) {
        self.responses_mut(kind).insert(0, response);
    }

    /// Newest first.
    pub fn responses(&self, kind: TemplateKind) -> &[NamedResponse] {
        match kind {
            TemplateKind::Report => &self.report_responses,
            TemplateKind::BestPractices => &self.best_practices_responses,
            TemplateKind::ErrorHelp => &self.error_responses,
        }
    }

    fn responses_mut(&mut self, kind: TemplateKind) -> &mut Vec<NamedResponse> {
        match kind {
            TemplateKind::Report => &mut self.report_responses,
            TemplateKind::BestPractices => &mut self.best_practices_responses,
            TemplateKind::ErrorHelp => &mut self.error_responses,
        }
    }
}
