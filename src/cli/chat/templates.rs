//! Prompt templates for the chat mode and the three single-shot modes.

use super::conversation_state::ConversationState;
use super::topic::Topic;

/// Longest error description shown in an error-help heading.
const ERROR_LABEL_CHARS: usize = 50;

/// Builds the chat prompt: a fixed preamble naming `topic`, then the whole
/// history. The newest user turn must already be in `state`.
pub fn chat_prompt(topic: Topic, state: &ConversationState) -> String {
    let mut context = format!("You are a helpful Data Analyst Assistant. The current topic is {}. ", topic);
    context.push_str("Provide step-by-step solutions, code snippets when relevant, and links to documentation. ");
    context.push_str("If the question is vague, ask for clarification. ");
    context.push_str("Here's the conversation history and the latest question:\n\n");
    context.push_str(&state.render_history());
    context
}

/// The single-shot modes, each with its own template and response list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Report,
    BestPractices,
    ErrorHelp,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 3] = [
        TemplateKind::Report,
        TemplateKind::BestPractices,
        TemplateKind::ErrorHelp,
    ];

    pub fn prompt(&self, topic: Topic, input: &str) -> String {
        match self {
            TemplateKind::Report => format!(
                "Generate a quick report outline for a data analysis task related to {} in the context of {}. \
                 Include common Exploratory Data Analysis (EDA) tasks and potential insights to look for.",
                input, topic
            ),
            TemplateKind::BestPractices => format!(
                "Provide detailed best practices and optimization tips for {} in the context of {} for data analysis. \
                 Include specific examples and explanations where relevant.",
                input, topic
            ),
            TemplateKind::ErrorHelp => format!(
                "The user is experiencing the following error in {}: {}. Provide potential causes and fixes.",
                topic, input
            ),
        }
    }

    /// Shown when the mode is submitted with nothing to ask about.
    pub fn empty_input_warning(&self) -> &'static str {
        match self {
            TemplateKind::Report => "Please enter a specific topic for the report outline.",
            TemplateKind::BestPractices => "Please enter a specific area or task for best practices.",
            TemplateKind::ErrorHelp => "Please describe the error.",
        }
    }

    pub fn heading(&self, label: &str) -> String {
        match self {
            TemplateKind::Report => format!("Report Outline: {}", label),
            TemplateKind::BestPractices => format!("Best Practices for: {}", label),
            TemplateKind::ErrorHelp => {
                let short: String = label.chars().take(ERROR_LABEL_CHARS).collect();
                format!("Error: {}...", short)
            }
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            TemplateKind::Report => "Quick Report",
            TemplateKind::BestPractices => "Best Practices",
            TemplateKind::ErrorHelp => "Error Handling",
        }
    }
}
