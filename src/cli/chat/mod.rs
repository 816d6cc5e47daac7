pub mod command;
pub mod conversation_state;
pub mod prompt;
pub mod templates;
pub mod topic;

use std::fmt;
use std::io::Write;
use std::process::ExitCode;

use color_print::cformat;
use command::{Command, HistoryTarget};
use conversation_state::{ConversationState, NamedResponse};
use eyre::{Result, bail};
use prompt::generate_prompt;
use rustyline::error::ReadlineError;
use templates::TemplateKind;
use topic::Topic;
use tracing::{debug, error, info};

use crate::gemini_client::{GeminiClient, GeminiSettings};
use crate::relay::Relay;

const WELCOME_TEXT: &str = "
Hi, I'm your Data Analyst Assistant. Ask me anything about your data work.

Things to try
• How do I remove duplicate rows in a DataFrame?
• /report Customer Churn Analysis
• /practices SQL query optimization
• /error KeyError: 'order_date'

/help         Show the help dialogue
/quit         Quit the application
";

const HELP_TEXT: &str = "
Data Analyst Assistant

{question}             Chat about the current topic
/report {topic}        Generate a quick report outline
/practices {task}      Best practices and optimization tips
/error {description}   Potential causes and fixes for an error
/topic [name]          Show or change the current topic
/topics                List the available topics
/history [list]        Show chat, report, practices or error history
/help                  Show this help dialogue
/quit                  Quit the application
";

/// Builds a relay from an API key.
pub type RelayFactory = Box<dyn Fn(&str) -> Result<Box<dyn Relay>>>;

/// Start-up options for a session.
#[derive(Clone, Default)]
pub struct SessionOptions {
    pub topic: Topic,
    pub api_key: Option<String>,
    pub settings: GeminiSettings,
    pub skip_validation: bool,
}

impl fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionOptions")
            .field("topic", &self.topic)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("settings", &self.settings)
            .field("skip_validation", &self.skip_validation)
            .finish()
    }
}

pub struct ChatContext {
    output: Box<dyn Write>,
    input: Option<String>,
    interactive: bool,
    topic: Topic,
    conversation_state: ConversationState,
    api_key: Option<String>,
    skip_validation: bool,
    relay_factory: RelayFactory,
    relay: Option<Box<dyn Relay>>,
    /// Set when the last request got no answer: a failed call or an empty field.
    last_request_failed: bool,
}

impl ChatContext {
    pub fn new(
        output: Box<dyn Write>,
        input: Option<String>,
        interactive: bool,
        options: SessionOptions,
    ) -> Self {
        let settings = options.settings;
        let relay_factory: RelayFactory = Box::new(move |api_key: &str| {
            let client = GeminiClient::new(api_key, settings.clone())?;
            info!("Using Gemini model {}", client.model());
            Ok(Box::new(client) as Box<dyn Relay>)
        });

        Self {
            output,
            input,
            interactive,
            topic: options.topic,
            conversation_state: ConversationState::new(),
            api_key: options.api_key,
            skip_validation: options.skip_validation,
            relay_factory,
            relay: None,
            last_request_failed: false,
        }
    }

    #[cfg(test)]
    fn with_relay_factory(mut self, relay_factory: RelayFactory) -> Self {
        self.relay_factory = relay_factory;
        self
    }

    pub async fn run(&mut self) -> Result<ExitCode> {
        // One-shot runs cannot ask for a key, so a bad one is fatal
        let one_shot = self.input.is_some() || !self.interactive;

        if !self.connect(!one_shot).await? {
            return Ok(ExitCode::FAILURE);
        }

        // Handle non-interactive mode (single query)
        if let Some(input) = self.input.take() {
            self.last_request_failed = false;
            self.handle_input(&input).await?;
            if self.last_request_failed {
                return Ok(ExitCode::FAILURE);
            }
            return Ok(ExitCode::SUCCESS);
        }

        if self.interactive {
            self.print_welcome()?;
            self.run_interactive().await?;
        }

        Ok(ExitCode::SUCCESS)
    }

    /// Establishes a validated relay. Returns `false` when no usable key was found.
    async fn connect(&mut self, ask_for_key: bool) -> Result<bool> {
        if let Some(api_key) = self.api_key.take() {
            if self.try_api_key(&api_key).await? {
                return Ok(true);
            }
            writeln!(self.output, "{}", cformat!("<red>Invalid API key. Please try again.</>"))?;
        } else if !ask_for_key {
            writeln!(
                self.output,
                "{}",
                cformat!("<red>No API key provided. Set GEMINI_API_KEY or pass --api-key.</>")
            )?;
        }

        if !ask_for_key {
            return Ok(false);
        }

        writeln!(self.output, "Welcome! Please enter your Google Gemini API key to start.")?;
        let mut rl = prompt::rl()?;

        loop {
            let api_key = match rl.readline("Enter your API key: ") {
                Ok(line) => line.trim().to_string(),
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => return Ok(false),
                Err(e) => return Err(e.into()),
            };

            if api_key.is_empty() {
                continue;
            }

            if self.try_api_key(&api_key).await? {
                self.report_key_accepted()?;
                return Ok(true);
            }

            writeln!(self.output, "{}", cformat!("<red>Invalid API key. Please try again.</>"))?;
        }
    }

    async fn try_api_key(&mut self, api_key: &str) -> Result<bool> {
        let relay = (self.relay_factory)(api_key)?;

        if !self.skip_validation && !relay.validate().await {
            return Ok(false);
        }

        self.relay = Some(relay);
        Ok(true)
    }

    fn report_key_accepted(&mut self) -> Result<()> {
        if self.skip_validation {
            writeln!(self.output, "{}", cformat!("<yellow>API key accepted without validation.</>"))?;
        } else {
            writeln!(self.output, "{}", cformat!("<green>API key validated successfully!</>"))?;
        }
        Ok(())
    }

    fn print_welcome(&mut self) -> Result<()> {
        writeln!(self.output, "{}", WELCOME_TEXT)?;
        writeln!(self.output, "Current topic: {}", self.topic)?;
        Ok(())
    }

    async fn run_interactive(&mut self) -> Result<()> {
        let mut rl = prompt::rl()?;

        loop {
            let prompt_text = generate_prompt(self.topic);
            let readline = rl.readline(&prompt_text);

            match readline {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }

                    rl.add_history_entry(line.as_str());

                    match self.handle_input(&line).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => {
                            writeln!(self.output, "Error: {}", e)?;
                        }
                    }
                }
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
                Err(e) => {
                    writeln!(self.output, "Error: {}", e)?;
                    break;
                }
            }
        }

        Ok(())
    }

    /// Runs one line of input. Returns `false` once the user asks to quit.
    async fn handle_input(&mut self, input: &str) -> Result<bool> {
        let command = match Command::parse(input) {
            Ok(command) => command,
            Err(e) => {
                writeln!(self.output, "{}", e)?;
                return Ok(true);
            }
        };
        debug!("Handling command: {:?}", command);

        match command {
            Command::Ask { prompt } => self.process_chat_input(&prompt).await?,
            Command::Template { kind, input } => self.process_template_input(kind, &input).await?,
            Command::Topic { name: None } => {
                writeln!(self.output, "Current topic: {}", self.topic)?;
            }
            Command::Topic { name: Some(name) } => match name.parse::<Topic>() {
                Ok(topic) => {
                    self.topic = topic;
                    info!("Topic changed to {}", topic);
                    writeln!(self.output, "Current topic: {}", self.topic)?;
                }
                Err(e) => writeln!(self.output, "{}", e)?,
            },
            Command::Topics => self.print_topics()?,
            Command::History { target } => self.print_history(target)?,
            Command::Help => {
                writeln!(self.output, "{}", HELP_TEXT)?;
            }
            Command::Quit => return Ok(false),
        }

        Ok(true)
    }

    async fn process_chat_input(&mut self, input: &str) -> Result<()> {
        if input.is_empty() {
            writeln!(self.output, "{}", cformat!("<yellow>Please enter a question.</>"))?;
            self.last_request_failed = true;
            return Ok(());
        }

        // The new turn is part of the context it is answered in
        self.conversation_state.add_user_message(input);
        let context = templates::chat_prompt(self.topic, &self.conversation_state);

        if let Some(response) = self.generate_response(&context).await? {
            writeln!(self.output, "{}", response)?;
            self.conversation_state.add_assistant_message(&response);
        }

        Ok(())
    }

    async fn process_template_input(&mut self, kind: TemplateKind, input: &str) -> Result<()> {
        let input = input.trim();
        if input.is_empty() {
            writeln!(self.output, "{}", cformat!("<yellow>{}</>", kind.empty_input_warning()))?;
            self.last_request_failed = true;
            return Ok(());
        }

        let prompt = kind.prompt(self.topic, input);

        if let Some(body) = self.generate_response(&prompt).await? {
            let response = NamedResponse::new(input, &body);
            writeln!(self.output, "{}", render_response(kind, &response))?;
            self.conversation_state.push_response(kind, response);
        }

        Ok(())
    }

    /// Relays `prompt`. A failed call is reported inline and yields `None`.
    async fn generate_response(&mut self, prompt: &str) -> Result<Option<String>> {
        let relay = match &self.relay {
            Some(relay) => relay,
            None => bail!("Gemini client not initialized"),
        };

        let result = relay.generate(prompt).await;

        self.last_request_failed = result.is_err();

        match result {
            Ok(text) => Ok(Some(text)),
            Err(e) => {
                error!("Generation failed: {}", e);
                writeln!(self.output, "{}", cformat!("<red>An error occurred: {}</>", e))?;
                Ok(None)
            }
        }
    }

    fn print_topics(&mut self) -> Result<()> {
        for topic in Topic::ALL {
            let marker = if topic == self.topic { "*" } else { " " };
            writeln!(self.output, "{} {}", marker, topic)?;
        }
        Ok(())
    }

    fn print_history(&mut self, target: HistoryTarget) -> Result<()> {
        match target {
            HistoryTarget::Chat => {
                let messages = self.conversation_state.get_messages();
                if messages.is_empty() {
                    writeln!(self.output, "No chat messages yet.")?;
                }
                // Newest first
                for turn in messages.iter().rev() {
                    writeln!(self.output, "{}", cformat!("<bold>{}:</> {}", turn.role, turn.content))?;
                }
            }
            HistoryTarget::Template(kind) => {
                let responses = self.conversation_state.responses(kind);
                if responses.is_empty() {
                    writeln!(self.output, "No {} responses yet.", kind.title())?;
                }
                for response in responses {
                    writeln!(
                        self.output,
                        "{}",
                        cformat!("<dim>[{}]</>", response.created_at.format("%Y-%m-%d %H:%M:%S UTC"))
                    )?;
                    writeln!(self.output, "{}", render_response(kind, response))?;
                }
            }
        }
        Ok(())
    }
}

fn render_response(kind: TemplateKind, response: &NamedResponse) -> String {
    let heading = cformat!("<bold>{}</>", kind.heading(&response.label));

    match kind {
        TemplateKind::ErrorHelp => format!(
            "{}\nError Description:\n{}\nPotential Causes and Fixes:\n{}\n",
            heading, response.label, response.body
        ),
        _ => format!("{}\n{}\n", heading, response.body),
    }
}
