//! Routing prompt construction
//!
//! The router sees the current message plus the earlier turns of the session,
//! rendered one per line as `User: ...` or `<agent>: ...`.

use crate::db::Role;
use crate::llm::LlmMessage;
use crate::state_machine::Turn;
use std::fmt::Write;

const ROUTING_PROMPT_HEAD: &str = r"You are a smart supervisor for a phone fraud detection system.
Your job is to understand user intent and route to the correct specialized agent.

Available agents:
- greeter: For general questions, greetings, and explaining the service
- checker: When user wants to verify if a phone number has fraud reports
- reporter: When user wants to report a fraudulent number
- FINISH: When the conversation should end";

const ROUTING_PROMPT_TAIL: &str = r#"Analyze the message and determine which agent should handle it. Consider:
1. Is this a greeting or general question? Route to 'greeter'
2. Is the user trying to check a number? Route to 'checker'
3. Is the user trying to report fraud? Route to 'reporter'
4. Is this a follow-up to a completed action? Route to 'FINISH'

You must respond with a valid JSON object in this exact format:
{
    "decision": {
        "selected_agent": "greeter/checker/reporter/FINISH",
        "reasoning": "brief explanation of why you chose this agent"
    }
}

Example responses:
{"decision": {"selected_agent": "greeter", "reasoning": "Initial greeting and service introduction needed"}}
{"decision": {"selected_agent": "checker", "reasoning": "User wants to check a specific phone number"}}
{"decision": {"selected_agent": "reporter", "reasoning": "User wants to report fraudulent activity"}}
{"decision": {"selected_agent": "FINISH", "reasoning": "Task completed, no further action needed"}}"#;

/// Build the router's system prompt.
///
/// `history` holds the turns before `current_message`, oldest first.
pub fn routing_prompt(current_message: &str, history: &[Turn]) -> String {
    let mut prompt = String::from(ROUTING_PROMPT_HEAD);
    let _ = write!(prompt, "\n\nCurrent user message: {current_message}\n\nPrevious context:\n");

    let formatted = format_history(history);
    if formatted.is_empty() {
        prompt.push_str("(no previous messages)");
    } else {
        prompt.push_str(&formatted);
    }

    prompt.push_str("\n\n");
    prompt.push_str(ROUTING_PROMPT_TAIL);
    prompt
}

/// Render turns as `User: ...` / `<agent>: ...` lines
pub fn format_history(history: &[Turn]) -> String {
    let mut out = String::new();
    for turn in history {
        let speaker = match turn.role {
            Role::User => "User",
            Role::Assistant => turn.agent.as_deref().unwrap_or("assistant"),
            Role::System => "system",
        };
        if !out.is_empty() {
            out.push('\n');
        }
        let _ = write!(out, "{speaker}: {}", turn.content);
    }
    out
}

/// Chat message for a stored turn; system notes go out as user text
impl From<&Turn> for LlmMessage {
    fn from(turn: &Turn) -> Self {
        match turn.role {
            Role::Assistant => LlmMessage::assistant(turn.content.clone(), turn.agent.clone()),
            Role::User | Role::System => LlmMessage::user(turn.content.clone()),
        }
    }
}
