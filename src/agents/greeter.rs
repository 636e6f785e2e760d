//! Greets users, explains the service and remembers names

use super::{AgentName, HandlerContext, HandlerReply};
use crate::db::Role;
use crate::state_machine::Turn;
use regex::Regex;
use std::sync::LazyLock;

/// "my name is" and "call me" take any word; "I am" and "I'm" only a
/// capitalised one
static NAME_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:(?i:my\s+name\s+is|call\s+me)\s+(?P<named>[A-Za-z][A-Za-z'-]*)|(?i:i\s+am|i'm)\s+(?P<intro>[A-Z][A-Za-z'-]*))",
    )
    .ok()
});

const MEMORY_QUERIES: [&str; 4] = ["what is my name", "what's my name", "who am i", "remember me"];

/// Words that commonly follow "I am" without being a name
const NOT_NAMES: [&str; 32] = [
    "a", "an", "the", "not", "so", "very", "really", "just", "here", "sure", "worried",
    "concerned", "afraid", "scared", "interested", "able", "confused", "new", "fine", "okay",
    "ok", "good", "glad", "happy", "sorry", "unsure", "nervous", "upset", "trying", "still",
    "also", "looking",
];

/// Stateless greeter; all memory comes from the session history
pub struct Greeter;

impl Greeter {
    pub fn process(&self, ctx: &HandlerContext<'_>) -> HandlerReply {
        let lowered = ctx.current_message.to_lowercase();

        if MEMORY_QUERIES.iter().any(|q| lowered.contains(q)) {
            let content = match find_user_name(ctx.history) {
                Some(name) => format!(
                    "Based on our conversation, your name is {name}. \
                     How can I help you with phone fraud detection today?"
                ),
                None => "I don't think you've told me your name yet. \
                         You're welcome to share it, or we can get straight to checking \
                         or reporting a phone number."
                    .to_string(),
            };
            return HandlerReply::new(AgentName::Greeter, content);
        }

        if let Some(name) = extract_name(ctx.current_message) {
            return HandlerReply::new(AgentName::Greeter, welcome(Some(&name)));
        }

        HandlerReply::new(AgentName::Greeter, welcome(find_user_name(ctx.history).as_deref()))
    }
}

fn welcome(name: Option<&str>) -> String {
    let opening = match name {
        Some(name) => format!("Hello {name}, welcome to our phone fraud detection service."),
        None => "Hello, welcome to our phone fraud detection service.".to_string(),
    };
    format!(
        "{opening} I'm here to help you identify and report suspicious phone numbers.\n\n\
         You can check whether a phone number is associated with known scams or fraudulent \
         activity, or report a number you suspect of being involved in phone fraud.\n\n\
         Would you like to check a phone number or report one?"
    )
}

/// Most recently stated name among the user's turns
fn find_user_name(history: &[Turn]) -> Option<String> {
    history
        .iter()
        .rev()
        .filter(|turn| turn.role == Role::User)
        .find_map(|turn| extract_name(&turn.content))
}

fn extract_name(text: &str) -> Option<String> {
    let pattern = NAME_PATTERN.as_ref()?;
    pattern.captures_iter(text).find_map(|caps| {
        let word = caps.name("named").or_else(|| caps.name("intro"))?.as_str();
        let lowered = word.to_lowercase();
        if NOT_NAMES.contains(&lowered.as_str()) || lowered.ends_with("ing") {
            return None;
        }
        Some(title_case(word))
    })
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
