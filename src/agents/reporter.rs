//! Registers fraud reports once a number and a usable description are known

use super::checker::FORMAT_HINT;
use super::{AgentName, HandlerContext, HandlerReply};
use crate::db::Role;
use crate::phone::{extract_phone_number, remove_phone_numbers, PhoneNumber};
use crate::runtime::FraudRegistry;
use regex::Regex;
use std::sync::{Arc, LazyLock};

/// Leading "report this number" style command; the rest of the message is
/// the user's account of the call
static COMMAND_PREFIX: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:please\s+)?(?:(?:i\s+(?:want|need|would\s+like)|i'd\s+like)\s+to\s+)?(?:please\s+)?report(?:ing)?\b(?:\s+(?:this|that|the|a|their)?\s*(?:phone\s+)?number\b)?",
    )
    .ok()
});

/// Connectives left dangling at the front once the command is gone
const LEADING_CONNECTIVES: [&str; 6] = ["for", "as", "because", "since", "about", "and"];

/// Descriptions that name a category without saying what happened
const PLACEHOLDERS: [&str; 14] = [
    "spam",
    "spam call",
    "spam calls",
    "scam",
    "scam call",
    "scam calls",
    "fraud",
    "fraud calls",
    "fraudulent",
    "suspicious",
    "suspicious calls",
    "robocall",
    "robocalls",
    "unknown caller",
];

const MIN_DESCRIPTION_WORDS: usize = 3;

pub struct Reporter<R: FraudRegistry> {
    registry: Arc<R>,
}

impl<R: FraudRegistry> Reporter<R> {
    pub fn new(registry: Arc<R>) -> Self {
        Self { registry }
    }

    pub async fn process(&self, ctx: &HandlerContext<'_>) -> HandlerReply {
        let Some(phone) = find_number(ctx) else {
            return HandlerReply::new(
                AgentName::Reporter,
                format!(
                    "I can help you report a suspicious number. Please provide the phone number \
                     {FORMAT_HINT}, along with a description of what happened."
                ),
            );
        };

        let description = extract_description(ctx.current_message);
        if is_vague(&description) {
            return HandlerReply::new(
                AgentName::Reporter,
                format!(
                    "To report {phone} I need a few more details about what happened. \
                     Please describe the call, for example who the caller claimed to be \
                     and what they asked you for."
                ),
            );
        }

        let content = match self
            .registry
            .report_fraud(phone.canonical(), &description, ctx.reporter_ip)
            .await
        {
            Ok(report) => {
                let times = if report.report_count == 1 { "time" } else { "times" };
                format!(
                    "Thank you. I've registered {phone} as a suspected fraud number. \
                     It has now been reported {count} {times}. \
                     Your report helps protect others from this scam.",
                    count = report.report_count,
                )
            }
            Err(e) => {
                tracing::warn!(phone = %phone, error = %e, "Fraud report could not be saved");
                format!(
                    "I'm sorry, I couldn't save your report for {phone} because the fraud \
                     database is unavailable. Please try again shortly."
                )
            }
        };

        HandlerReply::new(AgentName::Reporter, content)
    }
}

/// Number from the current turn, else the most recent earlier user turn
fn find_number(ctx: &HandlerContext<'_>) -> Option<PhoneNumber> {
    extract_phone_number(ctx.current_message).or_else(|| {
        ctx.history
            .iter()
            .rev()
            .filter(|turn| turn.role == Role::User)
            .find_map(|turn| extract_phone_number(&turn.content))
    })
}

/// The message minus phone numbers and the leading command, otherwise as written
fn extract_description(message: &str) -> String {
    let without_numbers = remove_phone_numbers(message);
    let mut rest = COMMAND_PREFIX
        .as_ref()
        .and_then(|prefix| prefix.find(&without_numbers))
        .and_then(|m| without_numbers.get(m.end()..))
        .unwrap_or(without_numbers.as_str());

    loop {
        rest = rest.trim_start_matches(is_separator);
        let (word, tail) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        if !LEADING_CONNECTIVES.contains(&word.to_lowercase().as_str()) {
            break;
        }
        rest = tail;
    }

    rest.trim_end_matches(is_separator).to_string()
}

fn is_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, ',' | ':' | ';' | '-')
}

fn is_vague(description: &str) -> bool {
    let normalized = description.to_lowercase();
    normalized.is_empty()
        || PLACEHOLDERS.contains(&normalized.as_str())
        || normalized.split_whitespace().count() < MIN_DESCRIPTION_WORDS
}
