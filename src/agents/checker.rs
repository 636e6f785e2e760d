//! Looks phone numbers up in the fraud registry

use super::{AgentName, HandlerContext, HandlerReply};
use crate::db::FraudReport;
use crate::phone::{extract_phone_number, PhoneNumber};
use crate::runtime::FraudRegistry;
use std::sync::Arc;

/// Reported activity lines quoted back to the user
const MAX_ACTIVITY_LINES: usize = 3;

pub const FORMAT_HINT: &str =
    "in the format: +1-XXX-XXX-XXXX (for example: +1-555-123-4567)";

pub struct Checker<R: FraudRegistry> {
    registry: Arc<R>,
}

impl<R: FraudRegistry> Checker<R> {
    pub fn new(registry: Arc<R>) -> Self {
        Self { registry }
    }

    pub async fn process(&self, ctx: &HandlerContext<'_>) -> HandlerReply {
        let Some(phone) = extract_phone_number(ctx.current_message) else {
            return HandlerReply::new(
                AgentName::Checker,
                format!("I need a valid phone number to check. Please provide the number {FORMAT_HINT}"),
            );
        };

        let content = match self.registry.check_number(phone.canonical()).await {
            Ok(Some(report)) if report.report_count > 0 => summarize(&phone, &report),
            Ok(_) => format!(
                "No reports found for {phone}. That doesn't guarantee the number is safe, \
                 so stay cautious with unexpected calls. If this number tried to scam you, \
                 you can report it here."
            ),
            Err(e) => {
                tracing::warn!(phone = %phone, error = %e, "Fraud registry lookup failed");
                format!(
                    "I'm sorry, I couldn't check {phone} right now because the fraud database \
                     is unavailable. Please try again in a moment."
                )
            }
        };

        HandlerReply::new(AgentName::Checker, content)
    }
}

fn summarize(phone: &PhoneNumber, report: &FraudReport) -> String {
    let times = if report.report_count == 1 { "time" } else { "times" };
    let status = if report.is_fraud {
        "flagged as fraudulent"
    } else {
        "under review"
    };

    let lines: Vec<&str> = report
        .description
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let recent = lines.iter().rev().take(MAX_ACTIVITY_LINES).rev();

    let mut summary = format!(
        "Warning: {phone} has been reported {count} {times}. Status: {status}. \
         Last report: {updated}.",
        count = report.report_count,
        updated = report.last_updated_at.format("%Y-%m-%d"),
    );
    if !lines.is_empty() {
        summary.push_str("\n\nReported activity:");
        for line in recent {
            summary.push_str("\n- ");
            summary.push_str(line);
        }
    }
    summary.push_str("\n\nDo not share personal or financial information with this caller.");
    summary
}
