//! Oldest-first history eviction.

use std::collections::HashSet;

use super::budget::TokenBudget;
use crate::types::Message;

/// Default number of eviction steps before giving up.
pub const DEFAULT_MAX_EVICTIONS: usize = 10;

/// What a trim pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrimReport {
    /// Eviction steps taken.
    pub steps: usize,
    /// Messages removed, including paired tool responses.
    pub removed: usize,
    /// Whether the log still exceeds the budget.
    pub still_over_limit: bool,
}

/// Evict the oldest messages until `messages` fits `budget`.
///
/// Each step removes the head message; when that message requested tool
/// calls, every tool response answering it is removed in the same step so the
/// pairing is never split. Gives up after `max_evictions` steps and never
/// removes the last remaining message.
pub fn trim_history(
    messages: &mut Vec<Message>,
    budget: &TokenBudget,
    max_evictions: usize,
) -> TrimReport {
    let mut report = TrimReport::default();

    while report.steps < max_evictions && messages.len() > 1 && budget.is_over_limit(messages) {
        let removed = messages.remove(0);
        report.steps += 1;
        report.removed += 1;

        if removed.has_tool_calls() {
            let answered: HashSet<&str> = removed
                .tool_calls()
                .iter()
                .map(|call| call.id.as_str())
                .collect();
            while messages.len() > 1
                && messages
                    .first()
                    .and_then(Message::tool_call_id)
                    .is_some_and(|id| answered.contains(id))
            {
                messages.remove(0);
                report.removed += 1;
            }
        }

        while messages.len() > 1 && messages.first().is_some_and(|m| m.tool_call_id().is_some()) {
            messages.remove(0);
            report.removed += 1;
        }
    }

    report.still_over_limit = budget.is_over_limit(messages);
    if report.still_over_limit && report.steps > 0 {
        tracing::warn!(
            steps = report.steps,
            remaining = messages.len(),
            "history still over budget after trimming"
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{validate_pairing, ToolCallRequest};
    use pretty_assertions::assert_eq;

    fn tight_budget() -> TokenBudget {
        // threshold = 10 tokens = 40 chars
        TokenBudget {
            context_window: 20,
            threshold_ratio: 0.5,
            threshold_floor_tokens: 0,
        }
    }

    #[test]
    fn under_budget_log_is_unchanged() {
        let mut log = vec![Message::user("hi"), Message::assistant("hello")];
        let before = log.clone();
        let report = trim_history(&mut log, &TokenBudget::new(128_000), 10);
        assert_eq!(log, before);
        assert_eq!(report, TrimReport::default());
    }

    #[test]
    fn evicts_oldest_until_under_budget() {
        let mut log = vec![
            Message::user("a".repeat(40)),
            Message::assistant("b".repeat(20)),
            Message::user("c".repeat(12)),
        ];
        let report = trim_history(&mut log, &tight_budget(), 10);
        assert_eq!(log, vec![Message::assistant("b".repeat(20)), Message::user("c".repeat(12))]);
        assert_eq!(report.steps, 1);
        assert!(!report.still_over_limit);
    }

    #[test]
    fn evicts_every_paired_tool_response() {
        let mut log = vec![
            Message::assistant_tool_calls(vec![
                ToolCallRequest::new("a", "f", "x".repeat(30)),
                ToolCallRequest::new("b", "g", "{}"),
            ]),
            Message::tool_result("a", "1"),
            Message::tool_result("b", "2"),
            Message::user("next"),
        ];
        let report = trim_history(&mut log, &tight_budget(), 10);
        assert_eq!(log, vec![Message::user("next")]);
        assert_eq!(report.steps, 1);
        assert_eq!(report.removed, 3);
        assert_eq!(validate_pairing(&log), Ok(()));
    }

    #[test]
    fn never_leaves_orphan_tool_head() {
        let mut log = vec![
            Message::user("z".repeat(60)),
            Message::tool_result("dangling", "x"),
            Message::user("keep"),
        ];
        trim_history(&mut log, &tight_budget(), 10);
        assert_eq!(log, vec![Message::user("keep")]);
    }

    #[test]
    fn keeps_the_last_message_even_when_over_budget() {
        let mut log = vec![Message::user("a".repeat(100)), Message::user("b".repeat(100))];
        let report = trim_history(&mut log, &tight_budget(), 10);
        assert_eq!(log.len(), 1);
        assert!(report.still_over_limit);
    }

    #[test]
    fn gives_up_after_max_evictions() {
        let mut log: Vec<Message> = (0..6).map(|_| Message::user("a".repeat(40))).collect();
        let report = trim_history(&mut log, &tight_budget(), 2);
        assert_eq!(report.steps, 2);
        assert_eq!(log.len(), 4);
        assert!(report.still_over_limit);
    }
}
