//! Send-eligibility predicate over a single row.
//!
//! Pure: no I/O, no clock. The caller supplies `today`.

use std::fmt;

use chrono::NaiveDate;

use crate::roster::{ApprovalStatus, Row, SendLock, SendStatus};

/// One condition of the send guardrail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clause {
    Approved,
    Unlocked,
    HasRecipient,
    NotReplied,
    StageActive,
    NotAlreadySent,
    DateReached,
    HasContent,
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Approved => "not approved",
            Self::Unlocked => "locked",
            Self::HasRecipient => "no recipient",
            Self::NotReplied => "already replied",
            Self::StageActive => "sequence complete",
            Self::NotAlreadySent => "current touch already sent",
            Self::DateReached => "touch not due yet",
            Self::HasContent => "touch has no subject/body",
        };
        f.write_str(name)
    }
}

/// Clause-by-clause evaluation of the guardrail for one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardrailCheck {
    pub approved: bool,
    pub unlocked: bool,
    pub has_recipient: bool,
    pub not_replied: bool,
    pub stage_active: bool,
    pub not_already_sent: bool,
    pub date_reached: bool,
    pub has_content: bool,
}

impl GuardrailCheck {
    pub fn evaluate(row: &Row, today: NaiveDate) -> Self {
        let current = row.current_content();
        Self {
            approved: row.approval == ApprovalStatus::Approved,
            unlocked: row.lock == SendLock::Unlocked,
            has_recipient: !row.recipient.trim().is_empty(),
            not_replied: !row.reply_status.is_replied(),
            stage_active: current.is_some(),
            not_already_sent: current.is_some_and(|(_, content)| {
                row.send_status != SendStatus::Sent && content.status != SendStatus::Sent
            }),
            date_reached: current
                .and_then(|(_, content)| content.scheduled_date())
                .is_some_and(|date| date <= today),
            has_content: current.is_some_and(|(_, content)| content.has_content()),
        }
    }

    fn clauses(&self) -> [(Clause, bool); 8] {
        [
            (Clause::Approved, self.approved),
            (Clause::Unlocked, self.unlocked),
            (Clause::HasRecipient, self.has_recipient),
            (Clause::NotReplied, self.not_replied),
            (Clause::StageActive, self.stage_active),
            (Clause::NotAlreadySent, self.not_already_sent),
            (Clause::DateReached, self.date_reached),
            (Clause::HasContent, self.has_content),
        ]
    }

    pub fn passes(&self) -> bool {
        self.clauses().iter().all(|(_, holds)| *holds)
    }

    /// The first clause that does not hold, in evaluation order.
    pub fn first_failure(&self) -> Option<Clause> {
        self.clauses()
            .iter()
            .find(|(_, holds)| !*holds)
            .map(|(clause, _)| *clause)
    }
}

/// Whether the send engine may act on `row` today.
pub fn is_sendable(row: &Row, today: NaiveDate) -> bool {
    GuardrailCheck::evaluate(row, today).passes()
}

/// Approved, unlocked, and the active touch has not gone out.
///
/// Used for the "next" listing; ignores dates and content.
pub fn is_actionable(row: &Row) -> bool {
    row.approval == ApprovalStatus::Approved
        && row.lock == SendLock::Unlocked
        && row.send_status == SendStatus::NotSent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::{ActiveTouch, ReplyStatus, Stage};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 10).unwrap()
    }

    fn ready_row() -> Row {
        let mut row = Row::new(1, "1", "a@example.com");
        row.approval = ApprovalStatus::Approved;
        row.lock = SendLock::Unlocked;
        row.stages[0].date = "2026-02-10".into();
        row.stages[0].subject = "Hi".into();
        row.stages[0].body = "Body".into();
        row
    }

    #[test]
    fn ready_row_is_sendable() {
        assert!(is_sendable(&ready_row(), today()));
    }

    /// For every combination of the six row-level clauses, the predicate
    /// equals their conjunction.
    #[test]
    fn exhaustive_clause_combinations() {
        for mask in 0u8..64 {
            let bit = |n: u8| mask & (1 << n) != 0;
            let mut row = ready_row();
            if !bit(0) {
                row.approval = if mask % 3 == 0 {
                    ApprovalStatus::Rejected
                } else {
                    ApprovalStatus::PendingReview
                };
            }
            if !bit(1) {
                row.lock = SendLock::Locked;
            }
            if !bit(2) {
                row.recipient = "  ".into();
            }
            if !bit(3) {
                if mask % 2 == 0 {
                    row.send_status = SendStatus::Sent;
                } else {
                    row.stages[0].status = SendStatus::Sent;
                }
            }
            if !bit(4) {
                row.stages[0].date = if mask % 2 == 0 { "2026-02-11".into() } else { "".into() };
            }
            if !bit(5) {
                if mask % 2 == 0 {
                    row.stages[0].subject.clear();
                } else {
                    row.stages[0].body = " ".into();
                }
            }

            let expected = (0..6).all(bit);
            assert_eq!(is_sendable(&row, today()), expected, "mask {mask:06b}");
            let check = GuardrailCheck::evaluate(&row, today());
            assert_eq!(check.passes(), expected, "mask {mask:06b}");
            assert_eq!(check.first_failure().is_none(), expected, "mask {mask:06b}");
        }
    }

    #[test]
    fn failed_touch_is_retried() {
        let mut row = ready_row();
        row.send_status = SendStatus::Failed;
        row.stages[0].status = SendStatus::Failed;
        assert!(is_sendable(&row, today()));
    }

    #[test]
    fn past_dates_are_due() {
        let mut row = ready_row();
        row.stages[0].date = "2025-12-31".into();
        assert!(is_sendable(&row, today()));
    }

    #[test]
    fn replied_rows_are_never_sendable() {
        let mut row = ready_row();
        row.reply_status = ReplyStatus::replied();
        let check = GuardrailCheck::evaluate(&row, today());
        assert!(!check.passes());
        assert_eq!(check.first_failure(), Some(Clause::NotReplied));
    }

    #[test]
    fn complete_rows_are_never_sendable() {
        let mut row = ready_row();
        row.active_touch = ActiveTouch::Complete;
        let check = GuardrailCheck::evaluate(&row, today());
        assert_eq!(check.first_failure(), Some(Clause::StageActive));
    }

    #[test]
    fn uses_content_of_active_touch() {
        let mut row = ready_row();
        row.active_touch = ActiveTouch::Stage(Stage::Touch2);
        assert!(!is_sendable(&row, today()));

        row.stages[1].date = "2026-02-09".into();
        row.stages[1].subject = "Follow up".into();
        row.stages[1].body = "Checking in".into();
        assert!(is_sendable(&row, today()));
    }

    #[test]
    fn first_failure_follows_clause_order() {
        let mut row = ready_row();
        row.lock = SendLock::Locked;
        row.recipient.clear();
        let check = GuardrailCheck::evaluate(&row, today());
        assert_eq!(check.first_failure(), Some(Clause::Unlocked));
    }

    #[test]
    fn actionable_ignores_date_and_content() {
        let mut row = Row::new(1, "1", "");
        row.approval = ApprovalStatus::Approved;
        row.lock = SendLock::Unlocked;
        assert!(is_actionable(&row));
        row.send_status = SendStatus::Failed;
        assert!(!is_actionable(&row));
    }
}
