//! Session lifecycle transitions.
//!
//! Each action lists the statuses it may start from. The store applies an
//! action as one conditional `UPDATE ... WHERE status = ANY(from)`; a miss is
//! reported as a conflict.

use std::fmt;

use crate::models::chat::ChatStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionAction {
    Accept,
    Start,
    End,
    Cancel,
}

impl SessionAction {
    pub const ALL: &'static [SessionAction] = &[Self::Accept, Self::Start, Self::End, Self::Cancel];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Start => "start",
            Self::End => "end",
            Self::Cancel => "cancel",
        }
    }

    /// Statuses from which this action is legal.
    pub const fn allowed_from(self) -> &'static [ChatStatus] {
        match self {
            Self::Accept => &[ChatStatus::Requested],
            Self::Start => &[ChatStatus::Accepted],
            Self::End => &[ChatStatus::Active, ChatStatus::Accepted],
            Self::Cancel => &[ChatStatus::Requested, ChatStatus::Accepted],
        }
    }

    pub const fn target(self) -> ChatStatus {
        match self {
            Self::Accept => ChatStatus::Accepted,
            Self::Start => ChatStatus::Active,
            Self::End => ChatStatus::Ended,
            Self::Cancel => ChatStatus::Canceled,
        }
    }

    /// Column stamped when the action succeeds.
    pub(crate) const fn timestamp_column(self) -> &'static str {
        match self {
            Self::Accept => "accepted_at",
            Self::Start => "started_at",
            Self::End => "ended_at",
            Self::Cancel => "canceled_at",
        }
    }

    /// Machine code reported when the action's guard fails.
    pub const fn failure_code(self) -> &'static str {
        match self {
            Self::Accept => "cannot_accept",
            Self::Start => "cannot_start",
            Self::End => "cannot_end",
            Self::Cancel => "cannot_cancel",
        }
    }

    /// Only the assigned astrologer may accept; other actions are open to
    /// either participant.
    pub const fn astrologer_only(self) -> bool {
        matches!(self, Self::Accept)
    }
}

impl fmt::Display for SessionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The status reached by applying `action` to `current`, if legal.
pub fn next_status(current: ChatStatus, action: SessionAction) -> Option<ChatStatus> {
    action
        .allowed_from()
        .contains(&current)
        .then_some(action.target())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legal_edge(from: ChatStatus, to: ChatStatus) -> bool {
        use ChatStatus::*;
        matches!(
            (from, to),
            (Requested, Accepted)
                | (Accepted, Active)
                | (Active, Ended)
                | (Accepted, Ended)
                | (Requested, Canceled)
                | (Accepted, Canceled)
        )
    }

    #[test]
    fn transition_table() {
        use ChatStatus::*;
        use SessionAction::*;
        assert_eq!(next_status(Requested, Accept), Some(Accepted));
        assert_eq!(next_status(Accepted, Start), Some(Active));
        assert_eq!(next_status(Active, End), Some(Ended));
        assert_eq!(next_status(Accepted, End), Some(Ended));
        assert_eq!(next_status(Requested, Cancel), Some(Canceled));
        assert_eq!(next_status(Accepted, Cancel), Some(Canceled));

        assert_eq!(next_status(Requested, Start), None);
        assert_eq!(next_status(Requested, End), None);
        assert_eq!(next_status(Active, Cancel), None);
        assert_eq!(next_status(Active, Accept), None);
        for action in SessionAction::ALL {
            assert_eq!(next_status(Ended, *action), None);
            assert_eq!(next_status(Canceled, *action), None);
        }
    }

    #[test]
    fn every_action_sequence_follows_legal_edges() {
        // Exhaustively apply every sequence of up to five actions.
        let mut frontier = vec![vec![ChatStatus::Requested]];
        for _ in 0..5 {
            let mut next = Vec::new();
            for history in &frontier {
                let current = *history.last().unwrap();
                for action in SessionAction::ALL {
                    let mut h = history.clone();
                    if let Some(status) = next_status(current, *action) {
                        h.push(status);
                    }
                    next.push(h);
                }
            }
            frontier = next;
        }
        for history in frontier {
            for pair in history.windows(2) {
                assert!(legal_edge(pair[0], pair[1]), "illegal edge in {history:?}");
            }
            let ended = history.contains(&ChatStatus::Ended);
            let canceled = history.contains(&ChatStatus::Canceled);
            assert!(!(ended && canceled), "both terminals in {history:?}");
        }
    }

    #[test]
    fn failure_codes_are_stable() {
        let codes: Vec<_> = SessionAction::ALL.iter().map(|a| a.failure_code()).collect();
        assert_eq!(codes, ["cannot_accept", "cannot_start", "cannot_end", "cannot_cancel"]);
    }
}
