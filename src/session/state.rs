use std::fmt;

/// One of the three photographs taken per session, numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Shot(u8);

impl Shot {
    pub const COUNT: usize = 3;
    pub const FIRST: Shot = Shot(1);
    pub const LAST: Shot = Shot(Self::COUNT as u8);

    pub fn new(number: u8) -> Option<Self> {
        (1..=Self::LAST.0).contains(&number).then_some(Self(number))
    }

    pub fn number(self) -> u8 {
        self.0
    }

    /// Zero-based position inside the session's frame list.
    pub fn index(self) -> usize {
        usize::from(self.0 - 1)
    }

    pub fn next(self) -> Option<Self> {
        Self::new(self.0 + 1)
    }

    pub fn is_last(self) -> bool {
        self == Self::LAST
    }
}

impl fmt::Display for Shot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Prepare,
    Countdown(Shot),
    Captured(Shot),
    ConfirmPrint,
    Printing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Prepare => f.write_str("prepare"),
            Self::Countdown(shot) => write!(f, "countdown({shot})"),
            Self::Captured(shot) => write!(f, "captured({shot})"),
            Self::ConfirmPrint => f.write_str("confirm-print"),
            Self::Printing => f.write_str("printing"),
        }
    }
}

/// Something that happened during a tick and may move the session along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Trigger,
    PrepareElapsed,
    /// The camera delivered the frame for the current countdown.
    Captured,
    /// Every capture attempt for the current countdown failed.
    CaptureAborted,
    PreviewElapsed,
    CompositeReady,
    CompositeFailed,
    ConfirmTimedOut,
    /// Guest asked for another copy while printing.
    PrintMore,
    PrintFinished,
    SessionTimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStateChange {
    pub from: SessionState,
    pub to: SessionState,
}

impl SessionState {
    /// Resolve the state reached from `self` on `event`.
    ///
    /// Returns `None` when the event is not accepted in the current state;
    /// such events are dropped without side effects.
    pub fn transition(self, event: SessionEvent) -> Option<SessionState> {
        use SessionEvent as E;
        use SessionState as S;

        match (self, event) {
            // Printing leaves only once the queue drains.
            (S::Idle | S::Printing, E::SessionTimedOut) => None,
            (_, E::SessionTimedOut) => Some(S::Idle),

            (S::Idle, E::Trigger) => Some(S::Prepare),
            (S::Prepare, E::PrepareElapsed) => Some(S::Countdown(Shot::FIRST)),
            (S::Countdown(shot), E::Captured) => Some(S::Captured(shot)),
            (S::Countdown(_), E::CaptureAborted) => Some(S::Idle),
            (S::Captured(shot), E::PreviewElapsed) => shot.next().map(S::Countdown),
            (S::Captured(shot), E::CompositeReady) if shot.is_last() => Some(S::ConfirmPrint),
            (S::Captured(shot), E::CompositeFailed) if shot.is_last() => Some(S::Idle),
            (S::ConfirmPrint, E::Trigger) => Some(S::Printing),
            (S::ConfirmPrint, E::ConfirmTimedOut) => Some(S::Idle),
            (S::Printing, E::PrintMore) => Some(S::Printing),
            (S::Printing, E::PrintFinished) => Some(S::Idle),

            (
                S::Idle | S::Prepare | S::Countdown(_) | S::Captured(_) | S::ConfirmPrint
                | S::Printing,
                _,
            ) => None,
        }
    }

    /// Whether `self -> to` is one of the edges the session may take.
    pub fn is_valid_edge(self, to: SessionState) -> bool {
        use SessionEvent::*;
        [
            Trigger,
            PrepareElapsed,
            Captured,
            CaptureAborted,
            PreviewElapsed,
            CompositeReady,
            CompositeFailed,
            ConfirmTimedOut,
            PrintMore,
            PrintFinished,
            SessionTimedOut,
        ]
        .into_iter()
        .any(|event| self.transition(event) == Some(to))
    }

    /// States in which a trigger press means something.
    pub fn accepts_trigger(self) -> bool {
        matches!(self, Self::Idle | Self::ConfirmPrint | Self::Printing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shot(n: u8) -> Shot {
        Shot::new(n).unwrap()
    }

    #[test]
    fn shot_bounds() {
        assert!(Shot::new(0).is_none());
        assert!(Shot::new(4).is_none());
        assert_eq!(Shot::FIRST.next(), Some(shot(2)));
        assert_eq!(Shot::LAST.next(), None);
        assert_eq!(shot(3).index(), 2);
    }

    #[test]
    fn happy_path_walks_every_state() {
        use SessionEvent as E;
        let mut state = SessionState::Idle;
        let mut seen = vec![state];
        let events = [
            E::Trigger,
            E::PrepareElapsed,
            E::Captured,
            E::PreviewElapsed,
            E::Captured,
            E::PreviewElapsed,
            E::Captured,
            E::CompositeReady,
            E::Trigger,
            E::PrintMore,
            E::PrintFinished,
        ];
        for event in events {
            state = state.transition(event).unwrap();
            seen.push(state);
        }
        assert_eq!(
            seen,
            vec![
                SessionState::Idle,
                SessionState::Prepare,
                SessionState::Countdown(shot(1)),
                SessionState::Captured(shot(1)),
                SessionState::Countdown(shot(2)),
                SessionState::Captured(shot(2)),
                SessionState::Countdown(shot(3)),
                SessionState::Captured(shot(3)),
                SessionState::ConfirmPrint,
                SessionState::Printing,
                SessionState::Printing,
                SessionState::Idle,
            ]
        );
    }

    #[test]
    fn triggers_outside_accepting_states_are_ignored() {
        for state in [
            SessionState::Prepare,
            SessionState::Countdown(shot(2)),
            SessionState::Captured(shot(1)),
        ] {
            assert_eq!(state.transition(SessionEvent::Trigger), None);
            assert!(!state.accepts_trigger());
        }
        assert_eq!(
            SessionState::Printing.transition(SessionEvent::Trigger),
            None,
            "more copies arrive as PrintMore, not Trigger"
        );
    }

    #[test]
    fn last_preview_does_not_wrap() {
        assert_eq!(
            SessionState::Captured(Shot::LAST).transition(SessionEvent::PreviewElapsed),
            None
        );
        assert_eq!(
            SessionState::Captured(shot(1)).transition(SessionEvent::CompositeReady),
            None
        );
    }

    #[test]
    fn session_timeout_returns_to_idle_before_printing() {
        for state in [
            SessionState::Prepare,
            SessionState::Countdown(shot(1)),
            SessionState::Captured(shot(3)),
            SessionState::ConfirmPrint,
        ] {
            assert_eq!(
                state.transition(SessionEvent::SessionTimedOut),
                Some(SessionState::Idle)
            );
        }
        assert_eq!(
            SessionState::Idle.transition(SessionEvent::SessionTimedOut),
            None
        );
        assert_eq!(
            SessionState::Printing.transition(SessionEvent::SessionTimedOut),
            None
        );
    }

    #[test]
    fn edge_table() {
        assert!(SessionState::ConfirmPrint.is_valid_edge(SessionState::Idle));
        assert!(SessionState::Printing.is_valid_edge(SessionState::Printing));
        assert!(!SessionState::Idle.is_valid_edge(SessionState::Printing));
        assert!(!SessionState::Prepare.is_valid_edge(SessionState::Captured(shot(1))));
        assert!(!SessionState::Captured(shot(1)).is_valid_edge(SessionState::Countdown(shot(3))));
    }

    #[test]
    fn display_names() {
        assert_eq!(SessionState::Countdown(shot(2)).to_string(), "countdown(2)");
        assert_eq!(SessionState::ConfirmPrint.to_string(), "confirm-print");
    }
}
