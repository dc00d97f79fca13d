use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Drafting,
    Validating,
    Executing,
    Answering,
    Completed,
    HardStopped,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::HardStopped)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunEvent {
    CandidateDrafted,
    CandidateApproved,
    CandidateRejected,
    ResultObserved,
    AnswerProduced,
    ProviderFailed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub from: RunState,
    pub to: RunState,
    pub event: RunEvent,
    pub attempts: u32,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RunTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: RunState, event: RunEvent },
    #[error("attempt budget of {max_attempts} drafts is already spent")]
    BudgetSpent { max_attempts: u32 },
}

/// Draft/validate/execute/answer progression for one run with a hard cap on Act attempts.
///
/// `attempts` counts drafts, so a budget of `n` allows at most `n` candidates and the run
/// is guaranteed to leave `Drafting` for good after the `n`th rejection.
#[derive(Clone, Debug)]
pub struct RunFlow {
    state: RunState,
    attempts: u32,
    max_attempts: u32,
}

impl RunFlow {
    pub fn new(max_attempts: u32) -> Self {
        Self { state: RunState::Drafting, attempts: 0, max_attempts: max_attempts.max(1) }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn remaining_attempts(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts)
    }

    pub fn apply(&mut self, event: RunEvent) -> Result<TransitionOutcome, RunTransitionError> {
        use RunEvent::{
            AnswerProduced, CandidateApproved, CandidateDrafted, CandidateRejected,
            ProviderFailed, ResultObserved,
        };
        use RunState::{Answering, Completed, Drafting, Executing, HardStopped, Validating};

        let from = self.state;
        let to = match (from, event) {
            (Drafting, CandidateDrafted) => {
                if self.attempts >= self.max_attempts {
                    return Err(RunTransitionError::BudgetSpent {
                        max_attempts: self.max_attempts,
                    });
                }
                self.attempts += 1;
                Validating
            }
            (Validating, CandidateApproved) => Executing,
            (Validating, CandidateRejected) if self.attempts < self.max_attempts => Drafting,
            (Validating, CandidateRejected) => HardStopped,
            (Executing, ResultObserved) => Answering,
            (Answering, AnswerProduced) => Completed,
            (Drafting | Validating | Executing | Answering, ProviderFailed) => HardStopped,
            _ => return Err(RunTransitionError::InvalidTransition { state: from, event }),
        };

        self.state = to;
        Ok(TransitionOutcome { from, to, event, attempts: self.attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::{RunEvent, RunFlow, RunState, RunTransitionError};

    #[test]
    fn happy_path_reaches_completed_in_one_attempt() {
        let mut flow = RunFlow::new(2);
        for event in [
            RunEvent::CandidateDrafted,
            RunEvent::CandidateApproved,
            RunEvent::ResultObserved,
            RunEvent::AnswerProduced,
        ] {
            flow.apply(event).expect("valid transition");
        }
        assert_eq!(flow.state(), RunState::Completed);
        assert_eq!(flow.attempts(), 1);
        assert!(flow.state().is_terminal());
    }

    #[test]
    fn rejection_returns_to_drafting_while_budget_remains() {
        let mut flow = RunFlow::new(2);
        flow.apply(RunEvent::CandidateDrafted).expect("draft 1");
        let outcome = flow.apply(RunEvent::CandidateRejected).expect("reject 1");
        assert_eq!(outcome.to, RunState::Drafting);
        assert_eq!(flow.remaining_attempts(), 1);

        flow.apply(RunEvent::CandidateDrafted).expect("draft 2");
        let outcome = flow.apply(RunEvent::CandidateRejected).expect("reject 2");
        assert_eq!(outcome.to, RunState::HardStopped);
        assert_eq!(outcome.attempts, 2);
    }

    #[test]
    fn drafts_never_exceed_the_budget() {
        for budget in 1..=5 {
            let mut flow = RunFlow::new(budget);
            let mut drafts = 0;
            while flow.apply(RunEvent::CandidateDrafted).is_ok() {
                drafts += 1;
                flow.apply(RunEvent::CandidateRejected).expect("rejection is always accepted");
                if flow.state().is_terminal() {
                    break;
                }
            }
            assert_eq!(drafts, budget);
            assert_eq!(flow.state(), RunState::HardStopped);
        }
    }

    #[test]
    fn zero_budget_is_treated_as_one_attempt() {
        let mut flow = RunFlow::new(0);
        assert_eq!(flow.max_attempts(), 1);
        flow.apply(RunEvent::CandidateDrafted).expect("one draft is allowed");
    }

    #[test]
    fn invalid_and_terminal_transitions_are_refused() {
        let mut flow = RunFlow::new(1);
        assert_eq!(
            flow.apply(RunEvent::ResultObserved),
            Err(RunTransitionError::InvalidTransition {
                state: RunState::Drafting,
                event: RunEvent::ResultObserved,
            })
        );

        flow.apply(RunEvent::ProviderFailed).expect("provider failure halts the run");
        assert_eq!(flow.state(), RunState::HardStopped);
        assert!(flow.apply(RunEvent::CandidateDrafted).is_err());
    }

    #[test]
    fn budget_spent_is_reported_when_drafting_again() {
        let mut exhausted = RunFlow::new(1);
        exhausted.attempts = 1;
        assert_eq!(
            exhausted.apply(RunEvent::CandidateDrafted),
            Err(RunTransitionError::BudgetSpent { max_attempts: 1 })
        );
    }
}
