//! Onboarding state machine.
//!
//! ```text
//! Signup --email--> EmailVerified --company--> VerifiedAndComplete
//!    \                                              ^
//!     --company--> UnverifiedAndComplete --email---/
//! ```

use super::{Account, OnboardingState};

/// Optional fields driving onboarding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Fields {
    /// A verified email is set.
    pub email: bool,
    pub company: bool,
}

impl Fields {
    /// Fields populated on a (merged) account.
    pub fn of(account: &Account) -> Self {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|v| !v.is_empty());

        Self {
            email: present(&account.email),
            company: present(&account.company),
        }
    }
}

/// One step of the machine. Unlisted pairs keep the current state.
pub fn transition(state: OnboardingState, fields: Fields) -> OnboardingState {
    use OnboardingState::*;

    match (state, fields.email, fields.company) {
        (Signup, true, _) => EmailVerified,
        (Signup, false, true) => UnverifiedAndComplete,
        (EmailVerified, _, true) => VerifiedAndComplete,
        (UnverifiedAndComplete, true, _) => VerifiedAndComplete,
        (state, _, _) => state,
    }
}

/// Run [`transition`] until the state settles.
pub fn advance(state: OnboardingState, fields: Fields) -> OnboardingState {
    let mut current = state;
    loop {
        let next = transition(current, fields);
        if next == current {
            return current;
        }
        current = next;
    }
}
