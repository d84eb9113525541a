//! Lifecycle gate: does the form take a submission from this actor now?

use crate::access::Actor;
use crate::error::{SubmitError, UnavailableReason};
use crate::form::{Form, FormState};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Accept,
    Reject(SubmitError),
}

impl Admission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Admission::Accept)
    }

    pub fn into_result(self) -> Result<(), SubmitError> {
        match self {
            Admission::Accept => Ok(()),
            Admission::Reject(err) => Err(err),
        }
    }
}

/// Evaluate the gate.
///
/// `prior_submissions` is how many submissions the actor already has on
/// this form; the caller must read it under the same isolation boundary as
/// the subsequent insert. The owner is exempt from the one-submission rule.
pub fn can_accept(
    form: &Form,
    actor: &Actor,
    now: DateTime<Utc>,
    prior_submissions: usize,
) -> Admission {
    match form.state {
        FormState::Closed | FormState::Archived => {
            return Admission::Reject(SubmitError::FormUnavailable(
                UnavailableReason::NotAcceptingAnswers,
            ));
        }
        FormState::Active => {}
    }

    if form.is_expired_at(now) {
        return Admission::Reject(SubmitError::FormUnavailable(UnavailableReason::Expired));
    }

    if !form.submit_multiple && prior_submissions > 0 && !form.is_owner(actor.user_id()) {
        return Admission::Reject(SubmitError::AlreadySubmitted);
    }

    Admission::Accept
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 9, 30, 0)
            .single()
            .expect("fixed time")
    }

    #[test]
    fn closed_and_archived_reject_even_the_owner() {
        for state in [FormState::Closed, FormState::Archived] {
            let mut form = Form::new(1, "h", "alice");
            form.state = state;
            assert_eq!(
                can_accept(&form, &Actor::user("alice"), now(), 0),
                Admission::Reject(SubmitError::FormUnavailable(
                    UnavailableReason::NotAcceptingAnswers
                ))
            );
        }
    }

    #[test]
    fn expiry_rejects_while_state_reads_active() {
        let mut form = Form::new(1, "h", "alice");
        form.expires_at = Some(now() - Duration::minutes(1));
        assert_eq!(form.state, FormState::Active);
        assert_eq!(
            can_accept(&form, &Actor::user("bob"), now(), 0),
            Admission::Reject(SubmitError::FormUnavailable(UnavailableReason::Expired))
        );

        form.expires_at = Some(now() + Duration::minutes(1));
        assert!(can_accept(&form, &Actor::user("bob"), now(), 0).is_accepted());
    }

    #[test]
    fn second_submission_rejected_unless_multiple_or_owner() {
        let mut form = Form::new(1, "h", "alice");
        let bob = Actor::user("bob");
        assert!(can_accept(&form, &bob, now(), 0).is_accepted());
        assert_eq!(
            can_accept(&form, &bob, now(), 1),
            Admission::Reject(SubmitError::AlreadySubmitted)
        );
        assert!(can_accept(&form, &Actor::user("alice"), now(), 3).is_accepted());

        form.submit_multiple = true;
        assert!(can_accept(&form, &bob, now(), 5).is_accepted());
    }
}
