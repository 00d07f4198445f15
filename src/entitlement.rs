use crate::accounts::Account;

/// Outcome of an entitlement check. Resolving never mutates state; the
/// consumption (flipping the trial flag or decrementing credits) happens in
/// the same transaction that records the submission, under the account row
/// lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    AllowFree,
    AllowPaid,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        !matches!(self, Decision::Deny)
    }
}

/// The unused free trial wins over paid credits; paid credits require a
/// positive balance.
pub fn resolve(account: &Account) -> Decision {
    if !account.free_trial_used {
        Decision::AllowFree
    } else if account.credits > 0 {
        Decision::AllowPaid
    } else {
        Decision::Deny
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn account(credits: i64, free_trial_used: bool) -> Account {
        Account {
            id: Uuid::new_v4(),
            email: "user@example.com".into(),
            display_name: "User".into(),
            credits,
            free_trial_used,
            total_spent: 0,
            total_followups_created: 0,
            payment_customer_ref: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn fresh_account_gets_free_trial() {
        assert_eq!(resolve(&account(0, false)), Decision::AllowFree);
    }

    #[test]
    fn free_trial_wins_even_with_credits() {
        assert_eq!(resolve(&account(5, false)), Decision::AllowFree);
    }

    #[test]
    fn used_trial_with_credits_is_paid() {
        assert_eq!(resolve(&account(1, true)), Decision::AllowPaid);
    }

    #[test]
    fn used_trial_without_credits_is_denied() {
        let decision = resolve(&account(0, true));
        assert_eq!(decision, Decision::Deny);
        assert!(!decision.is_allowed());
    }
}
