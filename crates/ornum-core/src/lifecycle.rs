//! # Issued Number Lifecycle
//!
//! ## State Machine
//! ```text
//!                  mark_used(tx)
//!             ┌──────────────────► USED     (terminal)
//!             │
//!   GENERATED ┤
//!             │
//!             └──────────────────► VOIDED   (terminal)
//!              mark_voided(user, reason)
//!
//!   USED ──X──► anything      VOIDED ──X──► anything
//! ```
//!
//! A voided number is never handed out again.

use chrono::{DateTime, Utc};

use crate::error::{CoreError, CoreResult};
use crate::types::{IssuedNumber, IssuedNumberStatus};
use crate::validation::{validate_transaction_ref, validate_user_id, validate_void_reason};

impl IssuedNumberStatus {
    /// Only `generated → used` and `generated → voided` are legal.
    pub const fn can_transition_to(self, next: IssuedNumberStatus) -> bool {
        matches!(
            (self, next),
            (IssuedNumberStatus::Generated, IssuedNumberStatus::Used)
                | (IssuedNumberStatus::Generated, IssuedNumberStatus::Voided)
        )
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, IssuedNumberStatus::Used | IssuedNumberStatus::Voided)
    }
}

/// Fails with `InvalidTransition` unless `from → to` is legal.
pub fn ensure_transition(
    id: &str,
    from: IssuedNumberStatus,
    to: IssuedNumberStatus,
) -> CoreResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            id: id.to_string(),
            from,
            to,
        })
    }
}

impl IssuedNumber {
    /// Binds the number to a completed transaction.
    pub fn mark_used(&mut self, transaction_ref: &str, at: DateTime<Utc>) -> CoreResult<()> {
        validate_transaction_ref(transaction_ref)?;
        ensure_transition(&self.id, self.status, IssuedNumberStatus::Used)?;

        self.status = IssuedNumberStatus::Used;
        self.transaction_ref = Some(transaction_ref.trim().to_string());
        self.used_at = Some(at);
        Ok(())
    }

    /// Discards the number before use. `reason` is required.
    pub fn mark_voided(
        &mut self,
        voided_by: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> CoreResult<()> {
        validate_user_id(voided_by)?;
        let reason = validate_void_reason(reason)?;
        ensure_transition(&self.id, self.status, IssuedNumberStatus::Voided)?;

        self.status = IssuedNumberStatus::Voided;
        self.voided_by = Some(voided_by.to_string());
        self.void_reason = Some(reason);
        self.voided_at = Some(at);
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
