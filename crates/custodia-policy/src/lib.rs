//! Custodia Policy - Limit checks
//!
//! Pure validators with no state and no side effects. Each returns `Ok(())`
//! or the specific `ValidationError` it guards against, so the executor can
//! chain them with `?` and call them speculatively.

use custodia_types::{Amount, ValidationError};

pub type PolicyResult = std::result::Result<(), ValidationError>;

/// Reject zero amounts
pub fn check_non_zero(amount: Amount) -> PolicyResult {
    if amount.is_zero() {
        return Err(ValidationError::AmountZero);
    }
    Ok(())
}

/// Reject an incoming amount that would push the aggregate above `cap`
///
/// An overflowing sum is treated as exceeding the cap.
pub fn check_capacity(current_total: Amount, incoming: Amount, cap: Amount) -> PolicyResult {
    match current_total.checked_add(incoming) {
        Some(total) if total <= cap => Ok(()),
        _ => Err(ValidationError::CapacityExceeded {
            current: current_total,
            incoming,
            cap,
        }),
    }
}

/// Reject a single withdrawal above the per-operation ceiling
pub fn check_withdrawal_ceiling(amount: Amount, ceiling: Amount) -> PolicyResult {
    if amount > ceiling {
        return Err(ValidationError::WithdrawalCeilingExceeded { amount, ceiling });
    }
    Ok(())
}

/// Reject a debit larger than the available balance
pub fn check_sufficient_balance(available: Amount, required: Amount) -> PolicyResult {
    if required > available {
        return Err(ValidationError::InsufficientBalance {
            available,
            required,
        });
    }
    Ok(())
}
