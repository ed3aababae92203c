//! crates/booking_core/src/ledger.rs
//!
//! The credit ledger. [`post`] is the only path to a balance change: it hands a
//! single entry to `StoreTransaction::post_ledger_entry`, which moves the
//! counter and appends the row in the caller's transaction.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{CreditTransaction, CreditTransactionKind, NewCreditTransaction};
use crate::error::{BookingError, BookingResult};
use crate::ports::StoreTransaction;

/// A balance change waiting for a student id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub amount: i32,
    pub kind: CreditTransactionKind,
    pub description: String,
}

impl LedgerEntry {
    pub fn purchase(credits: i32) -> Self {
        Self {
            amount: credits,
            kind: CreditTransactionKind::Purchase,
            description: "Initial package assignment".to_string(),
        }
    }

    /// One credit consumed by a session, at booking or completion time.
    pub fn session_booking(description: String) -> Self {
        Self {
            amount: -1,
            kind: CreditTransactionKind::SessionBooking,
            description,
        }
    }

    pub fn adjustment(amount: i32) -> Self {
        Self {
            amount,
            kind: CreditTransactionKind::Adjustment,
            description: "Manual credit adjustment by Admin".to_string(),
        }
    }

    pub fn backfill_deduction(sessions: i32) -> Self {
        Self {
            amount: -sessions,
            kind: CreditTransactionKind::Deduction,
            description: format!("Backfill: Logged {} past sessions", sessions),
        }
    }

    /// Gives back the credit a removed or canceled session had consumed.
    pub fn refund(session_start: DateTime<Utc>) -> Self {
        Self {
            amount: 1,
            kind: CreditTransactionKind::Refund,
            description: format!(
                "Refund: Session on {} removed",
                session_start.format("%a %b %d %Y")
            ),
        }
    }
}

/// Applies `entry` to the student's balance and records it, returning the new balance.
pub async fn post(
    tx: &mut dyn StoreTransaction,
    student_id: Uuid,
    entry: LedgerEntry,
) -> BookingResult<i32> {
    if entry.amount == 0 {
        return Err(BookingError::InvalidInput(
            "credit changes must be non-zero".to_string(),
        ));
    }
    let row = NewCreditTransaction {
        student_id,
        amount: entry.amount,
        kind: entry.kind,
        description: entry.description,
    };
    let (recorded, balance) = tx.post_ledger_entry(&row).await?;
    tracing::debug!(
        student_id = %student_id,
        amount = recorded.amount,
        kind = recorded.kind.as_str(),
        balance,
        "Ledger entry posted"
    );
    Ok(balance)
}

/// Comparison of the running balance against the sum of the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub ledger_total: i64,
    pub balance: i32,
    /// `balance - ledger_total`; zero when the counter and the ledger agree.
    pub drift: i64,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.drift == 0
    }
}

pub fn reconcile(balance: i32, history: &[CreditTransaction]) -> Reconciliation {
    let ledger_total: i64 = history.iter().map(|t| i64::from(t.amount)).sum();
    Reconciliation {
        ledger_total,
        balance,
        drift: i64::from(balance) - ledger_total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewStudent;
    use crate::memory::InMemoryStore;
    use crate::ports::BookingStore;

    fn row(amount: i32, kind: CreditTransactionKind) -> CreditTransaction {
        CreditTransaction {
            id: Uuid::new_v4(),
            student_id: Uuid::nil(),
            amount,
            kind,
            description: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn reconcile_reports_drift() {
        let history = vec![
            row(10, CreditTransactionKind::Purchase),
            row(-1, CreditTransactionKind::SessionBooking),
            row(1, CreditTransactionKind::Refund),
            row(-3, CreditTransactionKind::Deduction),
        ];
        let ok = reconcile(7, &history);
        assert!(ok.is_consistent());
        assert_eq!(ok.ledger_total, 7);

        let off = reconcile(9, &history);
        assert_eq!(off.drift, 2);
        assert!(!off.is_consistent());
    }

    #[test]
    fn entry_signs_follow_their_kind() {
        assert_eq!(LedgerEntry::session_booking(String::new()).amount, -1);
        assert_eq!(LedgerEntry::backfill_deduction(4).amount, -4);
        assert_eq!(LedgerEntry::refund(Utc::now()).amount, 1);
        assert_eq!(LedgerEntry::adjustment(-2).amount, -2);
    }

    #[tokio::test]
    async fn post_moves_balance_and_appends_row_together() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let student = tx
            .insert_student(&NewStudent {
                email: "ada@example.com".to_string(),
                name: "Ada".to_string(),
                initial_credits: 0,
                default_duration_minutes: 60,
            })
            .await
            .unwrap();

        let balance = post(tx.as_mut(), student.id, LedgerEntry::adjustment(5))
            .await
            .unwrap();
        assert_eq!(balance, 5);
        let balance = post(
            tx.as_mut(),
            student.id,
            LedgerEntry::session_booking("Session".to_string()),
        )
        .await
        .unwrap();
        assert_eq!(balance, 4);
        tx.commit().await.unwrap();

        let history = store.list_credit_transactions(student.id).await.unwrap();
        assert_eq!(history.len(), 2);
        let stored = store.get_student(student.id).await.unwrap().unwrap();
        assert!(reconcile(stored.credits, &history).is_consistent());
    }

    #[tokio::test]
    async fn zero_amounts_are_rejected_before_touching_storage() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let result = post(tx.as_mut(), Uuid::new_v4(), LedgerEntry::adjustment(0)).await;
        assert!(matches!(result, Err(BookingError::InvalidInput(_))));
    }
}
