//! Payment register: the append-only log of money received from students.
//!
//! There is no update or delete operation. A mistaken payment is corrected by
//! recording another one, so a student's total paid never decreases.

use crate::error::{LedgerError, Result};
use crate::money::Vnd;
use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use std::sync::{PoisonError, RwLock, RwLockReadGuard};

/// Payment identifier, assigned sequentially from 1.
pub type PaymentId = u32;

/// A recorded payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payment {
    pub id: PaymentId,
    pub student_id: String,
    /// Always strictly positive.
    pub amount: Vnd,
    pub recorded_at: DateTime<Utc>,
    /// Administrator who recorded the payment.
    pub recorder_id: String,
    /// Typically the transfer description seen on the bank statement.
    pub memo: Option<String>,
}

#[derive(Debug, Default)]
pub struct PaymentRegister {
    payments: RwLock<Vec<Payment>>,
}

impl PaymentRegister {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Payment>> {
        self.payments.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a payment.
    ///
    /// Fails with `InvalidAmount` unless `amount` is strictly positive, and
    /// with `AmountOverflow` if the register's combined total would no longer
    /// fit. The register is left unchanged in either case.
    pub fn record_payment(
        &self,
        student_id: &str,
        amount: Vnd,
        recorder_id: &str,
        memo: Option<&str>,
    ) -> Result<Payment> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(amount));
        }
        if student_id.trim().is_empty() {
            return Err(LedgerError::InvalidInput("empty student id".to_string()));
        }

        let mut payments = self.payments.write().unwrap_or_else(PoisonError::into_inner);
        Vnd::checked_sum(payments.iter().map(|p| p.amount))?.checked_add(amount)?;
        let payment = Payment {
            id: payments.len() as PaymentId + 1,
            student_id: student_id.to_string(),
            amount,
            recorded_at: Utc::now(),
            recorder_id: recorder_id.to_string(),
            memo: memo
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string),
        };
        payments.push(payment.clone());

        debug!(
            "Payment {} of {} recorded for {} by {}",
            payment.id, payment.amount, payment.student_id, payment.recorder_id
        );
        Ok(payment)
    }

    /// Sum of every payment made by a student.
    pub fn total_paid(&self, student_id: &str) -> Vnd {
        sum_amounts(self.read().iter().filter(|p| p.student_id == student_id))
    }

    /// A student's payments in recording order.
    pub fn payments_for(&self, student_id: &str) -> Vec<Payment> {
        self.read()
            .iter()
            .filter(|p| p.student_id == student_id)
            .cloned()
            .collect()
    }

    /// Number of payments and their combined amount across all students.
    pub fn totals(&self) -> (usize, Vnd) {
        let payments = self.read();
        (payments.len(), sum_amounts(payments.iter()))
    }

    /// Distinct students with at least one payment, ascending.
    pub fn payers(&self) -> Vec<String> {
        let mut payers: Vec<String> = self.read().iter().map(|p| p.student_id.clone()).collect();
        payers.sort();
        payers.dedup();
        payers
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

/// Sums positive amounts whose combined total `record_payment` keeps within
/// range, so the addition never saturates.
fn sum_amounts<'a>(payments: impl Iterator<Item = &'a Payment>) -> Vnd {
    Vnd::new(
        payments
            .map(|p| p.amount.get())
            .fold(0i64, i64::saturating_add),
    )
}
