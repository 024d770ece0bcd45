//! Activity log rows: complaints, resolutions and payments as read from CSV.

use crate::complaint::{ComplaintId, Outcome};
use crate::error::{LedgerError, Result};
use crate::ledger::ViolationId;
use crate::money::Vnd;
use serde::Deserialize;
use std::str::FromStr;

/// Raw activity record as read from CSV.
///
/// Columns not used by a given activity type are left empty.
#[derive(Debug, Deserialize)]
pub struct ActivityRecord {
    /// Activity type: complaint, approve, deny, payment
    #[serde(rename = "type")]
    pub kind: String,

    /// Violation disputed by a complaint
    #[serde(default)]
    pub violation: Option<ViolationId>,

    /// Complaint being resolved
    #[serde(default)]
    pub complaint: Option<ComplaintId>,

    /// Paying student
    #[serde(default)]
    pub student: Option<String>,

    /// Payment amount, thousands separators allowed
    #[serde(default)]
    pub amount: Option<String>,

    /// Resolver or recorder identity
    #[serde(default)]
    pub actor: Option<String>,

    /// Complainant email
    #[serde(default)]
    pub email: Option<String>,

    /// Complaint message or payment memo
    #[serde(default)]
    pub note: Option<String>,
}

impl ActivityRecord {
    /// Parses the raw record into a typed activity.
    pub fn parse(&self) -> Result<Activity> {
        let kind = self.kind.trim().to_lowercase();

        match kind.as_str() {
            "complaint" => Ok(Activity::FileComplaint {
                violation: self.violation.ok_or_else(|| missing("violation"))?,
                email: required(&self.email, "email")?,
                message: required(&self.note, "note")?,
            }),
            "approve" | "deny" => Ok(Activity::Resolve {
                complaint: self.complaint.ok_or_else(|| missing("complaint"))?,
                outcome: if kind == "approve" {
                    Outcome::Approve
                } else {
                    Outcome::Deny
                },
                resolver: required(&self.actor, "actor")?,
            }),
            "payment" => Ok(Activity::Payment {
                student: required(&self.student, "student")?,
                amount: self.parse_amount()?,
                recorder: required(&self.actor, "actor")?,
                memo: optional(&self.note),
            }),
            other => Err(LedgerError::InvalidInput(format!(
                "unknown activity type {:?}",
                other
            ))),
        }
    }

    fn parse_amount(&self) -> Result<Vnd> {
        let raw = required(&self.amount, "amount")?;
        Vnd::from_str(&raw)
            .map_err(|e| LedgerError::InvalidInput(format!("amount {:?}: {}", raw, e)))
    }
}

fn missing(column: &str) -> LedgerError {
    LedgerError::InvalidInput(format!("missing {}", column))
}

fn optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn required(value: &Option<String>, column: &str) -> Result<String> {
    optional(value).ok_or_else(|| missing(column))
}

/// A parsed and validated activity ready for processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activity {
    /// Dispute a violation.
    FileComplaint {
        violation: ViolationId,
        email: String,
        message: String,
    },

    /// Approve or deny a pending complaint.
    Resolve {
        complaint: ComplaintId,
        outcome: Outcome,
        resolver: String,
    },

    /// Money received from a student.
    Payment {
        student: String,
        amount: Vnd,
        recorder: String,
        memo: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: &str) -> ActivityRecord {
        ActivityRecord {
            kind: kind.to_string(),
            violation: None,
            complaint: None,
            student: None,
            amount: None,
            actor: None,
            email: None,
            note: None,
        }
    }

    #[test]
    fn test_parse_complaint() {
        let record = ActivityRecord {
            violation: Some(4),
            email: Some("an@example.com".to_string()),
            note: Some(" I was sick ".to_string()),
            ..record("complaint")
        };

        assert_eq!(
            record.parse().unwrap(),
            Activity::FileComplaint {
                violation: 4,
                email: "an@example.com".to_string(),
                message: "I was sick".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_resolutions() {
        let approve = ActivityRecord {
            complaint: Some(2),
            actor: Some("admin".to_string()),
            ..record("  Approve ")
        };
        assert!(matches!(
            approve.parse().unwrap(),
            Activity::Resolve { complaint: 2, outcome: Outcome::Approve, .. }
        ));

        let deny = ActivityRecord {
            complaint: Some(3),
            actor: Some("admin".to_string()),
            ..record("deny")
        };
        assert!(matches!(
            deny.parse().unwrap(),
            Activity::Resolve { outcome: Outcome::Deny, .. }
        ));
    }

    #[test]
    fn test_parse_payment() {
        let record = ActivityRecord {
            student: Some("An".to_string()),
            amount: Some("20.000".to_string()),
            actor: Some("treasurer".to_string()),
            ..record("payment")
        };

        match record.parse().unwrap() {
            Activity::Payment { amount, memo, .. } => {
                assert_eq!(amount, Vnd::new(20_000));
                assert_eq!(memo, None);
            }
            other => panic!("Expected Payment, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        assert!(record("complaint").parse().is_err());
        assert!(record("approve").parse().is_err());

        let no_amount = ActivityRecord {
            student: Some("An".to_string()),
            actor: Some("treasurer".to_string()),
            ..record("payment")
        };
        assert!(no_amount.parse().is_err());
    }

    #[test]
    fn test_parse_rejects_decimal_amounts() {
        for raw in ["12.5", "1.2.3", "10,000.50"] {
            let record = ActivityRecord {
                student: Some("An".to_string()),
                amount: Some(raw.to_string()),
                actor: Some("treasurer".to_string()),
                ..record("payment")
            };
            assert!(
                matches!(record.parse(), Err(LedgerError::InvalidInput(_))),
                "{} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        assert!(matches!(
            record("refund").parse(),
            Err(LedgerError::InvalidInput(_))
        ));
    }
}
