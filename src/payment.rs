//! Payment requests raised against a trip and their approval state machine
//!
//! ```text
//! pending  -> approved | rejected | on_hold
//! on_hold  -> approved | rejected
//! approved -> paid
//! ```
//! `rejected` and `paid` are terminal.
use crate::error::WorkflowError;
use crate::types::{ActorId, DocumentRef, Money, TimeStamp};
use chrono::Utc;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
pub enum PaymentType {
    #[n(0)]
    Advance,
    #[n(1)]
    Balance,
    #[n(2)]
    Other,
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PaymentType::Advance => "advance",
            PaymentType::Balance => "balance",
            PaymentType::Other => "other",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
pub enum RequestStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    OnHold,
    #[n(3)]
    Rejected,
    #[n(4)]
    Paid,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Rejected | RequestStatus::Paid)
    }

    pub fn is_open(self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::OnHold => "on_hold",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Paid => "paid",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReviewAction {
    Approve,
    Reject,
    Hold,
}

impl ReviewAction {
    fn target(self) -> RequestStatus {
        match self {
            ReviewAction::Approve => RequestStatus::Approved,
            ReviewAction::Reject => RequestStatus::Rejected,
            ReviewAction::Hold => RequestStatus::OnHold,
        }
    }
}

impl fmt::Display for ReviewAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReviewAction::Approve => "approve",
            ReviewAction::Reject => "reject",
            ReviewAction::Hold => "hold",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct BankDetails {
    #[n(0)]
    pub account_holder: String,
    #[n(1)]
    pub account_number: String,
    #[n(2)]
    pub ifsc: String,
    #[n(3)]
    pub bank_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum PaymentMethod {
    #[n(0)]
    Bank(#[n(0)] BankDetails),
    #[n(1)]
    Upi {
        #[n(0)]
        upi_id: Option<String>,
        #[n(1)]
        qr_code: Option<DocumentRef>,
    },
}

impl PaymentMethod {
    pub fn validate(&self) -> Result<(), WorkflowError> {
        match self {
            PaymentMethod::Bank(bank) => {
                let required = [
                    ("account holder", &bank.account_holder),
                    ("account number", &bank.account_number),
                    ("IFSC", &bank.ifsc),
                    ("bank name", &bank.bank_name),
                ];
                for (field, value) in required {
                    if value.trim().is_empty() {
                        return Err(WorkflowError::validation(format!(
                            "{field} is required for bank payments"
                        )));
                    }
                }
                let ifsc = bank.ifsc.trim();
                if ifsc.len() != 11 || !ifsc.chars().all(|c| c.is_ascii_alphanumeric()) {
                    return Err(WorkflowError::validation(
                        "IFSC must be 11 letters or digits",
                    ));
                }
                Ok(())
            }
            PaymentMethod::Upi { upi_id, qr_code } => {
                let has_id = upi_id.as_deref().is_some_and(|id| !id.trim().is_empty());
                if let Some(qr) = qr_code {
                    qr.validate()?;
                }
                if !has_id && qr_code.is_none() {
                    return Err(WorkflowError::validation(
                        "UPI payments need a UPI id or a QR code",
                    ));
                }
                Ok(())
            }
        }
    }
}

/// What a vehicle-ops actor submits to raise a payment request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentDraft {
    pub kind: PaymentType,
    pub amount: Money,
    pub method: PaymentMethod,
    pub notes: Option<String>,
}

impl PaymentDraft {
    pub fn new(kind: PaymentType, amount: Money, method: PaymentMethod) -> Self {
        Self {
            kind,
            amount,
            method,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_string());
        self
    }

    pub fn validate(&self, ceiling: Money) -> Result<(), WorkflowError> {
        if self.amount == 0 {
            return Err(WorkflowError::validation("amount must be positive"));
        }
        if self.amount > ceiling {
            return Err(WorkflowError::validation(format!(
                "amount exceeds the limit of {ceiling}"
            )));
        }
        self.method.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct PaymentRequest {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub trip_id: String,
    #[n(2)]
    pub kind: PaymentType,
    #[n(3)]
    pub amount: Money,
    #[n(4)]
    pub method: PaymentMethod,
    #[n(5)]
    pub status: RequestStatus,
    #[n(6)]
    pub requested_by_id: ActorId,
    #[n(7)]
    pub requested_at: TimeStamp<Utc>,
    #[n(8)]
    pub reviewed_by_id: Option<ActorId>,
    #[n(9)]
    pub reviewed_at: Option<TimeStamp<Utc>>,
    #[n(10)]
    pub review_reason: Option<String>,
    #[n(11)]
    pub paid_amount: Option<Money>, // only set once paid
    #[n(12)]
    pub paid_by_id: Option<ActorId>,
    #[n(13)]
    pub paid_at: Option<TimeStamp<Utc>>,
    #[n(14)]
    pub proof: Option<DocumentRef>,
    #[n(15)]
    pub notes: Option<String>,
}

/// All payment requests of one trip, in creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct PaymentLedger {
    #[n(0)]
    requests: Vec<PaymentRequest>,
}

impl PaymentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> &[PaymentRequest] {
        &self.requests
    }

    pub fn get(&self, request_id: &str) -> Option<&PaymentRequest> {
        self.requests.iter().find(|r| r.id == request_id)
    }

    pub fn of_kind(&self, kind: PaymentType) -> impl Iterator<Item = &PaymentRequest> {
        self.requests.iter().filter(move |r| r.kind == kind)
    }

    pub fn open_of_kind(&self, kind: PaymentType) -> Option<&PaymentRequest> {
        self.of_kind(kind).find(|r| r.status.is_open())
    }

    pub fn has_open(&self) -> bool {
        self.requests.iter().any(|r| r.status.is_open())
    }

    pub fn create(
        &mut self,
        id: String,
        trip_id: &str,
        draft: PaymentDraft,
        requested_by: &ActorId,
        ceiling: Money,
        now: TimeStamp<Utc>,
    ) -> Result<&PaymentRequest, WorkflowError> {
        draft.validate(ceiling)?;
        if let Some(open) = self.open_of_kind(draft.kind) {
            return Err(WorkflowError::conflict(format!(
                "an open {} request ({}) already exists for this trip",
                draft.kind, open.status
            )));
        }

        self.requests.push(PaymentRequest {
            id,
            trip_id: trip_id.to_string(),
            kind: draft.kind,
            amount: draft.amount,
            method: draft.method,
            status: RequestStatus::Pending,
            requested_by_id: requested_by.clone(),
            requested_at: now,
            reviewed_by_id: None,
            reviewed_at: None,
            review_reason: None,
            paid_amount: None,
            paid_by_id: None,
            paid_at: None,
            proof: None,
            notes: draft.notes,
        });
        Ok(&self.requests[self.requests.len() - 1])
    }

    pub fn decide(
        &mut self,
        request_id: &str,
        action: ReviewAction,
        reviewer: &ActorId,
        reason: Option<&str>,
        now: TimeStamp<Utc>,
    ) -> Result<&PaymentRequest, WorkflowError> {
        let request = self.get_mut(request_id)?;
        if !matches!(request.status, RequestStatus::Pending | RequestStatus::OnHold) {
            return Err(WorkflowError::invalid_state(format!(
                "cannot {action} a request that is {}",
                request.status
            )));
        }
        if action == ReviewAction::Hold && request.status == RequestStatus::OnHold {
            return Err(WorkflowError::invalid_state("request is already on hold"));
        }
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        if action == ReviewAction::Reject && reason.is_none() {
            return Err(WorkflowError::validation(
                "a reason is required to reject a payment request",
            ));
        }

        request.status = action.target();
        request.reviewed_by_id = Some(reviewer.clone());
        request.reviewed_at = Some(now);
        request.review_reason = reason.map(str::to_string);
        Ok(request)
    }

    /// Settles an approved request. `paid_amount` defaults to the full amount.
    pub fn mark_paid(
        &mut self,
        request_id: &str,
        proof: DocumentRef,
        paid_amount: Option<Money>,
        payer: &ActorId,
        now: TimeStamp<Utc>,
    ) -> Result<&PaymentRequest, WorkflowError> {
        proof.validate()?;
        let request = self.get_mut(request_id)?;
        if request.status != RequestStatus::Approved {
            return Err(WorkflowError::invalid_state(format!(
                "only approved requests can be paid, this one is {}",
                request.status
            )));
        }
        let paid = paid_amount.unwrap_or(request.amount);
        if paid == 0 || paid > request.amount {
            return Err(WorkflowError::validation(format!(
                "paid amount must be between 1 and {}",
                request.amount
            )));
        }

        request.status = RequestStatus::Paid;
        request.paid_amount = Some(paid);
        request.paid_by_id = Some(payer.clone());
        request.paid_at = Some(now);
        request.proof = Some(proof);
        Ok(request)
    }

    fn get_mut(&mut self, request_id: &str) -> Result<&mut PaymentRequest, WorkflowError> {
        self.requests
            .iter_mut()
            .find(|r| r.id == request_id)
            .ok_or_else(|| WorkflowError::not_found(format!("payment request {request_id}")))
    }
}
