//! Derived payment view of a trip. Never persisted.
use crate::payment::{PaymentRequest, PaymentType, RequestStatus};
use crate::trip::Trip;
use crate::types::Money;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaymentSummary {
    pub trip_amount: Option<Money>,
    pub paid_advance_total: Money,
    pub paid_balance_total: Money,
    pub suggested_final_amount: Money,
    pub is_trip_completed: bool,
}

impl PaymentSummary {
    /// Final requests are sequenced after the advance.
    pub fn advance_settled(&self) -> bool {
        self.paid_advance_total > 0
    }

    /// What is still owed on the trip once every paid advance and balance is
    /// taken off. Caps new advance and balance requests.
    pub fn outstanding(&self) -> Money {
        self.trip_amount
            .unwrap_or(0)
            .saturating_sub(self.paid_advance_total)
            .saturating_sub(self.paid_balance_total)
    }
}

/// Only `paid` requests count, at their recorded paid amount.
pub fn summarize(trip: &Trip, requests: &[PaymentRequest]) -> PaymentSummary {
    let paid_total = |kind: PaymentType| -> Money {
        requests
            .iter()
            .filter(|r| r.kind == kind && r.status == RequestStatus::Paid)
            .map(|r| r.paid_amount.unwrap_or(r.amount))
            .fold(0, Money::saturating_add)
    };

    let paid_advance_total = paid_total(PaymentType::Advance);
    let paid_balance_total = paid_total(PaymentType::Balance);
    let suggested_final_amount = trip
        .trip_amount
        .unwrap_or(0)
        .saturating_sub(paid_advance_total);

    PaymentSummary {
        trip_amount: trip.trip_amount,
        paid_advance_total,
        paid_balance_total,
        suggested_final_amount,
        is_trip_completed: paid_balance_total > 0 && trip.current_stage.is_terminal(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::{BankDetails, PaymentMethod};
    use crate::stage::Stage;
    use crate::trip::TripRequest;
    use crate::types::{ActorId, TimeStamp};

    fn trip(amount: Option<Money>) -> Trip {
        let mut trip = Trip::new(
            "trip_1".into(),
            "TRP-20260101-AAAAAA".into(),
            TripRequest::new(),
            ActorId::from("u-sales"),
            TimeStamp::new(),
        );
        trip.trip_amount = amount;
        trip
    }

    fn request(kind: PaymentType, amount: Money, status: RequestStatus) -> PaymentRequest {
        PaymentRequest {
            id: format!("payreq_{kind}_{amount}"),
            trip_id: "trip_1".into(),
            kind,
            amount,
            method: PaymentMethod::Bank(BankDetails {
                account_holder: "A".into(),
                account_number: "1".into(),
                ifsc: "SBIN0000001".into(),
                bank_name: "SBI".into(),
            }),
            status,
            requested_by_id: ActorId::from("u-vops"),
            requested_at: TimeStamp::new(),
            reviewed_by_id: None,
            reviewed_at: None,
            review_reason: None,
            paid_amount: (status == RequestStatus::Paid).then_some(amount),
            paid_by_id: None,
            paid_at: None,
            proof: None,
            notes: None,
        }
    }

    #[test]
    fn empty_ledger_suggests_full_amount() {
        let summary = summarize(&trip(Some(50_000)), &[]);
        assert_eq!(summary.suggested_final_amount, 50_000);
        assert!(!summary.advance_settled());
        assert!(!summary.is_trip_completed);
    }

    #[test]
    fn only_paid_requests_count() {
        let requests = [
            request(PaymentType::Advance, 10_000, RequestStatus::Paid),
            request(PaymentType::Advance, 7_000, RequestStatus::Rejected),
            request(PaymentType::Balance, 3_000, RequestStatus::Approved),
            request(PaymentType::Other, 900, RequestStatus::Paid),
        ];
        let summary = summarize(&trip(Some(50_000)), &requests);
        assert_eq!(summary.paid_advance_total, 10_000);
        assert_eq!(summary.paid_balance_total, 0);
        assert_eq!(summary.suggested_final_amount, 40_000);
    }

    #[test]
    fn suggestion_floors_at_zero() {
        let requests = [request(PaymentType::Advance, 60_000, RequestStatus::Paid)];
        let summary = summarize(&trip(Some(50_000)), &requests);
        assert_eq!(summary.suggested_final_amount, 0);
    }

    #[test]
    fn missing_trip_amount_suggests_nothing() {
        let summary = summarize(&trip(None), &[]);
        assert_eq!(summary.trip_amount, None);
        assert_eq!(summary.suggested_final_amount, 0);
    }

    #[test]
    fn completion_needs_balance_and_closed_stage() {
        let requests = [
            request(PaymentType::Advance, 10_000, RequestStatus::Paid),
            request(PaymentType::Balance, 40_000, RequestStatus::Paid),
        ];
        let mut t = trip(Some(50_000));
        t.current_stage = Stage::Delivered;
        assert!(!summarize(&t, &requests).is_trip_completed);
        t.current_stage = Stage::Closed;
        assert!(summarize(&t, &requests).is_trip_completed);
    }

    #[test]
    fn outstanding_takes_off_paid_balances_too() {
        let requests = [
            request(PaymentType::Advance, 10_000, RequestStatus::Paid),
            request(PaymentType::Balance, 15_000, RequestStatus::Paid),
            request(PaymentType::Balance, 25_000, RequestStatus::Approved),
        ];
        let summary = summarize(&trip(Some(50_000)), &requests);
        assert_eq!(summary.suggested_final_amount, 40_000);
        assert_eq!(summary.outstanding(), 25_000);

        let overpaid = [request(PaymentType::Advance, 60_000, RequestStatus::Paid)];
        assert_eq!(summarize(&trip(Some(50_000)), &overpaid).outstanding(), 0);
    }
}
