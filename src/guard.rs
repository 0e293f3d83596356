//! Role and state preconditions for every workflow operation
//!
//! Guards are pure: the same role, ownership and trip state always produce the
//! same answer and the same reason. Reasons are written for the end user.
use crate::config::AdvanceResubmission;
use crate::directory::{Driver, Vehicle};
use crate::error::WorkflowError;
use crate::payment::{PaymentLedger, PaymentRequest, PaymentType, RequestStatus, ReviewAction};
use crate::reconcile::PaymentSummary;
use crate::stage::{Stage, StageGraph};
use crate::trip::Trip;
use crate::types::{Actor, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentAction {
    Create(PaymentType),
    Decide(ReviewAction),
    MarkPaid,
}

#[derive(Debug, Clone)]
pub struct TransitionGuard {
    graph: StageGraph,
    advance_resubmission: AdvanceResubmission,
}

impl TransitionGuard {
    /// Fails when the stage graph is misconfigured.
    pub fn new(
        graph: StageGraph,
        advance_resubmission: AdvanceResubmission,
    ) -> Result<Self, WorkflowError> {
        graph.validate()?;
        Ok(Self {
            graph,
            advance_resubmission,
        })
    }

    pub fn graph(&self) -> &StageGraph {
        &self.graph
    }

    pub fn authorize_intake(&self, actor: &Actor) -> Result<(), WorkflowError> {
        match actor.role {
            Role::SalesConsigner | Role::OperationsConsigner | Role::Support => Ok(()),
            Role::Admin | Role::SuperAdmin => Ok(()),
            Role::OperationsVehicles | Role::SalesVehicles | Role::Accounts => Err(
                WorkflowError::denied(format!("{} users cannot raise trip requests", actor.role)),
            ),
        }
    }

    pub fn authorize_request_edit(&self, actor: &Actor, trip: &Trip) -> Result<(), WorkflowError> {
        if !actor.is_admin() && trip.requested_by_id != actor.id {
            return Err(WorkflowError::denied(
                "only the original requester or admin can edit this request",
            ));
        }
        if trip.current_stage != Stage::RequestReceived {
            return Err(WorkflowError::invalid_state(
                "request can only be edited before it is accepted",
            ));
        }
        Ok(())
    }

    pub fn authorize_stage_move(
        &self,
        actor: &Actor,
        trip: &Trip,
        to: Stage,
        ledger: &PaymentLedger,
        summary: &PaymentSummary,
    ) -> Result<(), WorkflowError> {
        let from = trip.current_stage;
        if trip.is_closed() {
            return Err(WorkflowError::invalid_state("trip is closed"));
        }
        if !self.graph.can_transition(from, to) {
            return Err(WorkflowError::invalid_state(format!(
                "cannot move trip from {from} to {to}"
            )));
        }

        match to {
            Stage::RequestReceived => Err(WorkflowError::invalid_state(
                "trips cannot return to request_received",
            )),
            Stage::Contacted => require_role(
                actor,
                &[Role::OperationsConsigner],
                "only consigner operations or admin can accept a trip request",
            ),
            Stage::Quoted => require_role(
                actor,
                &[Role::OperationsConsigner, Role::SalesConsigner],
                "only consigner operations, consigner sales or admin can quote a trip",
            ),
            Stage::Confirmed => require_role(
                actor,
                &[Role::OperationsConsigner],
                "only consigner operations or admin can confirm a trip",
            ),
            Stage::VehicleAssigned | Stage::AtLoading | Stage::InTransit | Stage::Delivered => {
                require_vehicles_owner(actor, trip)
            }
            Stage::LoadedDocsOk => {
                require_vehicles_owner(actor, trip)?;
                if trip.documents.is_empty() {
                    return Err(WorkflowError::invalid_state(
                        "attach the loading documents first",
                    ));
                }
                Ok(())
            }
            Stage::AdvancePaid => {
                require_vehicles_owner(actor, trip)?;
                if !summary.advance_settled() {
                    return Err(WorkflowError::invalid_state("advance must be paid first"));
                }
                Ok(())
            }
            Stage::Closed => {
                require_role(
                    actor,
                    &[Role::Accounts],
                    "only accounts or admin can close a trip",
                )?;
                if ledger.has_open() {
                    return Err(WorkflowError::invalid_state(
                        "settle or reject open payment requests before closing",
                    ));
                }
                if summary.paid_balance_total == 0 {
                    return Err(WorkflowError::invalid_state(
                        "final payment must be paid before closing",
                    ));
                }
                Ok(())
            }
        }
    }

    /// The user named to source the vehicle when a trip is confirmed.
    pub fn authorize_vehicles_owner_candidate(
        &self,
        candidate: &Actor,
    ) -> Result<(), WorkflowError> {
        match candidate.role {
            Role::OperationsVehicles | Role::Admin | Role::SuperAdmin => Ok(()),
            _ => Err(WorkflowError::validation(format!(
                "{} is not a vehicle operations user",
                candidate.name
            ))),
        }
    }

    /// Vendor vehicles must be driven by one of the same vendor's active drivers.
    pub fn authorize_vehicle_assignment(
        &self,
        vehicle: &Vehicle,
        driver_id: Option<&str>,
        vendor_drivers: &[Driver],
    ) -> Result<(), WorkflowError> {
        let Some(vendor_id) = vehicle.vendor_id() else {
            return Ok(());
        };
        let Some(driver_id) = driver_id else {
            return Err(WorkflowError::validation(format!(
                "a driver from vendor {vendor_id} is required for vehicle {}",
                vehicle.registration
            )));
        };
        if !vendor_drivers.iter().any(|d| d.id == driver_id) {
            return Err(WorkflowError::validation(
                "driver must belong to same vendor",
            ));
        }
        Ok(())
    }

    pub fn authorize_document_upload(&self, actor: &Actor, trip: &Trip) -> Result<(), WorkflowError> {
        if trip.is_closed() {
            return Err(WorkflowError::invalid_state("trip is closed"));
        }
        require_vehicles_owner(actor, trip)
    }

    pub fn authorize_payment_action(
        &self,
        actor: &Actor,
        trip: &Trip,
        ledger: &PaymentLedger,
        summary: &PaymentSummary,
        request: Option<&PaymentRequest>,
        action: PaymentAction,
    ) -> Result<(), WorkflowError> {
        match action {
            PaymentAction::Create(kind) => self.authorize_create(actor, trip, ledger, summary, kind),
            PaymentAction::Decide(review) => require_role(
                actor,
                &[Role::Accounts],
                &format!("only accounts or admin can {review} payment requests"),
            ),
            PaymentAction::MarkPaid => {
                require_role(
                    actor,
                    &[Role::Accounts],
                    "only accounts or admin can mark payment requests paid",
                )?;
                match request.map(|r| r.status) {
                    Some(RequestStatus::Approved) => Ok(()),
                    Some(status) => Err(WorkflowError::invalid_state(format!(
                        "only approved requests can be paid, this one is {status}"
                    ))),
                    None => Err(WorkflowError::not_found("payment request")),
                }
            }
        }
    }

    fn authorize_create(
        &self,
        actor: &Actor,
        trip: &Trip,
        ledger: &PaymentLedger,
        summary: &PaymentSummary,
        kind: PaymentType,
    ) -> Result<(), WorkflowError> {
        if trip.is_closed() {
            return Err(WorkflowError::invalid_state("trip is closed"));
        }
        if !actor.is_admin()
            && !(actor.role == Role::OperationsVehicles && trip.is_vehicles_owner(&actor.id))
        {
            return Err(WorkflowError::denied(
                "only the trip's vehicle operations owner or admin can raise payment requests",
            ));
        }

        let stage = trip.current_stage;
        match kind {
            PaymentType::Advance => {
                if !stage.in_execution_window() {
                    return Err(WorkflowError::invalid_state(format!(
                        "advance can only be requested between vehicle_assigned and in_transit, trip is {stage}"
                    )));
                }
                let blocking = ledger.of_kind(PaymentType::Advance).find(|r| {
                    match self.advance_resubmission {
                        AdvanceResubmission::Never => true,
                        AdvanceResubmission::AfterRejection => r.status != RequestStatus::Rejected,
                    }
                });
                if let Some(existing) = blocking {
                    return Err(WorkflowError::conflict(format!(
                        "an advance request already exists for this trip ({})",
                        existing.status
                    )));
                }
                Ok(())
            }
            PaymentType::Balance => {
                if !(Stage::VehicleAssigned..=Stage::Delivered).contains(&stage) {
                    return Err(WorkflowError::invalid_state(format!(
                        "final payment cannot be requested while trip is {stage}"
                    )));
                }
                if summary.is_trip_completed {
                    return Err(WorkflowError::invalid_state("trip is already completed"));
                }
                if !summary.advance_settled() {
                    return Err(WorkflowError::invalid_state("advance must be paid first"));
                }
                // paid balances count too, or a settled trip could be paid again
                if summary.suggested_final_amount == 0 || summary.outstanding() == 0 {
                    return Err(WorkflowError::invalid_state(
                        "nothing is left to pay on this trip",
                    ));
                }
                if let Some(open) = ledger.open_of_kind(PaymentType::Balance) {
                    return Err(WorkflowError::conflict(format!(
                        "a final payment request is already {}",
                        open.status
                    )));
                }
                Ok(())
            }
            PaymentType::Other => {
                if !(Stage::VehicleAssigned..=Stage::Delivered).contains(&stage) {
                    return Err(WorkflowError::invalid_state(format!(
                        "payments cannot be requested while trip is {stage}"
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Admins always pass; everyone else needs one of `roles`.
fn require_role(actor: &Actor, roles: &[Role], reason: &str) -> Result<(), WorkflowError> {
    if actor.is_admin() || roles.contains(&actor.role) {
        Ok(())
    } else {
        Err(WorkflowError::denied(reason))
    }
}

fn require_vehicles_owner(actor: &Actor, trip: &Trip) -> Result<(), WorkflowError> {
    if actor.is_admin() {
        return Ok(());
    }
    if actor.role == Role::OperationsVehicles && trip.is_vehicles_owner(&actor.id) {
        return Ok(());
    }
    Err(WorkflowError::denied(
        "only the trip's vehicle operations owner or admin can do this",
    ))
}
