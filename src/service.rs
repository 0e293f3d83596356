//! Service layer API for trip workflow operations
//!
//! Every mutation runs its guard and its write inside one store transaction,
//! then emits a timeline entry once the change is committed. Actors are always
//! passed in explicitly.
use crate::config::WorkflowConfig;
use crate::directory::{Ownership, RoleDirectory, VehicleDirectory};
use crate::error::{ErrorKind, WorkflowError};
use crate::guard::{PaymentAction, TransitionGuard};
use crate::payment::{PaymentDraft, PaymentRequest, PaymentType, ReviewAction};
use crate::reconcile::{PaymentSummary, summarize};
use crate::stage::{Stage, StageGraph};
use crate::store::{TripRecord, TripStore};
use crate::timeline::{SledTimeline, TimelineEntry, TimelineSink};
use crate::trip::{Trip, TripDocument, TripRequest};
use crate::types::{Actor, ActorId, DocumentRef, Money, Role, TimeStamp};
use crate::utils;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

/// A trip as callers see it after any operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripView {
    pub trip: Trip,
    pub requests: Vec<PaymentRequest>,
    pub summary: PaymentSummary,
    pub version: u64,
}

impl From<TripRecord> for TripView {
    fn from(record: TripRecord) -> Self {
        let summary = summarize(&record.trip, record.ledger.requests());
        Self {
            requests: record.ledger.requests().to_vec(),
            trip: record.trip,
            summary,
            version: record.version,
        }
    }
}

impl TripView {
    pub fn request(&self, request_id: &str) -> Option<&PaymentRequest> {
        self.requests.iter().find(|r| r.id == request_id)
    }
}

pub struct WorkflowService {
    store: TripStore,
    guard: TransitionGuard,
    config: WorkflowConfig,
    roles: Arc<dyn RoleDirectory>,
    vehicles: Arc<dyn VehicleDirectory>,
    timeline: Arc<dyn TimelineSink>,
}

impl WorkflowService {
    pub fn new(
        instance: Arc<sled::Db>,
        config: WorkflowConfig,
        roles: Arc<dyn RoleDirectory>,
        vehicles: Arc<dyn VehicleDirectory>,
        timeline: Arc<dyn TimelineSink>,
    ) -> Result<Self, WorkflowError> {
        Self::with_graph(
            instance,
            config,
            StageGraph::standard(),
            roles,
            vehicles,
            timeline,
        )
    }

    /// Like [`WorkflowService::new`] with a custom stage graph, validated here.
    pub fn with_graph(
        instance: Arc<sled::Db>,
        config: WorkflowConfig,
        graph: StageGraph,
        roles: Arc<dyn RoleDirectory>,
        vehicles: Arc<dyn VehicleDirectory>,
        timeline: Arc<dyn TimelineSink>,
    ) -> Result<Self, WorkflowError> {
        config.validate()?;
        let guard = TransitionGuard::new(graph, config.advance_resubmission)?;
        Ok(Self {
            store: TripStore::new(instance),
            guard,
            config,
            roles,
            vehicles,
            timeline,
        })
    }

    /// Opens the database at `config.db_path` and keeps the timeline in it.
    pub fn open(
        config: WorkflowConfig,
        roles: Arc<dyn RoleDirectory>,
        vehicles: Arc<dyn VehicleDirectory>,
    ) -> Result<Self, WorkflowError> {
        let db = sled::open(&config.db_path)?;
        let timeline = Arc::new(SledTimeline::open(&db)?);
        info!(path = %config.db_path.display(), "opened trip workflow store");
        Self::new(Arc::new(db), config, roles, vehicles, timeline)
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    // Read side

    pub fn trip(&self, trip_id: &str) -> Result<TripView, WorkflowError> {
        self.store.load(trip_id).map(TripView::from)
    }

    pub fn summary(&self, trip_id: &str) -> Result<PaymentSummary, WorkflowError> {
        Ok(self.trip(trip_id)?.summary)
    }

    pub fn list_trips(&self) -> Result<Vec<TripView>, WorkflowError> {
        Ok(self
            .store
            .list()?
            .into_iter()
            .map(TripView::from)
            .collect())
    }

    pub fn payment_request(&self, request_id: &str) -> Result<PaymentRequest, WorkflowError> {
        let trip_id = self.store.trip_for_request(request_id)?;
        self.store
            .load(&trip_id)?
            .ledger
            .get(request_id)
            .cloned()
            .ok_or_else(|| WorkflowError::not_found(format!("payment request {request_id}")))
    }

    // Intake

    /// Raises a new trip request at `request_received`.
    pub fn create_trip(&self, actor: &Actor, request: TripRequest) -> Result<TripView, WorkflowError> {
        let created = self.create_trip_record(actor, request);
        match created {
            Ok(record) => {
                let details = format!(
                    "trip request {} raised: {} to {}",
                    record.trip.code, record.trip.request.origin, record.trip.request.destination
                );
                self.committed("create_trip", actor, &record, &details);
                self.emit(&record.trip.id, actor, record.trip.created_at.clone(), details);
                Ok(record.into())
            }
            Err(err) => Err(self.rejected("create_trip", "-", actor, err)),
        }
    }

    fn create_trip_record(
        &self,
        actor: &Actor,
        request: TripRequest,
    ) -> Result<TripRecord, WorkflowError> {
        self.guard.authorize_intake(actor)?;
        request.validate()?;

        let now = TimeStamp::new();
        let mut trip = Trip::new(
            utils::new_uuid_to_bech32("trip_")?,
            utils::trip_code(&now),
            request,
            actor.id.clone(),
            now,
        );
        if actor.role == Role::SalesConsigner {
            trip.sales_owner_id = Some(actor.id.clone());
        }
        let record = TripRecord::new(trip);
        self.store.insert(&record)?;
        Ok(record)
    }

    pub fn update_request(
        &self,
        actor: &Actor,
        trip_id: &str,
        request: TripRequest,
    ) -> Result<TripView, WorkflowError> {
        let now = TimeStamp::new();
        self.commit("update_request", actor, trip_id, now.clone(), |record| {
            self.guard.authorize_request_edit(actor, &record.trip)?;
            request.validate()?;
            record.trip.request = request.clone();
            record.trip.updated_at = now.clone();
            Ok(("request details updated".to_string(), ()))
        })
        .map(|(view, ())| view)
    }

    // Stage moves

    pub fn accept_request(&self, actor: &Actor, trip_id: &str) -> Result<TripView, WorkflowError> {
        self.move_stage(actor, trip_id, Stage::Contacted)
    }

    /// Moves along the canonical chain by one step.
    pub fn advance(&self, actor: &Actor, trip_id: &str) -> Result<TripView, WorkflowError> {
        let current = self.store.load(trip_id)?.trip.current_stage;
        let next = self
            .guard
            .graph()
            .next_stage(current)
            .ok_or_else(|| WorkflowError::invalid_state("trip is closed"))?;
        self.move_stage(actor, trip_id, next)
    }

    /// Moves to a stage that needs no payload.
    pub fn move_stage(
        &self,
        actor: &Actor,
        trip_id: &str,
        to: Stage,
    ) -> Result<TripView, WorkflowError> {
        let operation = match to {
            Stage::Quoted => Some("submit_quote"),
            Stage::Confirmed => Some("confirm"),
            Stage::VehicleAssigned => Some("assign_vehicle"),
            _ => None,
        };
        if let Some(operation) = operation {
            let err = WorkflowError::validation(format!("moving to {to} requires {operation}"));
            return Err(self.rejected("move_stage", trip_id, actor, err));
        }

        let now = TimeStamp::new();
        self.commit("move_stage", actor, trip_id, now.clone(), |record| {
            let from = self.authorize_move(actor, record, to)?;
            match to {
                // whoever passed the guard takes ownership, admins included
                Stage::Contacted => {
                    record.trip.ops_owner_id.get_or_insert_with(|| actor.id.clone());
                }
                Stage::Closed => {
                    record.trip.accounts_owner_id.get_or_insert_with(|| actor.id.clone());
                }
                _ => {}
            }
            record.trip.move_to(to, now.clone());
            Ok((format!("stage moved from {from} to {to}"), ()))
        })
        .map(|(view, ())| view)
    }

    /// Records the quote. Negotiation happens while the trip sits in `quoted`.
    pub fn submit_quote(
        &self,
        actor: &Actor,
        trip_id: &str,
        quoted_amount: Money,
    ) -> Result<TripView, WorkflowError> {
        let now = TimeStamp::new();
        self.commit("submit_quote", actor, trip_id, now.clone(), |record| {
            let from = self.authorize_move(actor, record, Stage::Quoted)?;
            self.check_amount("quoted amount", quoted_amount)?;
            if actor.role == Role::SalesConsigner {
                record.trip.sales_owner_id.get_or_insert_with(|| actor.id.clone());
            }
            record.trip.quoted_amount = Some(quoted_amount);
            record.trip.move_to(Stage::Quoted, now.clone());
            Ok((
                format!("stage moved from {from} to quoted at {quoted_amount}"),
                (),
            ))
        })
        .map(|(view, ())| view)
    }

    /// Confirms the trip amount and names who will source the vehicle.
    pub fn confirm(
        &self,
        actor: &Actor,
        trip_id: &str,
        trip_amount: Money,
        ops_vehicles_owner_id: &ActorId,
    ) -> Result<TripView, WorkflowError> {
        let now = TimeStamp::new();
        self.commit("confirm", actor, trip_id, now.clone(), |record| {
            let from = self.authorize_move(actor, record, Stage::Confirmed)?;
            self.check_amount("trip amount", trip_amount)?;
            let owner = self
                .roles
                .lookup(ops_vehicles_owner_id)
                .ok_or_else(|| WorkflowError::not_found(format!("user {ops_vehicles_owner_id}")))?;
            self.guard.authorize_vehicles_owner_candidate(&owner)?;

            record.trip.ops_owner_id.get_or_insert_with(|| actor.id.clone());
            record.trip.trip_amount = Some(trip_amount);
            record.trip.ops_vehicles_owner_id = Some(owner.id.clone());
            record.trip.move_to(Stage::Confirmed, now.clone());
            Ok((
                format!(
                    "stage moved from {from} to confirmed at {trip_amount}, vehicle requested from {}",
                    owner.name
                ),
                (),
            ))
        })
        .map(|(view, ())| view)
    }

    pub fn assign_vehicle(
        &self,
        actor: &Actor,
        trip_id: &str,
        vehicle_id: &str,
        driver_id: Option<&str>,
    ) -> Result<TripView, WorkflowError> {
        let now = TimeStamp::new();
        self.commit("assign_vehicle", actor, trip_id, now.clone(), |record| {
            let from = self.authorize_move(actor, record, Stage::VehicleAssigned)?;
            let vehicle = self
                .vehicles
                .vehicle(vehicle_id)
                .ok_or_else(|| WorkflowError::not_found(format!("vehicle {vehicle_id}")))?;
            if let Some(driver_id) = driver_id {
                let driver = self
                    .vehicles
                    .driver(driver_id)
                    .ok_or_else(|| WorkflowError::not_found(format!("driver {driver_id}")))?;
                if !driver.active {
                    return Err(WorkflowError::validation(format!(
                        "driver {} is not active",
                        driver.name
                    )));
                }
            }
            let candidates = vehicle
                .vendor_id()
                .map(|vendor| self.vehicles.drivers_for_vendor(vendor))
                .unwrap_or_default();
            self.guard
                .authorize_vehicle_assignment(&vehicle, driver_id, &candidates)?;

            record.trip.vehicle_id = Some(vehicle.id.clone());
            record.trip.driver_id = driver_id.map(str::to_string);
            record.trip.leased = vehicle.ownership == Ownership::Leased;
            record.trip.move_to(Stage::VehicleAssigned, now.clone());
            Ok((
                format!(
                    "stage moved from {from} to vehicle_assigned with {}",
                    vehicle.registration
                ),
                (),
            ))
        })
        .map(|(view, ())| view)
    }

    pub fn attach_document(
        &self,
        actor: &Actor,
        trip_id: &str,
        document: DocumentRef,
    ) -> Result<TripView, WorkflowError> {
        let doc_id = utils::new_uuid_to_bech32("doc_")?;
        let now = TimeStamp::new();
        self.commit("attach_document", actor, trip_id, now.clone(), |record| {
            self.guard.authorize_document_upload(actor, &record.trip)?;
            document.validate()?;
            record.trip.documents.push(TripDocument {
                id: doc_id.clone(),
                document: document.clone(),
                uploaded_by: actor.id.clone(),
                uploaded_at: now.clone(),
            });
            record.trip.updated_at = now.clone();
            Ok((format!("document {} attached", document.file_name), ()))
        })
        .map(|(view, ())| view)
    }

    // Payments

    pub fn create_payment_request(
        &self,
        actor: &Actor,
        trip_id: &str,
        draft: PaymentDraft,
    ) -> Result<(TripView, PaymentRequest), WorkflowError> {
        let request_id = utils::new_uuid_to_bech32("payreq_")?;
        let now = TimeStamp::new();
        self.commit("create_payment_request", actor, trip_id, now.clone(), |record| {
            let summary = summarize(&record.trip, record.ledger.requests());
            self.guard.authorize_payment_action(
                actor,
                &record.trip,
                &record.ledger,
                &summary,
                None,
                PaymentAction::Create(draft.kind),
            )?;
            let outstanding = summary.outstanding();
            match draft.kind {
                // an advance is partial, the balance always has something left to settle
                PaymentType::Advance if draft.amount >= outstanding => {
                    return Err(WorkflowError::validation(format!(
                        "advance must be less than the outstanding {outstanding}"
                    )));
                }
                PaymentType::Balance if draft.amount > outstanding => {
                    return Err(WorkflowError::validation(format!(
                        "final amount cannot exceed the outstanding {outstanding}"
                    )));
                }
                _ => {}
            }
            let request = record
                .ledger
                .create(
                    request_id.clone(),
                    &record.trip.id,
                    draft.clone(),
                    &actor.id,
                    self.config.amount_ceiling,
                    now.clone(),
                )?
                .clone();
            Ok((
                format!("{} request of {} raised", request.kind, request.amount),
                request,
            ))
        })
    }

    pub fn decide_payment(
        &self,
        actor: &Actor,
        request_id: &str,
        action: ReviewAction,
        reason: Option<&str>,
    ) -> Result<(TripView, PaymentRequest), WorkflowError> {
        let trip_id = self.store.trip_for_request(request_id)?;
        let now = TimeStamp::new();
        self.commit("decide_payment", actor, &trip_id, now.clone(), |record| {
            let summary = summarize(&record.trip, record.ledger.requests());
            let current = record.ledger.get(request_id);
            if current.is_none() {
                return Err(WorkflowError::not_found(format!("payment request {request_id}")));
            }
            self.guard.authorize_payment_action(
                actor,
                &record.trip,
                &record.ledger,
                &summary,
                current,
                PaymentAction::Decide(action),
            )?;
            let request = record
                .ledger
                .decide(request_id, action, &actor.id, reason, now.clone())?
                .clone();
            record.trip.accounts_owner_id.get_or_insert_with(|| actor.id.clone());

            let mut details = format!(
                "{} request of {} is now {}",
                request.kind, request.amount, request.status
            );
            if let Some(reason) = &request.review_reason {
                details.push_str(&format!(": {reason}"));
            }
            Ok((details, request))
        })
    }

    pub fn mark_paid(
        &self,
        actor: &Actor,
        request_id: &str,
        proof: DocumentRef,
        paid_amount: Option<Money>,
    ) -> Result<(TripView, PaymentRequest), WorkflowError> {
        let trip_id = self.store.trip_for_request(request_id)?;
        let now = TimeStamp::new();
        self.commit("mark_paid", actor, &trip_id, now.clone(), |record| {
            let summary = summarize(&record.trip, record.ledger.requests());
            self.guard.authorize_payment_action(
                actor,
                &record.trip,
                &record.ledger,
                &summary,
                record.ledger.get(request_id),
                PaymentAction::MarkPaid,
            )?;
            let request = record
                .ledger
                .mark_paid(request_id, proof.clone(), paid_amount, &actor.id, now.clone())?
                .clone();
            Ok((
                format!(
                    "{} request paid {} with proof {}",
                    request.kind,
                    request.paid_amount.unwrap_or(request.amount),
                    proof.file_name
                ),
                request,
            ))
        })
    }

    // Internals

    fn authorize_move(
        &self,
        actor: &Actor,
        record: &TripRecord,
        to: Stage,
    ) -> Result<Stage, WorkflowError> {
        let summary = summarize(&record.trip, record.ledger.requests());
        self.guard
            .authorize_stage_move(actor, &record.trip, to, &record.ledger, &summary)?;
        Ok(record.trip.current_stage)
    }

    fn check_amount(&self, what: &str, amount: Money) -> Result<(), WorkflowError> {
        if amount == 0 {
            return Err(WorkflowError::validation(format!("{what} must be positive")));
        }
        if amount > self.config.amount_ceiling {
            return Err(WorkflowError::validation(format!(
                "{what} exceeds the limit of {}",
                self.config.amount_ceiling
            )));
        }
        Ok(())
    }

    fn commit<T, F>(
        &self,
        operation: &str,
        actor: &Actor,
        trip_id: &str,
        now: TimeStamp<Utc>,
        mutate: F,
    ) -> Result<(TripView, T), WorkflowError>
    where
        F: Fn(&mut TripRecord) -> Result<(String, T), WorkflowError>,
    {
        match self.store.update(trip_id, mutate) {
            Ok((record, (details, outcome))) => {
                self.committed(operation, actor, &record, &details);
                self.emit(trip_id, actor, now, details);
                Ok((record.into(), outcome))
            }
            Err(err) => Err(self.rejected(operation, trip_id, actor, err)),
        }
    }

    fn committed(&self, operation: &str, actor: &Actor, record: &TripRecord, details: &str) {
        info!(
            operation,
            trip_id = %record.trip.id,
            actor_id = %actor.id,
            stage = %record.trip.current_stage,
            version = record.version,
            details,
            "workflow change committed"
        );
    }

    fn rejected(
        &self,
        operation: &str,
        trip_id: &str,
        actor: &Actor,
        err: WorkflowError,
    ) -> WorkflowError {
        match err.kind() {
            ErrorKind::Storage | ErrorKind::Codec | ErrorKind::Config => error!(
                operation,
                trip_id,
                actor_id = %actor.id,
                error = %err,
                "workflow operation failed"
            ),
            _ => warn!(
                operation,
                trip_id,
                actor_id = %actor.id,
                role = %actor.role,
                kind = ?err.kind(),
                reason = %err,
                "workflow operation denied"
            ),
        }
        err
    }

    fn emit(&self, trip_id: &str, actor: &Actor, at: TimeStamp<Utc>, details: String) {
        let entry = TimelineEntry::new(trip_id, actor, at, details);
        if let Err(err) = self.timeline.record(entry) {
            error!(trip_id, error = %err, "failed to record timeline entry");
        }
    }
}
