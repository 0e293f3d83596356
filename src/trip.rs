//! Trip aggregate and the request details captured on intake
use crate::error::WorkflowError;
use crate::stage::Stage;
use crate::types::{ActorId, DocumentRef, Money, TimeStamp};
use chrono::Utc;

// Also used for constructing drafts on intake and edit
#[derive(minicbor::Encode, minicbor::Decode, Debug, Default, Clone, Eq, PartialEq)]
pub struct TripRequest {
    #[n(0)]
    pub consigner_name: String,
    #[n(1)]
    pub origin: String,
    #[n(2)]
    pub destination: String,
    #[n(3)]
    pub material: String,
    #[n(4)]
    pub weight_kg: u64,
    #[n(5)]
    pub vehicle_type: Option<String>, // e.g. "32ft MXL", free text from the console
    #[n(6)]
    pub pickup_date: Option<TimeStamp<Utc>>,
}

impl TripRequest {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_consigner(mut self, name: &str) -> Self {
        self.consigner_name = name.to_string();
        self
    }
    pub fn set_route(mut self, origin: &str, destination: &str) -> Self {
        self.origin = origin.to_string();
        self.destination = destination.to_string();
        self
    }
    pub fn set_material(mut self, material: &str) -> Self {
        self.material = material.to_string();
        self
    }
    pub fn set_weight_kg(mut self, weight: u64) -> Self {
        self.weight_kg = weight;
        self
    }
    pub fn set_vehicle_type(mut self, vehicle_type: &str) -> Self {
        self.vehicle_type = Some(vehicle_type.to_string());
        self
    }
    pub fn set_pickup_date(mut self, date: TimeStamp<Utc>) -> Self {
        self.pickup_date = Some(date);
        self
    }

    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.consigner_name.trim().is_empty() {
            return Err(WorkflowError::validation("consigner name is required"));
        }
        if self.origin.trim().is_empty() {
            return Err(WorkflowError::validation("origin is required"));
        }
        if self.destination.trim().is_empty() {
            return Err(WorkflowError::validation("destination is required"));
        }
        if self.origin.trim().eq_ignore_ascii_case(self.destination.trim()) {
            return Err(WorkflowError::validation(
                "origin and destination must differ",
            ));
        }
        if self.material.trim().is_empty() {
            return Err(WorkflowError::validation("material is required"));
        }
        if self.weight_kg == 0 {
            return Err(WorkflowError::validation("weight must be positive"));
        }
        Ok(())
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Eq, PartialEq)]
pub struct TripDocument {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub document: DocumentRef,
    #[n(2)]
    pub uploaded_by: ActorId,
    #[n(3)]
    pub uploaded_at: TimeStamp<Utc>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Eq, PartialEq)]
pub struct Trip {
    #[n(0)]
    pub id: String, // bech32 encoded uuid7, prefix trip_
    #[n(1)]
    pub code: String,
    #[n(2)]
    pub current_stage: Stage,
    #[n(3)]
    pub request: TripRequest,
    #[n(4)]
    pub requested_by_id: ActorId,
    #[n(5)]
    pub sales_owner_id: Option<ActorId>,
    #[n(6)]
    pub ops_owner_id: Option<ActorId>,
    #[n(7)]
    pub ops_vehicles_owner_id: Option<ActorId>,
    #[n(8)]
    pub accounts_owner_id: Option<ActorId>,
    #[n(9)]
    pub quoted_amount: Option<Money>,
    #[n(10)]
    pub trip_amount: Option<Money>,
    #[n(11)]
    pub vehicle_id: Option<String>,
    #[n(12)]
    pub driver_id: Option<String>,
    #[n(13)]
    pub leased: bool,
    #[n(14)]
    pub documents: Vec<TripDocument>,
    #[n(15)]
    pub created_at: TimeStamp<Utc>,
    #[n(16)]
    pub updated_at: TimeStamp<Utc>,
}

impl Trip {
    pub fn new(
        id: String,
        code: String,
        request: TripRequest,
        requested_by_id: ActorId,
        created_at: TimeStamp<Utc>,
    ) -> Self {
        Self {
            id,
            code,
            current_stage: Stage::RequestReceived,
            request,
            requested_by_id,
            sales_owner_id: None,
            ops_owner_id: None,
            ops_vehicles_owner_id: None,
            accounts_owner_id: None,
            quoted_amount: None,
            trip_amount: None,
            vehicle_id: None,
            driver_id: None,
            leased: false,
            documents: vec![],
            created_at: created_at.clone(),
            updated_at: created_at,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.current_stage.is_terminal()
    }

    pub fn is_vehicles_owner(&self, actor: &ActorId) -> bool {
        self.ops_vehicles_owner_id.as_ref() == Some(actor)
    }

    /// Records a committed stage move. Callers have already consulted the guard.
    pub fn move_to(&mut self, stage: Stage, at: TimeStamp<Utc>) {
        self.current_stage = stage;
        self.updated_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> TripRequest {
        TripRequest::new()
            .set_consigner("Shree Cement")
            .set_route("Pune", "Nagpur")
            .set_material("cement bags")
            .set_weight_kg(18_000)
    }

    #[test]
    fn builder_sets_fields() {
        let req = request().set_vehicle_type("32ft MXL");
        assert_eq!(req.origin, "Pune");
        assert_eq!(req.destination, "Nagpur");
        assert_eq!(req.vehicle_type.as_deref(), Some("32ft MXL"));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_fields() {
        assert!(TripRequest::new().validate().is_err());
        assert!(request().set_weight_kg(0).validate().is_err());
        assert!(request().set_route("Pune", " pune ").validate().is_err());
        assert!(request().set_material("  ").validate().is_err());
    }

    #[test]
    fn new_trip_starts_at_request_received() {
        let trip = Trip::new(
            "trip_1".into(),
            "TRP-20260101-000000".into(),
            request(),
            ActorId::from("u-sales"),
            TimeStamp::new(),
        );
        assert_eq!(trip.current_stage, Stage::RequestReceived);
        assert!(trip.trip_amount.is_none());
        assert!(!trip.is_closed());
    }

    #[test]
    fn trip_cbor_roundtrip() {
        let trip = Trip::new(
            "trip_1".into(),
            "TRP-20260101-000000".into(),
            request().set_pickup_date(TimeStamp::new_with(2026, 1, 2, 8, 0, 0)),
            ActorId::from("u-sales"),
            TimeStamp::new(),
        );
        let encoded = minicbor::to_vec(&trip).unwrap();
        let decoded: Trip = minicbor::decode(&encoded).unwrap();
        assert_eq!(trip, decoded);
    }
}
