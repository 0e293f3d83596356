//! Sled-backed persistence for trips and their payment ledgers
//!
//! A trip and its ledger are stored together as one CBOR record, so every
//! workflow operation reads, checks and writes a single key inside one sled
//! transaction. Sled re-runs a transaction on conflicting concurrent writes,
//! which means a guard always sees the state its write is applied to.
use crate::error::WorkflowError;
use crate::payment::PaymentLedger;
use crate::trip::Trip;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::sync::Arc;
use tracing::debug;

const TRIP_PREFIX: &str = "trip:";
const REQUEST_PREFIX: &str = "request:";

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct TripRecord {
    #[n(0)]
    pub trip: Trip,
    #[n(1)]
    pub ledger: PaymentLedger,
    #[n(2)]
    pub version: u64, // bumped on every committed write
}

impl TripRecord {
    pub fn new(trip: Trip) -> Self {
        Self {
            trip,
            ledger: PaymentLedger::new(),
            version: 0,
        }
    }
}

fn trip_key(trip_id: &str) -> String {
    format!("{TRIP_PREFIX}{trip_id}")
}

fn request_key(request_id: &str) -> String {
    format!("{REQUEST_PREFIX}{request_id}")
}

fn flatten(err: TransactionError<WorkflowError>) -> WorkflowError {
    match err {
        TransactionError::Abort(err) => err,
        TransactionError::Storage(err) => WorkflowError::Storage(err),
    }
}

fn abort(err: WorkflowError) -> ConflictableTransactionError<WorkflowError> {
    ConflictableTransactionError::Abort(err)
}

#[derive(Clone)]
pub struct TripStore {
    instance: Arc<sled::Db>,
}

impl TripStore {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self { instance }
    }

    pub fn db(&self) -> &sled::Db {
        &self.instance
    }

    /// Inserts a fresh record. Fails if the id is already taken.
    pub fn insert(&self, record: &TripRecord) -> Result<(), WorkflowError> {
        let key = trip_key(&record.trip.id);
        let bytes = minicbor::to_vec(record)?;
        self.instance
            .transaction(|tx| {
                if tx.get(key.as_bytes())?.is_some() {
                    return Err(abort(WorkflowError::conflict(format!(
                        "trip {} already exists",
                        record.trip.id
                    ))));
                }
                tx.insert(key.as_bytes(), bytes.clone())?;
                Ok(())
            })
            .map_err(flatten)?;
        debug!(trip_id = %record.trip.id, "trip record inserted");
        Ok(())
    }

    pub fn load(&self, trip_id: &str) -> Result<TripRecord, WorkflowError> {
        let bytes = self
            .instance
            .get(trip_key(trip_id).as_bytes())?
            .ok_or_else(|| WorkflowError::not_found(format!("trip {trip_id}")))?;
        Ok(minicbor::decode(&bytes)?)
    }

    pub fn trip_for_request(&self, request_id: &str) -> Result<String, WorkflowError> {
        let bytes = self
            .instance
            .get(request_key(request_id).as_bytes())?
            .ok_or_else(|| WorkflowError::not_found(format!("payment request {request_id}")))?;
        String::from_utf8(bytes.to_vec()).map_err(|e| WorkflowError::Codec(e.to_string()))
    }

    pub fn list(&self) -> Result<Vec<TripRecord>, WorkflowError> {
        self.instance
            .scan_prefix(TRIP_PREFIX.as_bytes())
            .values()
            .map(|value| -> Result<TripRecord, WorkflowError> {
                Ok(minicbor::decode(&value?)?)
            })
            .collect()
    }

    /// Applies `mutate` to the current record and commits it atomically.
    ///
    /// `mutate` may run more than once when sled retries a conflicting
    /// transaction, so it must only touch the record it is given. Returning an
    /// error aborts without writing anything.
    pub fn update<T, F>(&self, trip_id: &str, mutate: F) -> Result<(TripRecord, T), WorkflowError>
    where
        F: Fn(&mut TripRecord) -> Result<T, WorkflowError>,
    {
        let key = trip_key(trip_id);
        let committed = self
            .instance
            .transaction(|tx| {
                let bytes = tx.get(key.as_bytes())?.ok_or_else(|| {
                    abort(WorkflowError::not_found(format!("trip {trip_id}")))
                })?;
                let mut record: TripRecord =
                    minicbor::decode(&bytes).map_err(|e| abort(e.into()))?;

                let outcome = mutate(&mut record).map_err(abort)?;
                record.version += 1;

                let encoded = minicbor::to_vec(&record).map_err(|e| abort(e.into()))?;
                tx.insert(key.as_bytes(), encoded)?;
                for request in record.ledger.requests() {
                    tx.insert(request_key(&request.id).as_bytes(), trip_id.as_bytes())?;
                }
                Ok((record, outcome))
            })
            .map_err(flatten)?;
        debug!(trip_id, version = committed.0.version, "trip record committed");
        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::stage::Stage;
    use crate::trip::TripRequest;
    use crate::types::{ActorId, TimeStamp};
    use tempfile::tempdir;

    fn record(id: &str) -> TripRecord {
        TripRecord::new(Trip::new(
            id.into(),
            "TRP-20260101-AAAAAA".into(),
            TripRequest::new(),
            ActorId::from("u-sales"),
            TimeStamp::new(),
        ))
    }

    fn store() -> (tempfile::TempDir, TripStore) {
        let dir = tempdir().unwrap();
        let db = sled::open(dir.path().join("store.db")).unwrap();
        (dir, TripStore::new(Arc::new(db)))
    }

    #[test]
    fn insert_then_load() {
        let (_dir, store) = store();
        let rec = record("trip_a");
        store.insert(&rec).unwrap();
        assert_eq!(store.load("trip_a").unwrap(), rec);
        assert_eq!(store.load("trip_b").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn duplicate_insert_conflicts() {
        let (_dir, store) = store();
        store.insert(&record("trip_a")).unwrap();
        let err = store.insert(&record("trip_a")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn update_bumps_version() {
        let (_dir, store) = store();
        store.insert(&record("trip_a")).unwrap();
        let (rec, ()) = store
            .update("trip_a", |r| {
                r.trip.current_stage = Stage::Contacted;
                Ok(())
            })
            .unwrap();
        assert_eq!(rec.version, 1);
        assert_eq!(store.load("trip_a").unwrap().trip.current_stage, Stage::Contacted);
    }

    #[test]
    fn failed_mutation_writes_nothing() {
        let (_dir, store) = store();
        store.insert(&record("trip_a")).unwrap();
        let err = store
            .update("trip_a", |r| -> Result<(), WorkflowError> {
                r.trip.current_stage = Stage::Closed;
                Err(WorkflowError::invalid_state("nope"))
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        let loaded = store.load("trip_a").unwrap();
        assert_eq!(loaded.version, 0);
        assert_eq!(loaded.trip.current_stage, Stage::RequestReceived);
    }

    #[test]
    fn list_returns_all_trips() {
        let (_dir, store) = store();
        store.insert(&record("trip_a")).unwrap();
        store.insert(&record("trip_b")).unwrap();
        assert_eq!(store.list().unwrap().len(), 2);
    }
}
