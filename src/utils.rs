//! Identifier helpers

use crate::error::WorkflowError;
use crate::types::TimeStamp;
use bech32::Bech32m;
use chrono::Utc;
use uuid7::{Uuid, uuid7};

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> Result<String, WorkflowError> {
    encode_uuid(hrp, uuid7())
}

fn encode_uuid(hrp: &str, uuid: Uuid) -> Result<String, WorkflowError> {
    let hrp = bech32::Hrp::parse(hrp)
        .map_err(|e| WorkflowError::Config(format!("bad id prefix '{hrp}': {e}")))?;
    bech32::encode::<Bech32m>(hrp, uuid.as_bytes())
        .map_err(|e| WorkflowError::Codec(e.to_string()))
}

/// Human readable trip code, e.g. `TRP-20261019-3FA9C1`.
///
/// The suffix comes from the random tail of a fresh uuid7; the leading bytes
/// are the timestamp and would repeat within the same millisecond.
pub fn trip_code(created_at: &TimeStamp<Utc>) -> String {
    let uuid = uuid7();
    let bytes = uuid.as_bytes();
    format!(
        "TRP-{}-{}",
        created_at.to_datetime_utc().format("%Y%m%d"),
        hex::encode_upper(&bytes[13..16])
    )
}
