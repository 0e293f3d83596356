//! Shared value types: timestamps, actors, roles and document references
use crate::error::WorkflowError;
use chrono::{DateTime, TimeZone, Utc};
use std::fmt;
use std::str::FromStr;

/// Money in whole currency units. Integers only, never floats.
pub type Money = u64;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .unwrap_or_default()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// Identifier of a user as handed out by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, minicbor::Encode, minicbor::Decode)]
pub struct ActorId(#[n(0)] pub String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
pub enum Role {
    #[n(0)]
    Admin,
    #[n(1)]
    SuperAdmin,
    #[n(2)]
    OperationsConsigner,
    #[n(3)]
    OperationsVehicles,
    #[n(4)]
    SalesConsigner,
    #[n(5)]
    SalesVehicles,
    #[n(6)]
    Accounts,
    #[n(7)]
    Support,
}

impl Role {
    pub const ALL: [Role; 8] = [
        Role::Admin,
        Role::SuperAdmin,
        Role::OperationsConsigner,
        Role::OperationsVehicles,
        Role::SalesConsigner,
        Role::SalesVehicles,
        Role::Accounts,
        Role::Support,
    ];

    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
            Role::OperationsConsigner => "operations_consigner",
            Role::OperationsVehicles => "operations_vehicles",
            Role::SalesConsigner => "sales_consigner",
            Role::SalesVehicles => "sales_vehicles",
            Role::Accounts => "accounts",
            Role::Support => "support",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| WorkflowError::validation(format!("unknown role '{s}'")))
    }
}

/// The user performing an operation. Always passed explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: ActorId,
    pub name: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self {
            id: ActorId::new(id),
            name: name.into(),
            role,
        }
    }
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// Reference to an uploaded file. The bytes live in an external store.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct DocumentRef {
    #[n(0)]
    pub object_key: String,
    #[n(1)]
    pub file_name: String,
    #[n(2)]
    pub mime_type: String,
    #[n(3)]
    pub size: u64,
}

impl DocumentRef {
    pub fn new(
        object_key: impl Into<String>,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            object_key: object_key.into(),
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            size,
        }
    }

    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.object_key.trim().is_empty() {
            return Err(WorkflowError::validation("document object key is required"));
        }
        if self.file_name.trim().is_empty() {
            return Err(WorkflowError::validation("document file name is required"));
        }
        if self.size == 0 {
            return Err(WorkflowError::validation("document is empty"));
        }
        Ok(())
    }
}
