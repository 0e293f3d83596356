//! Read-only lookups into systems that own users, vehicles and drivers
use crate::types::{Actor, ActorId};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Identity and role lookup. Sessions are not this crate's business.
pub trait RoleDirectory: Send + Sync {
    fn lookup(&self, id: &ActorId) -> Option<Actor>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ownership {
    Leased,
    OwnerDriver,
    Vendor { vendor_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vehicle {
    pub id: String,
    pub registration: String,
    pub ownership: Ownership,
}

impl Vehicle {
    pub fn vendor_id(&self) -> Option<&str> {
        match &self.ownership {
            Ownership::Vendor { vendor_id } => Some(vendor_id),
            Ownership::Leased | Ownership::OwnerDriver => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Driver {
    pub id: String,
    pub name: String,
    pub vendor_id: Option<String>,
    pub active: bool,
}

pub trait VehicleDirectory: Send + Sync {
    fn vehicle(&self, vehicle_id: &str) -> Option<Vehicle>;
    /// Any registered driver, active or not.
    fn driver(&self, driver_id: &str) -> Option<Driver>;
    /// Active drivers that may drive for this vendor.
    fn drivers_for_vendor(&self, vendor_id: &str) -> Vec<Driver>;
}

/// In-memory directory for embedding and tests.
///
/// A panic while holding one of the locks leaves plain map data behind, so
/// poisoned locks are recovered rather than dropping registrations.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    actors: RwLock<HashMap<ActorId, Actor>>,
    vehicles: RwLock<HashMap<String, Vehicle>>,
    drivers: RwLock<Vec<Driver>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_actor(&self, actor: Actor) {
        self.actors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(actor.id.clone(), actor);
    }

    pub fn add_vehicle(&self, vehicle: Vehicle) {
        self.vehicles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(vehicle.id.clone(), vehicle);
    }

    pub fn add_driver(&self, driver: Driver) {
        let mut drivers = self.drivers.write().unwrap_or_else(PoisonError::into_inner);
        drivers.retain(|d| d.id != driver.id);
        drivers.push(driver);
    }
}

impl RoleDirectory for StaticDirectory {
    fn lookup(&self, id: &ActorId) -> Option<Actor> {
        self.actors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }
}

impl VehicleDirectory for StaticDirectory {
    fn vehicle(&self, vehicle_id: &str) -> Option<Vehicle> {
        self.vehicles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(vehicle_id)
            .cloned()
    }

    fn driver(&self, driver_id: &str) -> Option<Driver> {
        self.drivers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|d| d.id == driver_id)
            .cloned()
    }

    fn drivers_for_vendor(&self, vendor_id: &str) -> Vec<Driver> {
        self.drivers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|d| d.active && d.vendor_id.as_deref() == Some(vendor_id))
            .cloned()
            .collect()
    }
}
