//! Walks one trip from intake to closure and prints its payment summary.
//!
//! Logs every committed change at `trip_workflow=debug` unless `RUST_LOG`
//! says otherwise.
//! Set `TRIP_WORKFLOW_DB_PATH` to keep the database, otherwise a temporary
//! directory is used.

use anyhow::Context;
use std::sync::Arc;
use trip_workflow::{
    WorkflowConfig, WorkflowService,
    directory::{Driver, Ownership, StaticDirectory, Vehicle},
    payment::{PaymentDraft, PaymentMethod, PaymentType, ReviewAction},
    trip::TripRequest,
    types::{Actor, DocumentRef, Role},
};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trip_workflow=debug".into()),
        )
        .init();

    let scratch = tempfile::tempdir()?;
    let mut config = WorkflowConfig::from_env()?;
    if std::env::var_os("TRIP_WORKFLOW_DB_PATH").is_none() {
        config.db_path = scratch.path().join("trip_workflow.db");
    }

    let sales = Actor::new("u-sales", "Kunal", Role::SalesConsigner);
    let ops = Actor::new("u-ops", "Meera", Role::OperationsConsigner);
    let vops = Actor::new("u-vops", "Vikram", Role::OperationsVehicles);
    let accounts = Actor::new("u-acc", "Divya", Role::Accounts);

    let directory = Arc::new(StaticDirectory::new());
    for actor in [&sales, &ops, &vops, &accounts] {
        directory.add_actor(actor.clone());
    }
    directory.add_vehicle(Vehicle {
        id: "veh-1".into(),
        registration: "MH12AB1234".into(),
        ownership: Ownership::Vendor {
            vendor_id: "vendor-abc".into(),
        },
    });
    directory.add_driver(Driver {
        id: "drv-1".into(),
        name: "Ramesh".into(),
        vendor_id: Some("vendor-abc".into()),
        active: true,
    });

    let service = WorkflowService::open(config, directory.clone(), directory)
        .context("failed to open the workflow store")?;

    let request = TripRequest::new()
        .set_consigner("Shree Cement")
        .set_route("Pune", "Nagpur")
        .set_material("cement bags")
        .set_weight_kg(18_000)
        .set_vehicle_type("32ft MXL");
    let trip = service.create_trip(&sales, request)?.trip;
    println!("raised {} ({})", trip.code, trip.id);

    service.accept_request(&ops, &trip.id)?;
    service.submit_quote(&sales, &trip.id, 52_000)?;
    service.confirm(&ops, &trip.id, 50_000, &vops.id)?;
    service.assign_vehicle(&vops, &trip.id, "veh-1", Some("drv-1"))?;
    service.advance(&vops, &trip.id)?;
    service.attach_document(
        &vops,
        &trip.id,
        DocumentRef::new("docs/lr-881.pdf", "lr-881.pdf", "application/pdf", 52_113),
    )?;
    service.advance(&vops, &trip.id)?;

    let upi = PaymentMethod::Upi {
        upi_id: Some("ravitransport@okhdfc".into()),
        qr_code: None,
    };
    let (_, advance) = service.create_payment_request(
        &vops,
        &trip.id,
        PaymentDraft::new(PaymentType::Advance, 15_000, upi.clone()),
    )?;
    service.decide_payment(&accounts, &advance.id, ReviewAction::Approve, None)?;
    let (view, _) = service.mark_paid(
        &accounts,
        &advance.id,
        DocumentRef::new("proofs/utr-1.png", "utr-1.png", "image/png", 4_096),
        None,
    )?;
    println!(
        "advance paid {}, suggested final {}",
        view.summary.paid_advance_total, view.summary.suggested_final_amount
    );

    for _ in 0..3 {
        service.advance(&vops, &trip.id)?;
    }

    let (_, balance) = service.create_payment_request(
        &vops,
        &trip.id,
        PaymentDraft::new(PaymentType::Balance, view.summary.suggested_final_amount, upi)
            .with_notes("balance on delivery"),
    )?;
    service.decide_payment(&accounts, &balance.id, ReviewAction::Approve, None)?;
    service.mark_paid(
        &accounts,
        &balance.id,
        DocumentRef::new("proofs/utr-2.png", "utr-2.png", "image/png", 4_210),
        None,
    )?;

    let closed = service.advance(&accounts, &trip.id)?;
    println!(
        "{} is {} after {} changes, completed: {}",
        closed.trip.code,
        closed.trip.current_stage,
        closed.version,
        closed.summary.is_trip_completed
    );

    Ok(())
}
