//! Property-based tests for stage ordering
//!
//! Covers the stage graph on its own and a live service driven by random
//! operation sequences from random actors. Each case runs against a temporary
//! sled database that disappears with it.

use proptest::prelude::*;
use std::sync::Arc;
use trip_workflow::{
    WorkflowConfig, WorkflowService,
    directory::{Driver, Ownership, StaticDirectory, Vehicle},
    payment::{BankDetails, PaymentDraft, PaymentMethod, PaymentType, ReviewAction},
    stage::{Stage, StageGraph},
    timeline::MemoryTimeline,
    trip::TripRequest,
    types::{Actor, ActorId, DocumentRef, Role},
};

#[derive(Debug, Clone)]
enum Step {
    Move(usize, Stage),
    Advance(usize),
    Quote(usize, u64),
    Confirm(usize, u64),
    Assign(usize),
    AttachDocument(usize),
    RequestPayment(usize, PaymentType, u64),
    ReviewLatest(usize, ReviewAction),
    PayLatest(usize),
}

// PROPERTY TEST STRATEGIES

/// Strategy to generate any stage of the chain
fn stage_strategy() -> impl Strategy<Value = Stage> {
    prop::sample::select(Stage::CHAIN.to_vec())
}

/// Strategy to generate an edge between two arbitrary stages
fn edge_strategy() -> impl Strategy<Value = (Stage, Stage)> {
    (stage_strategy(), stage_strategy())
}

/// Strategy to generate one service call. The first field picks the actor.
fn step_strategy() -> impl Strategy<Value = Step> {
    let who = 0usize..6;
    prop_oneof![
        (who.clone(), stage_strategy()).prop_map(|(w, s)| Step::Move(w, s)),
        who.clone().prop_map(Step::Advance),
        (who.clone(), 1u64..=90_000).prop_map(|(w, a)| Step::Quote(w, a)),
        (who.clone(), 1u64..=90_000).prop_map(|(w, a)| Step::Confirm(w, a)),
        who.clone().prop_map(Step::Assign),
        who.clone().prop_map(Step::AttachDocument),
        (
            who.clone(),
            prop_oneof![Just(PaymentType::Advance), Just(PaymentType::Balance)],
            1u64..=90_000
        )
            .prop_map(|(w, k, a)| Step::RequestPayment(w, k, a)),
        (who.clone(), prop_oneof![Just(ReviewAction::Approve), Just(ReviewAction::Hold)])
            .prop_map(|(w, r)| Step::ReviewLatest(w, r)),
        who.prop_map(Step::PayLatest),
    ]
}

fn actors() -> Vec<Actor> {
    vec![
        Actor::new("u-sales", "Kunal", Role::SalesConsigner),
        Actor::new("u-ops", "Meera", Role::OperationsConsigner),
        Actor::new("U1", "Vikram", Role::OperationsVehicles),
        Actor::new("U2", "Sana", Role::OperationsVehicles),
        Actor::new("u-acc", "Divya", Role::Accounts),
        Actor::new("u-admin", "Root", Role::Admin),
    ]
}

fn service(actors: &[Actor]) -> WorkflowService {
    let db = sled::Config::new().temporary(true).open().unwrap();
    let directory = Arc::new(StaticDirectory::new());
    for actor in actors {
        directory.add_actor(actor.clone());
    }
    directory.add_vehicle(Vehicle {
        id: "V".into(),
        registration: "MH12AB1234".into(),
        ownership: Ownership::Vendor {
            vendor_id: "ABC".into(),
        },
    });
    directory.add_driver(Driver {
        id: "d-abc".into(),
        name: "Ramesh".into(),
        vendor_id: Some("ABC".into()),
        active: true,
    });
    WorkflowService::new(
        Arc::new(db),
        WorkflowConfig::default(),
        directory.clone(),
        directory,
        Arc::new(MemoryTimeline::new()),
    )
    .unwrap()
}

fn bank() -> PaymentMethod {
    PaymentMethod::Bank(BankDetails {
        account_holder: "Ravi Transport".into(),
        account_number: "001122334455".into(),
        ifsc: "HDFC0001234".into(),
        bank_name: "HDFC Bank".into(),
    })
}

fn document() -> DocumentRef {
    DocumentRef::new("docs/lr.pdf", "lr.pdf", "application/pdf", 10_240)
}

/// Runs one step and reports whether it committed.
fn run(service: &WorkflowService, actors: &[Actor], trip_id: &str, step: &Step) -> bool {
    let latest = || {
        service
            .trip(trip_id)
            .ok()
            .and_then(|view| view.requests.last().map(|r| r.id.clone()))
    };
    match step {
        Step::Move(w, to) => service.move_stage(&actors[*w], trip_id, *to).is_ok(),
        Step::Advance(w) => service.advance(&actors[*w], trip_id).is_ok(),
        Step::Quote(w, amount) => service.submit_quote(&actors[*w], trip_id, *amount).is_ok(),
        Step::Confirm(w, amount) => service
            .confirm(&actors[*w], trip_id, *amount, &ActorId::from("U1"))
            .is_ok(),
        Step::Assign(w) => service
            .assign_vehicle(&actors[*w], trip_id, "V", Some("d-abc"))
            .is_ok(),
        Step::AttachDocument(w) => service
            .attach_document(&actors[*w], trip_id, document())
            .is_ok(),
        Step::RequestPayment(w, kind, amount) => service
            .create_payment_request(&actors[*w], trip_id, PaymentDraft::new(*kind, *amount, bank()))
            .is_ok(),
        Step::ReviewLatest(w, action) => latest()
            .map(|id| service.decide_payment(&actors[*w], &id, *action, None).is_ok())
            .unwrap_or(false),
        Step::PayLatest(w) => latest()
            .map(|id| {
                let proof = DocumentRef::new("proofs/utr.png", "utr.png", "image/png", 512);
                service.mark_paid(&actors[*w], &id, proof, None).is_ok()
            })
            .unwrap_or(false),
    }
}

// PROPERTY TESTS
proptest! {
    /// Property: Every edge of a graph that validates points strictly forward
    ///
    /// Random side edges are either rejected at validation or keep stage
    /// ordinals monotone along every legal move.
    #[test]
    fn validated_graphs_only_move_forward(edges in prop::collection::vec(edge_strategy(), 0..6)) {
        let graph = edges
            .iter()
            .fold(StageGraph::standard(), |g, &(from, to)| g.with_side_edge(from, to));
        if graph.validate().is_ok() {
            for from in Stage::CHAIN {
                for to in Stage::CHAIN {
                    if graph.can_transition(from, to) {
                        prop_assert!(to.ordinal() > from.ordinal(), "{} -> {}", from, to);
                    }
                }
            }
        }
    }

    /// Property: Backward and self edges never validate
    #[test]
    fn backward_side_edges_are_rejected((from, to) in edge_strategy()) {
        prop_assume!(to <= from);
        let graph = StageGraph::standard().with_side_edge(from, to);
        prop_assert!(graph.validate().is_err());
    }

    /// Property: No request_received shortcut escapes the quote
    ///
    /// Whatever side edge is added, confirmed stays unreachable without quoted.
    #[test]
    fn confirmed_always_requires_quoted((from, to) in edge_strategy()) {
        let graph = StageGraph::standard().with_side_edge(from, to);
        if graph.validate().is_ok() {
            for earlier in [Stage::RequestReceived, Stage::Contacted] {
                prop_assert!(!graph.can_transition(earlier, Stage::Confirmed));
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: Stage ordinals never decrease through the service
    ///
    /// Random actors fire random operations at one trip. Failed operations
    /// leave the stored version untouched; committed ones bump it by one.
    #[test]
    fn service_stage_is_monotone(steps in prop::collection::vec(step_strategy(), 1..30)) {
        let actors = actors();
        let service = service(&actors);
        let request = TripRequest::new()
            .set_consigner("Shree Cement")
            .set_route("Pune", "Nagpur")
            .set_material("cement bags")
            .set_weight_kg(18_000);
        let trip_id = service.create_trip(&actors[0], request).unwrap().trip.id;

        let mut last = service.trip(&trip_id).unwrap();
        for step in &steps {
            let committed = run(&service, &actors, &trip_id, step);
            let now = service.trip(&trip_id).unwrap();
            prop_assert!(now.trip.current_stage >= last.trip.current_stage, "{:?}", step);
            if committed {
                prop_assert_eq!(now.version, last.version + 1);
            } else {
                prop_assert_eq!(now.version, last.version);
                prop_assert_eq!(&now.trip, &last.trip);
            }
            last = now;
        }
    }
}
