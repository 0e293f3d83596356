//! Trip stages and the graph of legal moves between them
use crate::error::WorkflowError;
use std::collections::{BTreeSet, VecDeque};
use std::fmt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, minicbor::Encode, minicbor::Decode,
)]
pub enum Stage {
    #[n(0)]
    RequestReceived,
    #[n(1)]
    Contacted,
    #[n(2)]
    Quoted,
    #[n(3)]
    Confirmed,
    #[n(4)]
    VehicleAssigned,
    #[n(5)]
    AtLoading,
    #[n(6)]
    LoadedDocsOk,
    #[n(7)]
    AdvancePaid,
    #[n(8)]
    InTransit,
    #[n(9)]
    Delivered,
    #[n(10)]
    Closed,
}

impl Stage {
    /// Canonical forward chain, in order.
    pub const CHAIN: [Stage; 11] = [
        Stage::RequestReceived,
        Stage::Contacted,
        Stage::Quoted,
        Stage::Confirmed,
        Stage::VehicleAssigned,
        Stage::AtLoading,
        Stage::LoadedDocsOk,
        Stage::AdvancePaid,
        Stage::InTransit,
        Stage::Delivered,
        Stage::Closed,
    ];

    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn is_terminal(self) -> bool {
        self == Stage::Closed
    }

    /// Stages a vehicle is working the trip: `vehicle_assigned` through `in_transit`.
    pub fn in_execution_window(self) -> bool {
        (Stage::VehicleAssigned..=Stage::InTransit).contains(&self)
    }

    /// Stage that must have been committed before this one can be reached.
    ///
    /// `contacted` and `advance_paid` are bookkeeping checkpoints; every other
    /// stage requires its chain predecessor.
    pub fn required_predecessor(self) -> Option<Stage> {
        match self {
            Stage::RequestReceived => None,
            Stage::Contacted => Some(Stage::RequestReceived),
            Stage::Quoted => Some(Stage::RequestReceived),
            Stage::Confirmed => Some(Stage::Quoted),
            Stage::VehicleAssigned => Some(Stage::Confirmed),
            Stage::AtLoading => Some(Stage::VehicleAssigned),
            Stage::LoadedDocsOk => Some(Stage::AtLoading),
            Stage::AdvancePaid => Some(Stage::LoadedDocsOk),
            Stage::InTransit => Some(Stage::LoadedDocsOk),
            Stage::Delivered => Some(Stage::InTransit),
            Stage::Closed => Some(Stage::Delivered),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::RequestReceived => "request_received",
            Stage::Contacted => "contacted",
            Stage::Quoted => "quoted",
            Stage::Confirmed => "confirmed",
            Stage::VehicleAssigned => "vehicle_assigned",
            Stage::AtLoading => "at_loading",
            Stage::LoadedDocsOk => "loaded_docs_ok",
            Stage::AdvancePaid => "advance_paid",
            Stage::InTransit => "in_transit",
            Stage::Delivered => "delivered",
            Stage::Closed => "closed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One forward chain plus a bounded set of side exits.
///
/// Side edges must point forward in the chain and may only skip stages whose
/// predecessor requirement they still satisfy, which keeps the graph acyclic and
/// stage ordinals monotone.
#[derive(Debug, Clone)]
pub struct StageGraph {
    chain: Vec<Stage>,
    side_edges: Vec<(Stage, Stage)>,
}

impl StageGraph {
    /// The graph used for freight trips. Trips have no lost branch.
    pub fn standard() -> Self {
        Self {
            chain: Stage::CHAIN.to_vec(),
            side_edges: vec![],
        }
    }

    pub fn with_side_edge(mut self, from: Stage, to: Stage) -> Self {
        self.side_edges.push((from, to));
        self
    }

    /// Checks the graph once at startup.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.chain.first() != Some(&Stage::RequestReceived) {
            return Err(WorkflowError::Config(
                "stage chain must start at request_received".into(),
            ));
        }
        if self.chain.windows(2).any(|w| w[0] >= w[1]) {
            return Err(WorkflowError::Config(
                "stage chain must be strictly ordered".into(),
            ));
        }
        for &(from, to) in &self.side_edges {
            if from >= to {
                return Err(WorkflowError::Config(format!(
                    "side edge {from} -> {to} does not point forward"
                )));
            }
            if let Some(required) = to.required_predecessor() {
                if from < required {
                    return Err(WorkflowError::Config(format!(
                        "side edge {from} -> {to} skips required stage {required}"
                    )));
                }
            }
        }

        let reachable = self.reachable_from(Stage::RequestReceived);
        if let Some(orphan) = Stage::CHAIN.iter().find(|s| !reachable.contains(s)) {
            return Err(WorkflowError::Config(format!(
                "stage {orphan} is not reachable from request_received"
            )));
        }
        Ok(())
    }

    pub fn can_transition(&self, from: Stage, to: Stage) -> bool {
        self.next_stage(from) == Some(to) || self.allowed_side_stages(from).contains(&to)
    }

    pub fn next_stage(&self, from: Stage) -> Option<Stage> {
        let idx = self.chain.iter().position(|&s| s == from)?;
        self.chain.get(idx + 1).copied()
    }

    pub fn allowed_side_stages(&self, from: Stage) -> BTreeSet<Stage> {
        self.side_edges
            .iter()
            .filter(|(f, _)| *f == from)
            .map(|&(_, to)| to)
            .collect()
    }

    fn reachable_from(&self, start: Stage) -> BTreeSet<Stage> {
        let mut seen = BTreeSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(stage) = queue.pop_front() {
            let successors = self
                .next_stage(stage)
                .into_iter()
                .chain(self.allowed_side_stages(stage));
            for next in successors {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        seen
    }
}

impl Default for StageGraph {
    fn default() -> Self {
        Self::standard()
    }
}
