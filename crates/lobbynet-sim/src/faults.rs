use std::collections::HashMap;

use lobbynet_proto::records::BackendFailure;
use strum::IntoStaticStr;

/// Service requests that can be counted and failed on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
pub enum SimOp {
    CreateNewNetwork,
    ConnectToNetwork,
    AuthenticateLocalUser,
    CreateEndpoint,
    LeaveNetwork,
    SendMessage,
    CreateAndJoinLobby,
    JoinLobby,
    JoinArrangedLobby,
    AddMember,
    PostUpdate,
    LeaveLobby,
    FindLobbies,
    SendInvite,
    CreateTicket,
    CancelTicket,
}

/// How the next call of an operation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The call itself returns an error.
    Reject { code: u32 },
    /// The call is accepted; its completion record carries the error.
    FailAsync { code: u32 },
}

impl Fault {
    pub(crate) fn failure(self, op: SimOp) -> BackendFailure {
        let name: &'static str = op.into();
        match self {
            Fault::Reject { code } => BackendFailure::new(code, format!("{name} rejected")),
            Fault::FailAsync { code } => BackendFailure::new(code, format!("{name} failed")),
        }
    }
}

/// Per-process request counters and one-shot faults.
#[derive(Debug, Default)]
pub(crate) struct FaultPlan {
    counts: HashMap<SimOp, usize>,
    pending: Vec<(SimOp, Fault)>,
}

impl FaultPlan {
    pub fn inject(&mut self, op: SimOp, fault: Fault) {
        self.pending.push((op, fault));
    }

    pub fn record(&mut self, op: SimOp) {
        *self.counts.entry(op).or_default() += 1;
    }

    /// Takes the first fault queued for `op`.
    pub fn take(&mut self, op: SimOp) -> Option<Fault> {
        let index = self.pending.iter().position(|(o, _)| *o == op)?;
        Some(self.pending.remove(index).1)
    }

    pub fn count(&self, op: SimOp) -> usize {
        self.counts.get(&op).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faults_fire_once_in_order_and_calls_are_counted() {
        let mut plan = FaultPlan::default();
        plan.inject(SimOp::JoinLobby, Fault::Reject { code: 1 });
        plan.inject(SimOp::JoinLobby, Fault::FailAsync { code: 2 });

        assert_eq!(plan.take(SimOp::CreateEndpoint), None);
        assert_eq!(plan.take(SimOp::JoinLobby), Some(Fault::Reject { code: 1 }));
        assert_eq!(plan.take(SimOp::JoinLobby), Some(Fault::FailAsync { code: 2 }));
        assert_eq!(plan.take(SimOp::JoinLobby), None);

        plan.record(SimOp::JoinLobby);
        plan.record(SimOp::JoinLobby);
        assert_eq!(plan.count(SimOp::JoinLobby), 2);
        assert_eq!(plan.count(SimOp::PostUpdate), 0);
    }

    #[test]
    fn failure_names_the_operation() {
        let failure = Fault::FailAsync { code: 503 }.failure(SimOp::PostUpdate);
        assert_eq!(failure.code, 503);
        assert!(failure.message.contains("PostUpdate"));
    }
}
