//! Typed errors for topology operations on a [`Network`](crate::network::Network).
//!
//! Configuration and I/O failures are reported through `anyhow`; the errors
//! here are the ones a caller may want to match on, since every one of them
//! means the requested operation was refused and the network left untouched.

use crate::agent::AgentId;

/// Errors raised by tie and agent operations on a network.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    /// The agent id does not name a live agent of this network.
    #[error("unknown agent: {0}")]
    UnknownAgent(AgentId),

    /// An agent cannot be tied to itself.
    #[error("agent {0} cannot be tied to itself")]
    SelfTie(AgentId),

    /// The two agents are already tied.
    #[error("agents {0} and {1} are already tied")]
    DuplicateTie(AgentId, AgentId),

    /// The two agents are not tied.
    #[error("agents {0} and {1} are not tied")]
    MissingTie(AgentId, AgentId),

    /// No agent satisfies the request (e.g. every agent is already infected).
    #[error("no eligible agent: {reason}")]
    NoEligibleAgent {
        /// Why no agent could be picked.
        reason: String,
    },
}
