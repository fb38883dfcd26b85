//! Co-evolution of social networks and SIR epidemics.
//!
//! Agents form and sever ties by best response to a utility model while a
//! disease spreads over the ties. The [`Simulation`] coordinator drives both
//! processes round by round over a [`Network`] until it is stable.

pub mod agent;
pub mod analysis;
pub mod config;
pub mod decision;
pub mod disease;
pub mod engine;
pub mod error;
pub mod manager;
pub mod network;
pub mod simulation;
pub mod stats;
pub mod types;
pub mod utility;

pub use agent::{Agent, AgentId, AgentParams, AssortAttr};
pub use disease::{DiseaseGroup, DiseaseSpecs};
pub use error::NetworkError;
pub use network::Network;
pub use simulation::{Event, Listener, Outcome, RoundOrder, Simulation, SimulationParams};
pub use utility::{UtilityBreakdown, UtilityFunction};
