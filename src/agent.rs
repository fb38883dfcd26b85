use crate::config::check_num;
use crate::disease::{Disease, DiseaseGroup, DiseaseSpecs};
use crate::utility::UtilityFunction;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, sync::Arc};

/// Stable handle of an agent inside a [`Network`](crate::network::Network).
///
/// Ids are assigned in creation order and never reused, not even after the
/// agent is removed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct AgentId(pub usize);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Attribute used to select assortative tie candidates and to measure
/// assortativity.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssortAttr {
    #[default]
    Age,
    Profession,
    RiskPerception,
}

/// Width of the age bands used when matching candidates by age.
const AGE_BAND: u32 = 10;

/// Attitude towards risk derived from a risk perception factor.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum RiskAttitude {
    Seeking,
    Neutral,
    Averse,
}

impl RiskAttitude {
    pub fn from_factor(r: f64) -> Self {
        if r < 1.0 {
            Self::Seeking
        } else if r > 1.0 {
            Self::Averse
        } else {
            Self::Neutral
        }
    }
}

/// Parameters an agent is created with.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct AgentParams {
    /// Utility model the agent evaluates its position with.
    pub utility: UtilityFunction,
    /// Risk perception of disease severity.
    pub r_sigma: f64,
    /// Risk perception of infection probability.
    pub r_pi: f64,
    /// Probability of evaluating a new tie per activation.
    pub phi: f64,
    /// Probability of reviewing an existing tie per activation.
    pub psi: f64,
    /// Share of candidates drawn from agents with the same attribute.
    pub omega: f64,
    pub age: u32,
    pub profession: u32,
}

impl AgentParams {
    /// Parameters of a risk neutral agent that reviews and proposes ties on
    /// every activation.
    pub fn new(utility: UtilityFunction) -> Self {
        Self {
            utility,
            r_sigma: 1.0,
            r_pi: 1.0,
            phi: 1.0,
            psi: 1.0,
            omega: 0.0,
            age: 30,
            profession: 0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.utility.validate().context("invalid utility function")?;
        check_num(self.r_sigma, 0.0..=2.0).context("invalid severity risk perception")?;
        check_num(self.r_pi, 0.0..=2.0).context("invalid probability risk perception")?;
        check_num(self.phi, 0.0..=1.0).context("invalid tie proposal probability")?;
        check_num(self.psi, 0.0..=1.0).context("invalid tie review probability")?;
        check_num(self.omega, 0.0..=1.0).context("invalid assortativity weight")?;
        check_num(self.age, 0..=150).context("invalid age")?;
        Ok(())
    }
}

/// Outcome counters of tie requests and tie breaks.
///
/// Counters only grow; they are cleared by
/// [`Network::reset_agents`](crate::network::Network::reset_agents).
#[derive(Debug, Default, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct ConnectionStats {
    pub accepted_in: u32,
    pub accepted_out: u32,
    pub declined_in: u32,
    pub declined_out: u32,
    pub broken_active: u32,
    pub broken_passive: u32,
}

/// Agent of the simulation.
///
/// The tie set is owned here but only the network mutates it, which keeps
/// both endpoints of every tie in sync.
#[derive(Debug, Clone)]
pub struct Agent {
    id: AgentId,
    params: AgentParams,
    disease_specs: Arc<DiseaseSpecs>,
    disease: Disease,
    ties: BTreeSet<AgentId>,
    stats: ConnectionStats,
}

impl Agent {
    pub(crate) fn new(id: AgentId, params: AgentParams, disease_specs: Arc<DiseaseSpecs>) -> Self {
        Self {
            id,
            params,
            disease_specs,
            disease: Disease::default(),
            ties: BTreeSet::new(),
            stats: ConnectionStats::default(),
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn params(&self) -> &AgentParams {
        &self.params
    }

    pub fn utility_function(&self) -> &UtilityFunction {
        &self.params.utility
    }

    /// Replace the agent's utility function, e.g. to give it a different
    /// marginal cost.
    pub fn set_utility_function(&mut self, utility: UtilityFunction) -> Result<()> {
        utility.validate()?;
        self.params.utility = utility;
        Ok(())
    }

    pub fn disease_specs(&self) -> &Arc<DiseaseSpecs> {
        &self.disease_specs
    }

    pub fn disease(&self) -> &Disease {
        &self.disease
    }

    pub fn disease_group(&self) -> DiseaseGroup {
        self.disease.group()
    }

    pub fn is_susceptible(&self) -> bool {
        self.disease.is_susceptible()
    }

    pub fn is_infected(&self) -> bool {
        self.disease.is_infected()
    }

    pub fn is_recovered(&self) -> bool {
        self.disease.is_recovered()
    }

    pub fn ties(&self) -> &BTreeSet<AgentId> {
        &self.ties
    }

    pub fn degree(&self) -> usize {
        self.ties.len()
    }

    pub fn is_connected_to(&self, other: AgentId) -> bool {
        self.ties.contains(&other)
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    pub fn risk_attitude(&self) -> RiskAttitude {
        RiskAttitude::from_factor(self.params.r_sigma)
    }

    /// Scalar value of an attribute, used by assortativity measures.
    pub fn attr_value(&self, attr: AssortAttr) -> f64 {
        match attr {
            AssortAttr::Age => self.params.age as f64,
            AssortAttr::Profession => self.params.profession as f64,
            AssortAttr::RiskPerception => self.params.r_sigma,
        }
    }

    /// Whether both agents fall in the same category of an attribute.
    pub fn shares_attr(&self, other: &Agent, attr: AssortAttr) -> bool {
        match attr {
            AssortAttr::Age => self.params.age / AGE_BAND == other.params.age / AGE_BAND,
            AssortAttr::Profession => self.params.profession == other.params.profession,
            AssortAttr::RiskPerception => self.risk_attitude() == other.risk_attitude(),
        }
    }

    pub(crate) fn ties_mut(&mut self) -> &mut BTreeSet<AgentId> {
        &mut self.ties
    }

    pub(crate) fn disease_mut(&mut self) -> &mut Disease {
        &mut self.disease
    }

    pub(crate) fn stats_mut(&mut self) -> &mut ConnectionStats {
        &mut self.stats
    }

    /// Clear ties, disease and counters but keep the parameters.
    pub(crate) fn reset(&mut self) {
        self.ties.clear();
        self.disease = Disease::default();
        self.stats = ConnectionStats::default();
    }
}
