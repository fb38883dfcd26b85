//! Agent arena and undirected tie relation.

use crate::agent::{Agent, AgentId, AgentParams, AssortAttr, ConnectionStats};
use crate::decision;
use crate::disease::{Disease, DiseaseGroup, DiseaseSpecs};
use crate::error::NetworkError;
use crate::stats;
use crate::utility::UtilityBreakdown;
use anyhow::{Context, Result, bail};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    sync::Arc,
};

/// Social network of agents.
///
/// Agents live in an arena keyed by [`AgentId`]; ties are stored as id sets
/// on both endpoints and are only ever changed through this type, so the
/// relation stays symmetric and free of self-loops.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(into = "NetworkSnapshot", try_from = "NetworkSnapshot")]
pub struct Network {
    agents: BTreeMap<AgentId, Agent>,
    next_id: usize,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an agent and return its fresh id.
    pub fn add_agent(
        &mut self,
        params: AgentParams,
        disease_specs: Arc<DiseaseSpecs>,
    ) -> Result<AgentId> {
        params.validate().context("invalid agent parameters")?;
        disease_specs.validate().context("invalid disease specs")?;
        let id = AgentId(self.next_id);
        self.next_id += 1;
        self.agents.insert(id, Agent::new(id, params, disease_specs));
        Ok(id)
    }

    /// Remove an agent after severing all of its ties.
    pub fn remove_agent(&mut self, id: AgentId) -> Result<Agent, NetworkError> {
        let partners: Vec<_> = self.get(id)?.ties().iter().copied().collect();
        for partner in partners {
            self.disconnect(id, partner)?;
        }
        self.agents.remove(&id).ok_or(NetworkError::UnknownAgent(id))
    }

    /// Remove every agent. Ids handed out before are not reused.
    pub fn clear(&mut self) {
        self.agents.clear();
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn contains(&self, id: AgentId) -> bool {
        self.agents.contains_key(&id)
    }

    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(&id)
    }

    /// Like [`Network::agent`], but failing with a typed error.
    pub fn get(&self, id: AgentId) -> Result<&Agent, NetworkError> {
        self.agents.get(&id).ok_or(NetworkError::UnknownAgent(id))
    }

    pub fn agent_mut(&mut self, id: AgentId) -> Result<&mut Agent, NetworkError> {
        self.agents.get_mut(&id).ok_or(NetworkError::UnknownAgent(id))
    }

    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    pub fn ids(&self) -> Vec<AgentId> {
        self.agents.keys().copied().collect()
    }

    /// Every tie once, as `(smaller id, larger id)`.
    pub fn ties(&self) -> impl Iterator<Item = (AgentId, AgentId)> + '_ {
        self.agents.values().flat_map(|agt| {
            let id = agt.id();
            agt.ties().range(id..).map(move |&other| (id, other))
        })
    }

    pub fn n_ties(&self) -> usize {
        self.agents.values().map(Agent::degree).sum::<usize>() / 2
    }

    pub fn is_connected(&self, a: AgentId, b: AgentId) -> bool {
        self.agents
            .get(&a)
            .is_some_and(|agt| agt.is_connected_to(b))
    }

    fn check_pair(&self, a: AgentId, b: AgentId) -> Result<(), NetworkError> {
        self.get(a)?;
        self.get(b)?;
        if a == b {
            return Err(NetworkError::SelfTie(a));
        }
        Ok(())
    }

    /// Tie two agents.
    pub fn connect(&mut self, a: AgentId, b: AgentId) -> Result<(), NetworkError> {
        self.check_pair(a, b)?;
        if self.is_connected(a, b) {
            return Err(NetworkError::DuplicateTie(a, b));
        }
        self.agent_mut(a)?.ties_mut().insert(b);
        self.agent_mut(b)?.ties_mut().insert(a);
        log::trace!("tie {a} - {b} created");
        Ok(())
    }

    /// Sever the tie between two agents.
    pub fn disconnect(&mut self, a: AgentId, b: AgentId) -> Result<(), NetworkError> {
        self.check_pair(a, b)?;
        if !self.is_connected(a, b) {
            return Err(NetworkError::MissingTie(a, b));
        }
        self.agent_mut(a)?.ties_mut().remove(&b);
        self.agent_mut(b)?.ties_mut().remove(&a);
        log::trace!("tie {a} - {b} severed");
        Ok(())
    }

    /// Tie every pair of agents.
    pub fn create_full_network(&mut self) {
        let ids = self.ids();
        for (i_a, &a) in ids.iter().enumerate() {
            for &b in &ids[i_a + 1..] {
                if let Some(agt) = self.agents.get_mut(&a) {
                    agt.ties_mut().insert(b);
                }
                if let Some(agt) = self.agents.get_mut(&b) {
                    agt.ties_mut().insert(a);
                }
            }
        }
    }

    /// Tie every pair of agents independently with probability `prob`.
    pub fn create_random_network<R: Rng + ?Sized>(&mut self, prob: f64, rng: &mut R) -> Result<()> {
        if !(0.0..=1.0).contains(&prob) {
            bail!("tie probability must be in [0, 1], but is {prob}");
        }
        let ids = self.ids();
        for (i_a, &a) in ids.iter().enumerate() {
            for &b in &ids[i_a + 1..] {
                if !self.is_connected(a, b) && rng.random_bool(prob) {
                    self.connect(a, b)?;
                }
            }
        }
        Ok(())
    }

    pub fn remove_all_ties(&mut self) {
        for agt in self.agents.values_mut() {
            agt.ties_mut().clear();
        }
    }

    /// Clear ties, disease states and counters, keeping agent parameters.
    pub fn reset_agents(&mut self) {
        for agt in self.agents.values_mut() {
            agt.reset();
        }
    }

    /// Infect an agent regardless of its current group.
    pub fn infect(&mut self, id: AgentId) -> Result<(), NetworkError> {
        let agt = self.agent_mut(id)?;
        let specs = agt.disease_specs().clone();
        agt.disease_mut().infect(&specs);
        Ok(())
    }

    pub fn cure(&mut self, id: AgentId) -> Result<(), NetworkError> {
        self.agent_mut(id)?.disease_mut().cure();
        Ok(())
    }

    pub fn make_susceptible(&mut self, id: AgentId) -> Result<(), NetworkError> {
        self.agent_mut(id)?.disease_mut().make_susceptible();
        Ok(())
    }

    /// Infect a uniformly chosen susceptible agent.
    pub fn infect_random_agent<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> Result<AgentId, NetworkError> {
        let susceptible: Vec<_> = self
            .agents()
            .filter(|agt| agt.is_susceptible())
            .map(Agent::id)
            .collect();
        let &id = susceptible
            .choose(rng)
            .ok_or_else(|| NetworkError::NoEligibleAgent {
                reason: "no susceptible agent left".to_string(),
            })?;
        self.infect(id)?;
        Ok(id)
    }

    pub(crate) fn stats_mut(&mut self, id: AgentId) -> Result<&mut ConnectionStats, NetworkError> {
        Ok(self.agent_mut(id)?.stats_mut())
    }

    pub(crate) fn disease_mut(&mut self, id: AgentId) -> Result<&mut Disease, NetworkError> {
        Ok(self.agent_mut(id)?.disease_mut())
    }

    /// Read-only view of the current network.
    pub fn view(&self) -> View<'_> {
        View {
            net: self,
            toggle: None,
        }
    }

    /// View of the network with the tie between `a` and `b` toggled.
    pub fn view_toggled(&self, a: AgentId, b: AgentId) -> View<'_> {
        View {
            net: self,
            toggle: Some(if a < b { (a, b) } else { (b, a) }),
        }
    }

    /// Utility of an agent in the current network.
    pub fn utility(&self, id: AgentId) -> Result<UtilityBreakdown, NetworkError> {
        let agt = self.get(id)?;
        Ok(agt.utility_function().evaluate(agt, &self.view()))
    }

    pub fn is_satisfied(&self, id: AgentId) -> Result<bool, NetworkError> {
        decision::is_satisfied(self, id)
    }

    /// Every agent is satisfied and the disease is extinct, so a further
    /// round changes neither ties nor disease groups.
    pub fn is_stable(&self) -> bool {
        self.count_group(DiseaseGroup::Infected) == 0
            && self
                .agents
                .keys()
                .all(|&id| decision::is_satisfied(self, id).unwrap_or(false))
    }

    pub fn count_group(&self, group: DiseaseGroup) -> usize {
        self.agents()
            .filter(|agt| agt.disease_group() == group)
            .count()
    }

    pub fn avg_degree(&self) -> f64 {
        stats::avg_degree(self)
    }

    pub fn avg_clustering(&self) -> f64 {
        stats::avg_clustering(self)
    }

    pub fn avg_closeness(&self) -> f64 {
        stats::avg_closeness(self)
    }

    pub fn assortativity(&self, attr: AssortAttr) -> Option<f64> {
        stats::assortativity(self, attr)
    }

    pub fn density(&self) -> f64 {
        stats::density(self)
    }

    pub fn diameter(&self) -> usize {
        stats::diameter(self)
    }

    pub fn avg_path_length(&self) -> f64 {
        stats::avg_path_length(self)
    }

    pub fn snapshot(&self) -> NetworkSnapshot {
        self.clone().into()
    }

    pub fn from_snapshot(snapshot: NetworkSnapshot) -> Result<Self> {
        Self::try_from(snapshot)
    }
}

/// Read-only perspective on a network, optionally with one tie toggled.
#[derive(Clone, Copy)]
pub struct View<'a> {
    net: &'a Network,
    toggle: Option<(AgentId, AgentId)>,
}

impl<'a> View<'a> {
    pub fn network(&self) -> &'a Network {
        self.net
    }

    pub fn agent(&self, id: AgentId) -> Option<&'a Agent> {
        self.net.agent(id)
    }

    pub fn has_tie(&self, a: AgentId, b: AgentId) -> bool {
        let base = self.net.is_connected(a, b);
        match self.toggle {
            Some(pair) if pair == (a, b) || pair == (b, a) => !base,
            _ => base,
        }
    }

    pub fn neighbors(&self, id: AgentId) -> BTreeSet<AgentId> {
        let mut ties = self
            .net
            .agent(id)
            .map(|agt| agt.ties().clone())
            .unwrap_or_default();
        if let Some((a, b)) = self.toggle {
            let other = if id == a {
                Some(b)
            } else if id == b {
                Some(a)
            } else {
                None
            };
            if let Some(other) = other {
                if !ties.remove(&other) {
                    ties.insert(other);
                }
            }
        }
        ties
    }

    pub fn degree(&self, id: AgentId) -> usize {
        self.neighbors(id).len()
    }

    /// Agents at distance exactly two.
    pub fn second_order(&self, id: AgentId) -> BTreeSet<AgentId> {
        let direct = self.neighbors(id);
        direct
            .iter()
            .flat_map(|&j| self.neighbors(j))
            .filter(|k| *k != id && !direct.contains(k))
            .collect()
    }

    /// Geodesic distances from `id` to every reachable agent, optionally
    /// only up to `cutoff`. The source itself is not included.
    pub fn distances(&self, id: AgentId, cutoff: Option<usize>) -> BTreeMap<AgentId, usize> {
        let mut dist = BTreeMap::new();
        let mut queue = VecDeque::from([(id, 0)]);
        let mut seen = BTreeSet::from([id]);
        while let Some((cur, d)) = queue.pop_front() {
            if cutoff.is_some_and(|max| d >= max) {
                continue;
            }
            for next in self.neighbors(cur) {
                if seen.insert(next) {
                    dist.insert(next, d + 1);
                    queue.push_back((next, d + 1));
                }
            }
        }
        dist
    }
}

/// Serializable form of a [`Network`].
///
/// Disease specs are stored once and referenced by index, so agents sharing
/// a specs bundle share it again after decoding.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub next_id: usize,
    pub disease_specs: Vec<DiseaseSpecs>,
    pub agents: Vec<AgentSnapshot>,
    pub ties: Vec<(AgentId, AgentId)>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub params: AgentParams,
    pub i_specs: usize,
    pub disease: Disease,
    pub stats: ConnectionStats,
}

impl From<Network> for NetworkSnapshot {
    fn from(net: Network) -> Self {
        let mut disease_specs: Vec<DiseaseSpecs> = Vec::new();
        let mut agents = Vec::with_capacity(net.len());
        for agt in net.agents() {
            let specs = agt.disease_specs().as_ref();
            let i_specs = match disease_specs.iter().position(|s| s == specs) {
                Some(i_specs) => i_specs,
                None => {
                    disease_specs.push(specs.clone());
                    disease_specs.len() - 1
                }
            };
            agents.push(AgentSnapshot {
                id: agt.id(),
                params: agt.params().clone(),
                i_specs,
                disease: agt.disease().clone(),
                stats: agt.stats().clone(),
            });
        }
        Self {
            next_id: net.next_id,
            disease_specs,
            agents,
            ties: net.ties().collect(),
        }
    }
}

impl TryFrom<NetworkSnapshot> for Network {
    type Error = anyhow::Error;

    fn try_from(snapshot: NetworkSnapshot) -> Result<Self> {
        for (i_specs, specs) in snapshot.disease_specs.iter().enumerate() {
            specs
                .validate()
                .with_context(|| format!("invalid disease specs {i_specs}"))?;
        }
        let specs: Vec<_> = snapshot.disease_specs.into_iter().map(Arc::new).collect();
        let mut net = Network::new();
        for rec in snapshot.agents {
            if rec.id.0 >= snapshot.next_id {
                bail!("agent id {} is not below the next id {}", rec.id, snapshot.next_id);
            }
            if net.contains(rec.id) {
                bail!("agent id {} appears twice", rec.id);
            }
            rec.params
                .validate()
                .with_context(|| format!("invalid parameters of agent {}", rec.id))?;
            let agt_specs = specs
                .get(rec.i_specs)
                .with_context(|| format!("missing disease specs of agent {}", rec.id))?;
            let mut agt = Agent::new(rec.id, rec.params, agt_specs.clone());
            *agt.disease_mut() = rec.disease;
            *agt.stats_mut() = rec.stats;
            net.agents.insert(rec.id, agt);
        }
        net.next_id = snapshot.next_id;
        for (a, b) in snapshot.ties {
            net.connect(a, b).context("invalid tie")?;
        }
        Ok(net)
    }
}
