//! Round-based coordinator of tie formation and disease spread.
//!
//! Every round each agent acts once, in an order shuffled with the
//! simulation's own random number generator, and the disease advances once.
//! Whether ties or disease go first is set by [`RoundOrder`].
//!
//! Progress is reported as [`Event`]s to registered [`Listener`]s, which run
//! synchronously on the simulation thread. A failing listener aborts the
//! run and its error is returned to the caller.

use crate::agent::{AgentId, AssortAttr};
use crate::decision::{self, Action};
use crate::disease::{DiseaseGroup, DiseaseSpecs};
use crate::network::Network;
use anyhow::{Context, Result, bail};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rand_distr::Bernoulli;
use serde::{Deserialize, Serialize};
use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
    mpsc::Sender,
};

/// Order of the two phases of a round.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundOrder {
    /// Agents act, then the disease spreads over the updated ties.
    #[default]
    TiesFirst,
    /// The disease spreads, then agents react to the new disease states.
    DiseaseFirst,
}

/// Coordinator settings.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct SimulationParams {
    pub order: RoundOrder,
    /// Consecutive stable rounds needed to end a run early.
    pub stable_rounds: usize,
    /// Attribute assortative agents select candidates by.
    pub assort_attr: AssortAttr,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            order: RoundOrder::TiesFirst,
            stable_rounds: 1,
            assort_attr: AssortAttr::Age,
        }
    }
}

/// What happened in one round.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct RoundSummary {
    pub round: usize,
    pub n_formed: usize,
    pub n_broken: usize,
    pub n_declined: usize,
    pub n_new_infections: usize,
    pub n_recoveries: usize,
    pub n_susceptible: usize,
    pub n_infected: usize,
    pub n_recovered: usize,
    pub n_ties: usize,
    pub avg_degree: f64,
    pub avg_clustering: f64,
    /// The infected count dropped to zero in this round.
    pub infection_defeated: bool,
    pub stable: bool,
}

/// How a run ended.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum Outcome {
    /// The network was stable for the required number of rounds.
    Stable { round: usize },
    /// The round cap was reached without stability.
    RoundCap { round: usize },
    /// A fixed number of rounds was run.
    Completed { round: usize },
    Paused { round: usize },
    Stopped { round: usize },
}

impl Outcome {
    pub fn round(&self) -> usize {
        match *self {
            Self::Stable { round }
            | Self::RoundCap { round }
            | Self::Completed { round }
            | Self::Paused { round }
            | Self::Stopped { round } => round,
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Event {
    SimulationStarted { round: usize },
    RoundFinished(RoundSummary),
    InfectionDefeated { round: usize },
    SimulationFinished(Outcome),
}

/// Observer of a running simulation.
pub trait Listener: Send {
    fn notify(&mut self, event: &Event, net: &Network) -> Result<()>;
}

/// Forwards every event over a channel, e.g. to a user interface thread.
pub struct ChannelListener {
    sender: Sender<Event>,
}

impl ChannelListener {
    pub fn new(sender: Sender<Event>) -> Self {
        Self { sender }
    }
}

impl Listener for ChannelListener {
    fn notify(&mut self, event: &Event, _net: &Network) -> Result<()> {
        self.sender
            .send(event.clone())
            .context("event receiver disconnected")
    }
}

const SIGNAL_NONE: u8 = 0;
const SIGNAL_PAUSE: u8 = 1;
const SIGNAL_STOP: u8 = 2;

/// Cloneable handle to pause or stop a run from another thread.
///
/// Requests are honoured at the next round boundary and consumed by the run
/// that honours them.
#[derive(Debug, Default, Clone)]
pub struct Control {
    signal: Arc<AtomicU8>,
}

impl Control {
    pub fn pause(&self) {
        self.signal.fetch_max(SIGNAL_PAUSE, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.signal.fetch_max(SIGNAL_STOP, Ordering::SeqCst);
    }

    fn take(&self) -> u8 {
        self.signal.swap(SIGNAL_NONE, Ordering::SeqCst)
    }
}

/// Simulation coordinator.
#[derive(Serialize, Deserialize)]
pub struct Simulation {
    params: SimulationParams,
    network: Network,
    rng: ChaCha12Rng,
    round: usize,
    #[serde(skip)]
    listeners: Vec<Box<dyn Listener>>,
    #[serde(skip)]
    control: Control,
}

impl Simulation {
    /// Create a coordinator seeded with `seed`, or from the OS if `None`.
    pub fn new(network: Network, params: SimulationParams, seed: Option<u64>) -> Result<Self> {
        let rng = match seed {
            Some(seed) => ChaCha12Rng::seed_from_u64(seed),
            None => ChaCha12Rng::try_from_os_rng()?,
        };
        Self::from_rng(network, params, rng)
    }

    pub fn from_rng(network: Network, params: SimulationParams, rng: ChaCha12Rng) -> Result<Self> {
        if params.stable_rounds == 0 {
            bail!("number of stable rounds must be at least 1");
        }
        Ok(Self {
            params,
            network,
            rng,
            round: 0,
            listeners: Vec::new(),
            control: Control::default(),
        })
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    pub fn rng_mut(&mut self) -> &mut ChaCha12Rng {
        &mut self.rng
    }

    /// Number of rounds run so far.
    pub fn round(&self) -> usize {
        self.round
    }

    /// Reset the round counter, e.g. after clearing the network.
    pub fn rewind(&mut self) {
        self.round = 0;
    }

    pub fn control(&self) -> Control {
        self.control.clone()
    }

    pub fn pause(&self) {
        self.control.pause();
    }

    pub fn stop(&self) {
        self.control.stop();
    }

    pub fn add_listener(&mut self, listener: Box<dyn Listener>) {
        self.listeners.push(listener);
    }

    pub fn clear_listeners(&mut self) {
        self.listeners.clear();
    }

    /// Infect a random susceptible agent using the simulation's generator.
    pub fn infect_random_agent(&mut self) -> Result<AgentId> {
        Ok(self.network.infect_random_agent(&mut self.rng)?)
    }

    /// Run exactly `n_rounds` rounds unless paused or stopped.
    pub fn simulate(&mut self, n_rounds: usize) -> Result<Outcome> {
        self.run(n_rounds, false)
    }

    /// Run until the network is stable or `max_rounds` rounds have passed.
    pub fn simulate_until_stable(&mut self, max_rounds: usize) -> Result<Outcome> {
        self.run(max_rounds, true)
    }

    fn emit(&mut self, event: Event) -> Result<()> {
        for listener in &mut self.listeners {
            listener
                .notify(&event, &self.network)
                .context("listener failed")?;
        }
        Ok(())
    }

    fn run(&mut self, n_rounds: usize, until_stable: bool) -> Result<Outcome> {
        log::info!("starting simulation at round {}", self.round);
        self.emit(Event::SimulationStarted { round: self.round })?;

        let mut stable_streak = 0;
        let mut outcome = None;
        for _ in 0..n_rounds {
            match self.control.take() {
                SIGNAL_PAUSE => {
                    outcome = Some(Outcome::Paused { round: self.round });
                    break;
                }
                SIGNAL_STOP => {
                    outcome = Some(Outcome::Stopped { round: self.round });
                    break;
                }
                _ => {}
            }

            let summary = self.play_round().context("failed to play round")?;
            let round = summary.round;
            let defeated = summary.infection_defeated;
            let stable = summary.stable;
            self.emit(Event::RoundFinished(summary))?;
            if defeated {
                log::info!("infection defeated at round {round}");
                self.emit(Event::InfectionDefeated { round })?;
            }

            if until_stable {
                stable_streak = if stable { stable_streak + 1 } else { 0 };
                if stable_streak >= self.params.stable_rounds {
                    outcome = Some(Outcome::Stable { round });
                    break;
                }
            }
        }

        let outcome = outcome.unwrap_or(if until_stable {
            Outcome::RoundCap { round: self.round }
        } else {
            Outcome::Completed { round: self.round }
        });
        log::info!("simulation finished: {outcome:?}");
        self.emit(Event::SimulationFinished(outcome))?;
        Ok(outcome)
    }

    /// Play a single round without notifying listeners.
    pub fn play_round(&mut self) -> Result<RoundSummary> {
        let infected_before = self.network.count_group(DiseaseGroup::Infected);
        self.round += 1;

        let mut summary = RoundSummary {
            round: self.round,
            ..Default::default()
        };
        match self.params.order {
            RoundOrder::TiesFirst => {
                self.ties_step(&mut summary)?;
                self.disease_step(&mut summary)?;
            }
            RoundOrder::DiseaseFirst => {
                self.disease_step(&mut summary)?;
                self.ties_step(&mut summary)?;
            }
        }

        let net = &self.network;
        summary.n_susceptible = net.count_group(DiseaseGroup::Susceptible);
        summary.n_infected = net.count_group(DiseaseGroup::Infected);
        summary.n_recovered = net.count_group(DiseaseGroup::Recovered);
        summary.n_ties = net.n_ties();
        summary.avg_degree = net.avg_degree();
        summary.avg_clustering = net.avg_clustering();
        summary.infection_defeated = infected_before > 0 && summary.n_infected == 0;
        summary.stable = net.is_stable();

        log::debug!("{summary:?}");
        Ok(summary)
    }

    fn ties_step(&mut self, summary: &mut RoundSummary) -> Result<()> {
        let mut ids = self.network.ids();
        ids.shuffle(&mut self.rng);
        for id in ids {
            let action = decision::act(&mut self.network, id, self.params.assort_attr, &mut self.rng)
                .with_context(|| format!("failed to activate agent {id}"))?;
            match action {
                Action::Idle => {}
                Action::Broke(_) => summary.n_broken += 1,
                Action::Formed(_) => summary.n_formed += 1,
                Action::Declined(_) => summary.n_declined += 1,
            }
        }
        Ok(())
    }

    fn disease_step(&mut self, summary: &mut RoundSummary) -> Result<()> {
        // infectious agents at the start of the step
        let infectious: Vec<_> = self
            .network
            .agents()
            .filter(|agt| agt.is_infected())
            .map(|agt| agt.id())
            .collect();

        let mut infections: Vec<(AgentId, Arc<DiseaseSpecs>)> = Vec::new();
        for agt in self.network.agents().filter(|agt| agt.is_susceptible()) {
            for &nbr_id in agt.ties() {
                let Some(nbr) = self.network.agent(nbr_id) else {
                    continue;
                };
                if !nbr.is_infected() {
                    continue;
                }
                let specs = nbr.disease_specs();
                if Bernoulli::new(specs.gamma)?.sample(&mut self.rng) {
                    infections.push((agt.id(), specs.clone()));
                    break;
                }
            }
        }

        for id in infectious {
            if self.network.disease_mut(id)?.advance() {
                summary.n_recoveries += 1;
            }
        }
        for (id, specs) in infections {
            self.network.disease_mut(id)?.infect(&specs);
            summary.n_new_infections += 1;
        }
        Ok(())
    }
}
