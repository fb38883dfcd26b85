//! SIR disease parameters and the per-agent disease state machine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::check_num;

/// Compartmental model of a disease. Only SIR is modelled.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiseaseType {
    #[default]
    Sir,
}

/// Immutable disease parameters shared by every agent exposed to the disease.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct DiseaseSpecs {
    /// Compartmental model.
    #[serde(default)]
    pub kind: DiseaseType,
    /// Rounds an infected agent needs to recover.
    pub tau: u32,
    /// Severity of the disease.
    pub s: f64,
    /// Transmission probability per infectious tie and round.
    pub gamma: f64,
    /// Care factor: cost multiplier for ties to infected agents.
    pub mu: f64,
}

impl DiseaseSpecs {
    /// Build a validated SIR parameter bundle.
    pub fn new(tau: u32, s: f64, gamma: f64, mu: f64) -> Result<Self> {
        let specs = Self {
            kind: DiseaseType::Sir,
            tau,
            s,
            gamma,
            mu,
        };
        specs.validate()?;
        Ok(specs)
    }

    /// Check every parameter against its valid domain.
    pub fn validate(&self) -> Result<()> {
        check_num(self.tau, 1..=100_000).context("invalid recovery time")?;
        check_num(self.s, 0.0..=1e6).context("invalid severity")?;
        check_num(self.gamma, 0.0..=1.0).context("invalid transmission probability")?;
        check_num(self.mu, 0.0..=1e6).context("invalid care factor")?;
        Ok(())
    }

    /// Probability of being infected within one round when `n_inf` direct
    /// ties are infectious.
    pub fn prob_infection(&self, n_inf: usize) -> f64 {
        1.0 - (1.0 - self.gamma).powi(n_inf as i32)
    }
}

/// Compartment an agent belongs to.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
pub enum DiseaseGroup {
    #[default]
    Susceptible,
    Infected,
    Recovered,
}

/// Course of an agent's infection: infectious while infected, defeated once
/// recovered.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum DiseaseState {
    Infectious,
    Defeated,
}

/// Disease bookkeeping of a single agent.
#[derive(Debug, Default, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Disease {
    group: DiseaseGroup,
    time_until_recovered: u32,
}

impl Disease {
    pub fn group(&self) -> DiseaseGroup {
        self.group
    }

    /// Remaining rounds until recovery; zero unless infected.
    pub fn time_until_recovered(&self) -> u32 {
        self.time_until_recovered
    }

    /// `None` while the agent has never been infected (or was made
    /// susceptible again).
    pub fn state(&self) -> Option<DiseaseState> {
        match self.group {
            DiseaseGroup::Susceptible => None,
            DiseaseGroup::Infected => Some(DiseaseState::Infectious),
            DiseaseGroup::Recovered => Some(DiseaseState::Defeated),
        }
    }

    pub fn is_susceptible(&self) -> bool {
        self.group == DiseaseGroup::Susceptible
    }

    pub fn is_infected(&self) -> bool {
        self.group == DiseaseGroup::Infected
    }

    pub fn is_recovered(&self) -> bool {
        self.group == DiseaseGroup::Recovered
    }

    /// Move into the infected group with a full countdown.
    pub fn infect(&mut self, specs: &DiseaseSpecs) {
        self.group = DiseaseGroup::Infected;
        self.time_until_recovered = specs.tau;
    }

    /// Move into the recovered group.
    pub fn cure(&mut self) {
        self.group = DiseaseGroup::Recovered;
        self.time_until_recovered = 0;
    }

    /// Move back into the susceptible group.
    pub fn make_susceptible(&mut self) {
        self.group = DiseaseGroup::Susceptible;
        self.time_until_recovered = 0;
    }

    /// Advance the countdown by one round. Returns `true` if the agent
    /// recovered in this round.
    pub fn advance(&mut self) -> bool {
        if !self.is_infected() {
            return false;
        }
        self.time_until_recovered = self.time_until_recovered.saturating_sub(1);
        if self.time_until_recovered == 0 {
            self.cure();
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn countdown_recovers_after_tau_rounds() {
        let specs = DiseaseSpecs::new(3, 1.0, 0.5, 1.0).unwrap();
        let mut disease = Disease::default();
        disease.infect(&specs);
        assert_eq!(disease.state(), Some(DiseaseState::Infectious));

        assert!(!disease.advance());
        assert_eq!(disease.time_until_recovered(), 2);
        assert!(!disease.advance());
        assert_eq!(disease.time_until_recovered(), 1);
        assert!(disease.advance());
        assert!(disease.is_recovered());
        assert_eq!(disease.state(), Some(DiseaseState::Defeated));

        // recovered is terminal for the countdown
        assert!(!disease.advance());
        assert!(disease.is_recovered());

        disease.make_susceptible();
        assert_eq!(disease.state(), None);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(DiseaseSpecs::new(0, 1.0, 0.5, 1.0).is_err());
        assert!(DiseaseSpecs::new(5, -1.0, 0.5, 1.0).is_err());
        assert!(DiseaseSpecs::new(5, 1.0, 1.5, 1.0).is_err());
        assert!(DiseaseSpecs::new(5, 1.0, 0.5, f64::NAN).is_err());
    }

    #[test]
    fn infection_probability_compounds_over_ties() {
        let specs = DiseaseSpecs::new(5, 1.0, 0.5, 1.0).unwrap();
        assert_eq!(specs.prob_infection(0), 0.0);
        assert!((specs.prob_infection(2) - 0.75).abs() < 1e-12);
    }
}
