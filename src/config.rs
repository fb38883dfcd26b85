use crate::agent::AssortAttr;
use crate::disease::DiseaseSpecs;
use crate::simulation::{RoundOrder, SimulationParams};
use crate::utility::UtilityFunction;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Simulation configuration.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Utility model shared by every agent.
    pub utility: UtilityFunction,
    pub disease: DiseaseSpecs,
    pub agents: AgentsConfig,
    pub init: InitConfig,
    pub simulation: SimulationConfig,
    pub output: OutputConfig,
}

/// Parameters of the agent population.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    /// Number of agents.
    pub n_agents: usize,
    /// Risk perception of disease severity.
    pub r_sigma: f64,
    /// Risk perception of infection probability.
    pub r_pi: f64,
    /// Probability of evaluating a new tie per activation.
    pub phi: f64,
    /// Probability of reviewing an existing tie per activation.
    pub psi: f64,
    /// Share of assortatively selected candidates.
    pub omega: f64,
    /// Inclusive range ages are drawn uniformly from.
    pub age_range: (u32, u32),
    /// Number of professions drawn uniformly.
    pub n_professions: u32,
}

/// Initial network topology.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    Empty,
    Full,
    /// Every pair tied independently with the given probability.
    Random(f64),
}

/// Initial condition.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct InitConfig {
    pub topology: Topology,
    /// Number of initially infected agents.
    pub n_infected: usize,
    /// Seed of the random number generator; drawn from the OS if absent.
    pub seed: Option<u64>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub order: RoundOrder,
    /// Consecutive stable rounds that end a run.
    pub stable_rounds: usize,
    #[serde(default)]
    pub assort_attr: AssortAttr,
}

impl SimulationConfig {
    pub fn params(&self) -> SimulationParams {
        SimulationParams {
            order: self.order,
            stable_rounds: self.stable_rounds,
            assort_attr: self.assort_attr,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Maximum number of rounds written per trajectory file.
    pub rounds_per_file: usize,
    /// Rounds between network snapshots in the trajectory.
    pub rounds_per_snapshot: usize,
}

impl Config {
    /// Load a [`Config`] from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents = fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;
        let config = Self::from_toml(&contents)?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("failed to deserialize config")?;
        config.validate().context("failed to validate config")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.utility.validate().context("invalid utility section")?;
        self.disease.validate().context("invalid disease section")?;

        let agents = &self.agents;
        check_num(agents.n_agents, 1..100_000).context("invalid number of agents")?;
        check_num(agents.r_sigma, 0.0..=2.0).context("invalid severity risk perception")?;
        check_num(agents.r_pi, 0.0..=2.0).context("invalid probability risk perception")?;
        check_num(agents.phi, 0.0..=1.0).context("invalid tie proposal probability")?;
        check_num(agents.psi, 0.0..=1.0).context("invalid tie review probability")?;
        check_num(agents.omega, 0.0..=1.0).context("invalid assortativity weight")?;
        check_num(agents.age_range.0, 0..=150).context("invalid minimum age")?;
        check_num(agents.age_range.1, agents.age_range.0..=150).context("invalid maximum age")?;
        check_num(agents.n_professions, 1..10_000).context("invalid number of professions")?;

        if let Topology::Random(prob) = self.init.topology {
            check_num(prob, 0.0..=1.0).context("invalid tie probability")?;
        }
        check_num(self.init.n_infected, 0..=agents.n_agents)
            .context("invalid number of infected agents")?;

        check_num(self.simulation.stable_rounds, 1..10_000)
            .context("invalid number of stable rounds")?;

        check_num(self.output.rounds_per_file, 1..10_000_000)
            .context("invalid number of rounds per file")?;
        check_num(self.output.rounds_per_snapshot, 1..10_000_000)
            .context("invalid number of rounds per snapshot")?;

        Ok(())
    }
}

pub fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utility::Cidm;

    const EXAMPLE: &str = r#"
[utility.cidm]
alpha = 1.0
kappa = 1.0
beta = 0.5
lamda = 1.0
c = 0.3

[disease]
tau = 10
s = 1.5
gamma = 0.1
mu = 1.5

[agents]
n_agents = 20
r_sigma = 1.0
r_pi = 1.0
phi = 0.5
psi = 0.5
omega = 0.0
age_range = [18, 80]
n_professions = 3

[init]
topology = { random = 0.1 }
n_infected = 1
seed = 12345

[simulation]
order = "ties_first"
stable_rounds = 3
assort_attr = "age"

[output]
rounds_per_file = 200
rounds_per_snapshot = 10
"#;

    #[test]
    fn parses_example() {
        let cfg = Config::from_toml(EXAMPLE).unwrap();
        assert_eq!(
            cfg.utility,
            UtilityFunction::Cidm(Cidm {
                alpha: 1.0,
                kappa: 1.0,
                beta: 0.5,
                lamda: 1.0,
                c: 0.3,
            })
        );
        assert_eq!(cfg.init.topology, Topology::Random(0.1));
        assert_eq!(cfg.init.seed, Some(12345));
        assert_eq!(cfg.simulation.params().order, RoundOrder::TiesFirst);
    }

    #[test]
    fn rejects_invalid_values() {
        let bad = EXAMPLE.replace("gamma = 0.1", "gamma = 1.1");
        assert!(Config::from_toml(&bad).is_err());
        let bad = EXAMPLE.replace("n_infected = 1", "n_infected = 21");
        assert!(Config::from_toml(&bad).is_err());
        let bad = EXAMPLE.replace("age_range = [18, 80]", "age_range = [80, 18]");
        assert!(Config::from_toml(&bad).is_err());
    }

    #[test]
    fn check_num_reports_range() {
        let err = check_num(5, 0..3).unwrap_err();
        assert_eq!(err.to_string(), "number must be in the range 0..3, but is 5");
    }
}
