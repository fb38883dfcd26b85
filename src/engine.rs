use crate::agent::AgentParams;
use crate::config::{Config, Topology};
use crate::network::Network;
use crate::simulation::{Event, Listener, Outcome, Simulation};
use crate::types::Record;
use anyhow::{Context, Result};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rand_distr::Uniform;
use rmp_serde::{decode, encode};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
    sync::Arc,
};

/// Simulation engine.
///
/// Holds the configuration and the simulation coordinator (network and
/// random number generator included), and provides methods to initialize,
/// run, save, and load simulations.
#[derive(Serialize, Deserialize)]
pub struct Engine {
    cfg: Config,
    sim: Simulation,
}

impl Engine {
    /// Create a new `Engine` with the given configuration and a random initial condition.
    pub fn generate_initial_condition(cfg: Config) -> Result<Self> {
        let mut rng = match cfg.init.seed {
            Some(seed) => ChaCha12Rng::seed_from_u64(seed),
            None => ChaCha12Rng::try_from_os_rng()?,
        };

        let specs = Arc::new(cfg.disease.clone());
        let agents = &cfg.agents;
        let age_dist = Uniform::new_inclusive(agents.age_range.0, agents.age_range.1)?;
        let prof_dist = Uniform::new(0, agents.n_professions)?;

        let mut network = Network::new();
        for _ in 0..agents.n_agents {
            let params = AgentParams {
                utility: cfg.utility.clone(),
                r_sigma: agents.r_sigma,
                r_pi: agents.r_pi,
                phi: agents.phi,
                psi: agents.psi,
                omega: agents.omega,
                age: age_dist.sample(&mut rng),
                profession: prof_dist.sample(&mut rng),
            };
            network
                .add_agent(params, specs.clone())
                .context("failed to add agent")?;
        }

        match cfg.init.topology {
            Topology::Empty => {}
            Topology::Full => network.create_full_network(),
            Topology::Random(prob) => network
                .create_random_network(prob, &mut rng)
                .context("failed to create random network")?,
        }

        for _ in 0..cfg.init.n_infected {
            network
                .infect_random_agent(&mut rng)
                .context("failed to infect initial agent")?;
        }
        log::info!(
            "generated {} agents with {} ties",
            network.len(),
            network.n_ties()
        );

        let sim = Simulation::from_rng(network, cfg.simulation.params(), rng)?;
        Ok(Self { cfg, sim })
    }

    pub fn cfg(&self) -> &Config {
        &self.cfg
    }

    pub fn sim(&self) -> &Simulation {
        &self.sim
    }

    /// Run the simulation until stable or for at most `rounds_per_file`
    /// rounds and save the round records to a binary file.
    pub fn perform_simulation<P: AsRef<Path>>(&mut self, file: P) -> Result<Outcome> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let writer = RecordWriter {
            writer: BufWriter::new(file),
            rounds_per_snapshot: self.cfg.output.rounds_per_snapshot,
            rounds_per_file: self.cfg.output.rounds_per_file,
            n_written: 0,
        };

        self.sim.add_listener(Box::new(writer));
        let result = self
            .sim
            .simulate_until_stable(self.cfg.output.rounds_per_file);
        self.sim.clear_listeners();

        result.context("failed to simulate")
    }

    /// Save a checkpoint of the entire engine state.
    ///
    /// Can be used to resume the simulation later.
    pub fn save_checkpoint<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write(&mut writer, &self).context("failed to serialize engine")?;
        writer.flush().context("failed to flush writer stream")?;
        Ok(())
    }

    /// Load a previously saved engine checkpoint.
    pub fn load_checkpoint<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);
        let engine = decode::from_read(&mut reader).context("failed to deserialize engine")?;
        Ok(engine)
    }
}

/// Listener writing one [`Record`] per round.
struct RecordWriter {
    writer: BufWriter<File>,
    rounds_per_snapshot: usize,
    rounds_per_file: usize,
    n_written: usize,
}

impl Listener for RecordWriter {
    fn notify(&mut self, event: &Event, net: &Network) -> Result<()> {
        match event {
            Event::RoundFinished(summary) => {
                let snapshot = (summary.round % self.rounds_per_snapshot == 0
                    || summary.stable)
                    .then(|| net.snapshot());
                let record = Record {
                    summary: summary.clone(),
                    snapshot,
                };
                encode::write(&mut self.writer, &record).context("failed to serialize record")?;
                self.n_written += 1;

                if self.n_written % (self.rounds_per_file / 10).max(1) == 0 {
                    let progress = 100.0 * self.n_written as f64 / self.rounds_per_file as f64;
                    log::info!("completed {progress:06.2}%");
                }
            }
            Event::SimulationFinished(_) => {
                self.writer
                    .flush()
                    .context("failed to flush writer stream")?;
            }
            _ => {}
        }
        Ok(())
    }
}
