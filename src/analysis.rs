use crate::agent::AssortAttr;
use crate::config::Config;
use crate::network::Network;
use crate::stats::{Accumulator, TimeSeries};
use crate::types::Record;
use anyhow::{Context, Result};
use rmp_serde::decode;
use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter},
    path::Path,
};

pub trait Obs {
    fn update(&mut self, rec: &Record) -> Result<()>;
    fn report(&self) -> serde_json::Value;
}

/// Per-round series of one summary field.
pub struct SummarySeries {
    name: &'static str,
    extract: fn(&Record) -> f64,
    time_series: TimeSeries,
}

impl SummarySeries {
    pub fn new(name: &'static str, extract: fn(&Record) -> f64) -> Self {
        Self {
            name,
            extract,
            time_series: TimeSeries::new(),
        }
    }
}

impl Obs for SummarySeries {
    fn update(&mut self, rec: &Record) -> Result<()> {
        self.time_series.push((self.extract)(rec));
        Ok(())
    }

    fn report(&self) -> serde_json::Value {
        let report = self.time_series.report();
        serde_json::json!({ self.name: report })
    }
}

/// Share of agents that have been infected at the end of the trajectory.
pub struct EpidemicSize {
    last: Option<f64>,
    peak_infected: usize,
}

impl EpidemicSize {
    pub fn new() -> Self {
        Self {
            last: None,
            peak_infected: 0,
        }
    }
}

impl Obs for EpidemicSize {
    fn update(&mut self, rec: &Record) -> Result<()> {
        let s = &rec.summary;
        let n_agents = s.n_susceptible + s.n_infected + s.n_recovered;
        if n_agents > 0 {
            self.last = Some((s.n_infected + s.n_recovered) as f64 / n_agents as f64);
        }
        self.peak_infected = self.peak_infected.max(s.n_infected);
        Ok(())
    }

    fn report(&self) -> serde_json::Value {
        serde_json::json!({
            "epidemic_size": self.last,
            "peak_infected": self.peak_infected,
        })
    }
}

/// Rounds at which the infection was defeated and the network first became
/// stable.
pub struct Milestones {
    n_rounds: usize,
    defeated_round: Option<usize>,
    stable_round: Option<usize>,
    churn: Accumulator,
}

impl Milestones {
    pub fn new() -> Self {
        Self {
            n_rounds: 0,
            defeated_round: None,
            stable_round: None,
            churn: Accumulator::new(),
        }
    }
}

impl Obs for Milestones {
    fn update(&mut self, rec: &Record) -> Result<()> {
        let s = &rec.summary;
        self.n_rounds = self.n_rounds.max(s.round);
        if s.infection_defeated {
            self.defeated_round.get_or_insert(s.round);
        }
        if s.stable {
            self.stable_round.get_or_insert(s.round);
        }
        self.churn.add((s.n_formed + s.n_broken) as f64);
        Ok(())
    }

    fn report(&self) -> serde_json::Value {
        serde_json::json!({
            "n_rounds": self.n_rounds,
            "infection_defeated_round": self.defeated_round,
            "stable_round": self.stable_round,
            "tie_churn": self.churn.report(),
        })
    }
}

/// Measures computed from the network snapshots of a trajectory.
pub struct SnapshotMeasures {
    attr: AssortAttr,
    assortativity: Accumulator,
    closeness: Accumulator,
    path_length: Accumulator,
}

impl SnapshotMeasures {
    pub fn new(cfg: &Config) -> Self {
        Self {
            attr: cfg.simulation.assort_attr,
            assortativity: Accumulator::new(),
            closeness: Accumulator::new(),
            path_length: Accumulator::new(),
        }
    }
}

impl Obs for SnapshotMeasures {
    fn update(&mut self, rec: &Record) -> Result<()> {
        let Some(snapshot) = &rec.snapshot else {
            return Ok(());
        };
        let net = Network::from_snapshot(snapshot.clone()).context("invalid snapshot")?;
        if let Some(r) = net.assortativity(self.attr) {
            self.assortativity.add(r);
        }
        self.closeness.add(net.avg_closeness());
        self.path_length.add(net.avg_path_length());
        Ok(())
    }

    fn report(&self) -> serde_json::Value {
        serde_json::json!({
            "assortativity": self.assortativity.report(),
            "avg_closeness": self.closeness.report(),
            "avg_path_length": self.path_length.report(),
        })
    }
}

pub struct Analyzer {
    obs_ptr_vec: Vec<Box<dyn Obs>>,
}

impl Analyzer {
    pub fn new(cfg: &Config) -> Self {
        let mut obs_ptr_vec: Vec<Box<dyn Obs>> = Vec::new();
        obs_ptr_vec.push(Box::new(SummarySeries::new("n_ties", |rec| {
            rec.summary.n_ties as f64
        })));
        obs_ptr_vec.push(Box::new(SummarySeries::new("avg_degree", |rec| {
            rec.summary.avg_degree
        })));
        obs_ptr_vec.push(Box::new(SummarySeries::new("avg_clustering", |rec| {
            rec.summary.avg_clustering
        })));
        obs_ptr_vec.push(Box::new(SummarySeries::new("n_infected", |rec| {
            rec.summary.n_infected as f64
        })));
        obs_ptr_vec.push(Box::new(EpidemicSize::new()));
        obs_ptr_vec.push(Box::new(Milestones::new()));
        obs_ptr_vec.push(Box::new(SnapshotMeasures::new(cfg)));
        Self { obs_ptr_vec }
    }

    /// Feed every record of a trajectory file to the observables.
    pub fn add_file<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);

        while !reader.fill_buf().context("failed to read file")?.is_empty() {
            let rec: Record = decode::from_read(&mut reader).context("failed to read record")?;
            self.add_record(&rec)?;
        }
        Ok(())
    }

    pub fn add_record(&mut self, rec: &Record) -> Result<()> {
        for obs in &mut self.obs_ptr_vec {
            obs.update(rec).context("failed to update observable")?;
        }
        Ok(())
    }

    pub fn report(&self) -> serde_json::Value {
        let reports: Vec<_> = self.obs_ptr_vec.iter().map(|obs| obs.report()).collect();
        serde_json::Value::Array(reports)
    }

    pub fn save_results<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &self.report())?;
        Ok(())
    }
}
