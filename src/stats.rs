//! Network statistics and summary statistics of observables.
//!
//! The graph measures are pure functions of a [`Network`]. They tolerate
//! disconnected graphs (unreachable pairs are skipped) and isolated agents
//! (clustering and closeness count as zero).

use crate::agent::{AgentId, AssortAttr};
use crate::network::Network;
use serde::{Deserialize, Serialize};

pub fn degree(net: &Network, id: AgentId) -> usize {
    net.agent(id).map_or(0, |agt| agt.degree())
}

/// Number of agents at distance exactly two.
pub fn second_order_degree(net: &Network, id: AgentId) -> usize {
    net.view().second_order(id).len()
}

pub fn avg_degree(net: &Network) -> f64 {
    if net.is_empty() {
        return 0.0;
    }
    2.0 * net.n_ties() as f64 / net.len() as f64
}

pub fn density(net: &Network) -> f64 {
    let n = net.len();
    if n < 2 {
        return 0.0;
    }
    net.n_ties() as f64 / (n * (n - 1) / 2) as f64
}

/// Fraction of neighbour pairs that are tied themselves.
pub fn clustering(net: &Network, id: AgentId) -> f64 {
    let Some(agt) = net.agent(id) else {
        return 0.0;
    };
    let ties = agt.ties();
    let k = ties.len();
    if k < 2 {
        return 0.0;
    }
    let links: usize = ties
        .iter()
        .filter_map(|&j| net.agent(j))
        .map(|nbr| nbr.ties().intersection(ties).count())
        .sum();
    (links / 2) as f64 / (k * (k - 1) / 2) as f64
}

pub fn avg_clustering(net: &Network) -> f64 {
    mean_over_agents(net, |id| clustering(net, id))
}

/// Inverse of the mean geodesic distance to every reachable agent.
pub fn closeness(net: &Network, id: AgentId) -> f64 {
    let dist = net.view().distances(id, None);
    if dist.is_empty() {
        return 0.0;
    }
    let sum: usize = dist.values().sum();
    dist.len() as f64 / sum as f64
}

pub fn avg_closeness(net: &Network) -> f64 {
    mean_over_agents(net, |id| closeness(net, id))
}

/// Longest shortest path between any two connected agents.
pub fn diameter(net: &Network) -> usize {
    let view = net.view();
    net.ids()
        .into_iter()
        .flat_map(|id| view.distances(id, None).into_values())
        .max()
        .unwrap_or(0)
}

/// Mean shortest path length over all connected pairs.
pub fn avg_path_length(net: &Network) -> f64 {
    let view = net.view();
    let (n_pairs, sum) = net
        .ids()
        .into_iter()
        .flat_map(|id| view.distances(id, None).into_values())
        .fold((0usize, 0usize), |(n, s), d| (n + 1, s + d));
    if n_pairs == 0 {
        return 0.0;
    }
    sum as f64 / n_pairs as f64
}

/// Newman's assortativity coefficient of a scalar attribute.
///
/// Returns `None` when there are no ties or the attribute does not vary
/// across tie endpoints.
pub fn assortativity(net: &Network, attr: AssortAttr) -> Option<f64> {
    let mut n_ends = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_x = 0.0;
    let mut sum_x2 = 0.0;
    for (a, b) in net.ties() {
        let x = net.agent(a)?.attr_value(attr);
        let y = net.agent(b)?.attr_value(attr);
        // both orientations of the tie
        n_ends += 2.0;
        sum_xy += 2.0 * x * y;
        sum_x += x + y;
        sum_x2 += x * x + y * y;
    }
    if n_ends == 0.0 {
        return None;
    }
    let mean = sum_x / n_ends;
    let var = sum_x2 / n_ends - mean * mean;
    if var <= 1e-12 {
        return None;
    }
    Some((sum_xy / n_ends - mean * mean) / var)
}

fn mean_over_agents<F: Fn(AgentId) -> f64>(net: &Network, f: F) -> f64 {
    if net.is_empty() {
        return 0.0;
    }
    net.ids().into_iter().map(f).sum::<f64>() / net.len() as f64
}

/// Running mean and variance (Welford's algorithm).
#[derive(Debug, Default, Clone)]
pub struct Accumulator {
    n_vals: usize,
    mean: f64,
    diff_2_sum: f64,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct AccumulatorReport {
    pub n_vals: usize,
    pub mean: f64,
    pub std_dev: f64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, val: f64) {
        self.n_vals += 1;
        let diff_a = val - self.mean;
        self.mean += diff_a / self.n_vals as f64;
        let diff_b = val - self.mean;
        self.diff_2_sum += diff_a * diff_b;
    }

    pub fn report(&self) -> AccumulatorReport {
        AccumulatorReport {
            n_vals: self.n_vals,
            mean: if self.n_vals > 0 { self.mean } else { f64::NAN },
            std_dev: if self.n_vals > 1 {
                (self.diff_2_sum / (self.n_vals as f64 - 1.0)).sqrt()
            } else {
                f64::NAN
            },
        }
    }
}

/// Per-round series of an observable.
#[derive(Debug, Default, Clone)]
pub struct TimeSeries {
    vals: Vec<f64>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesReport {
    pub len: usize,
    pub last: f64,
    /// Statistics of the tail after the estimated transient.
    pub mean: f64,
    pub std_dev: f64,
    pub sem: f64,
    /// Index where the tail starts.
    pub i_equil: usize,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, val: f64) {
        self.vals.push(val);
    }

    pub fn report(&self) -> TimeSeriesReport {
        let i_equil = compute_i_equil(&self.vals);
        let tail = &self.vals[i_equil..];
        TimeSeriesReport {
            len: self.vals.len(),
            last: self.vals.last().copied().unwrap_or(f64::NAN),
            mean: compute_mean(tail),
            std_dev: compute_var(tail).sqrt(),
            sem: compute_sem(tail),
            i_equil,
        }
    }
}

fn compute_mean(vals: &[f64]) -> f64 {
    if vals.is_empty() {
        return f64::NAN;
    }
    vals.iter().sum::<f64>() / vals.len() as f64
}

fn compute_var(vals: &[f64]) -> f64 {
    let n_vals = vals.len();
    if n_vals < 2 {
        return f64::NAN;
    }
    let mean = compute_mean(vals);
    vals.iter().map(|&val| (val - mean).powi(2)).sum::<f64>() / (n_vals - 1) as f64
}

/// Standard error of the mean with Flyvbjerg-Petersen blocking.
fn compute_sem(vals: &[f64]) -> f64 {
    let mut blocks = vals.to_vec();
    let mut sem2_ests = Vec::new();
    let mut sem2_errs = Vec::new();
    while blocks.len() >= 2 {
        let n_vals = blocks.len() as f64;
        let sem2_est = compute_var(&blocks) / n_vals;
        sem2_ests.push(sem2_est);
        sem2_errs.push(sem2_est * (2.0 / (n_vals - 1.0)).sqrt());
        blocks = blocks
            .chunks_exact(2)
            .map(|pair| (pair[0] + pair[1]) / 2.0)
            .collect();
    }

    // first block size whose estimate is not below a later one's error bar
    for (idx, &sem2_est) in sem2_ests.iter().enumerate() {
        let max_low = sem2_ests[idx..]
            .iter()
            .zip(&sem2_errs[idx..])
            .map(|(s, e)| s - e)
            .fold(f64::NEG_INFINITY, f64::max);
        if sem2_est >= max_low {
            return sem2_est.sqrt();
        }
    }
    sem2_ests.last().copied().unwrap_or(f64::NAN).sqrt()
}

/// Start of the equilibrated tail by the marginal standard error rule,
/// trying cut points at `n/2^k`.
fn compute_i_equil(vals: &[f64]) -> usize {
    let n_vals = vals.len();
    if n_vals < 4 {
        return 0;
    }
    let mut min_mse = f64::INFINITY;
    let mut opt = 0;
    let mut cut = n_vals / 2;
    loop {
        let tail = &vals[cut..];
        let n_tail = tail.len();
        let mse = compute_var(tail) * (n_tail - 1) as f64 / (n_tail * n_tail) as f64;
        if mse.is_finite() && mse <= min_mse {
            min_mse = mse;
            opt = cut;
        }
        if cut == 0 {
            break;
        }
        cut /= 2;
    }
    opt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentParams;
    use crate::disease::DiseaseSpecs;
    use crate::utility::{Cumulative, UtilityFunction};
    use std::sync::Arc;

    fn network(ages: &[u32]) -> (Network, Vec<AgentId>) {
        let utility = UtilityFunction::Cumulative(Cumulative { alpha: 1.0, beta: 0.0, c: 0.0 });
        let specs = Arc::new(DiseaseSpecs::new(5, 1.0, 0.1, 1.0).unwrap());
        let mut net = Network::new();
        let ids = ages
            .iter()
            .map(|&age| {
                let mut params = AgentParams::new(utility.clone());
                params.age = age;
                net.add_agent(params, specs.clone()).unwrap()
            })
            .collect();
        (net, ids)
    }

    #[test]
    fn empty_and_isolated_networks_are_zero() {
        let (net, ids) = network(&[]);
        assert_eq!(avg_degree(&net), 0.0);
        assert_eq!(avg_clustering(&net), 0.0);
        assert!(ids.is_empty());

        let (net, ids) = network(&[20, 30]);
        assert_eq!(clustering(&net, ids[0]), 0.0);
        assert_eq!(closeness(&net, ids[0]), 0.0);
        assert_eq!(diameter(&net), 0);
        assert_eq!(assortativity(&net, AssortAttr::Age), None);
    }

    #[test]
    fn triangle_with_tail() {
        let (mut net, ids) = network(&[20, 20, 20, 20]);
        net.connect(ids[0], ids[1]).unwrap();
        net.connect(ids[1], ids[2]).unwrap();
        net.connect(ids[0], ids[2]).unwrap();
        net.connect(ids[2], ids[3]).unwrap();

        assert_eq!(avg_degree(&net), 2.0);
        assert_eq!(clustering(&net, ids[0]), 1.0);
        assert!((clustering(&net, ids[2]) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(clustering(&net, ids[3]), 0.0);
        assert_eq!(diameter(&net), 2);
        // agent 3: distances 1, 2, 2
        assert!((closeness(&net, ids[3]) - 3.0 / 5.0).abs() < 1e-12);
        assert_eq!(second_order_degree(&net, ids[3]), 2);
        assert!((density(&net) - 4.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn disconnected_pairs_are_skipped() {
        let (mut net, ids) = network(&[20, 20, 20, 20]);
        net.connect(ids[0], ids[1]).unwrap();
        net.connect(ids[2], ids[3]).unwrap();
        assert_eq!(avg_closeness(&net), 1.0);
        assert_eq!(avg_path_length(&net), 1.0);
    }

    #[test]
    fn assortativity_sign_follows_mixing() {
        let (mut net, ids) = network(&[20, 20, 60, 60]);
        net.connect(ids[0], ids[1]).unwrap();
        net.connect(ids[2], ids[3]).unwrap();
        let r = assortativity(&net, AssortAttr::Age).unwrap();
        assert!((r - 1.0).abs() < 1e-12);

        net.remove_all_ties();
        net.connect(ids[0], ids[2]).unwrap();
        net.connect(ids[1], ids[3]).unwrap();
        let r = assortativity(&net, AssortAttr::Age).unwrap();
        assert!((r + 1.0).abs() < 1e-12);
    }

    #[test]
    fn accumulator_mean_and_std_dev() {
        let mut acc = Accumulator::new();
        for val in [1.0, 2.0, 3.0, 4.0] {
            acc.add(val);
        }
        let report = acc.report();
        assert_eq!(report.mean, 2.5);
        assert!((report.std_dev - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn constant_series_has_no_spread() {
        let mut series = TimeSeries::new();
        for _ in 0..64 {
            series.push(3.0);
        }
        let report = series.report();
        assert_eq!(report.mean, 3.0);
        assert_eq!(report.std_dev, 0.0);
        assert_eq!(report.last, 3.0);
    }
}
