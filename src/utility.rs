//! Utility models scoring an agent's position in the network.
//!
//! Every model is a pure function of the agent and a [`View`] of the
//! network. Counterfactual positions (one tie more or less) are evaluated by
//! handing the model a view with that tie toggled, so evaluation never
//! mutates the network.

use crate::agent::{Agent, AgentId};
use crate::config::check_num;
use crate::disease::DiseaseGroup;
use crate::network::View;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Components of an agent's utility.
#[derive(Debug, Default, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct UtilityBreakdown {
    pub benefit_direct: f64,
    pub benefit_indirect: f64,
    pub costs_direct: f64,
    pub costs_disease: f64,
}

impl UtilityBreakdown {
    pub fn overall(&self) -> f64 {
        self.benefit_direct + self.benefit_indirect - self.costs_direct - self.costs_disease
    }
}

/// Benefits of direct and indirect ties minus the costs of direct ties.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Cumulative {
    /// Benefit per direct tie.
    pub alpha: f64,
    /// Benefit per indirect tie.
    pub beta: f64,
    /// Cost per direct tie.
    pub c: f64,
}

/// Cumulative model with discounts for infected ties and disease costs.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Cidm {
    /// Benefit per direct tie.
    pub alpha: f64,
    /// Discount of the benefit of a direct tie to an infected agent.
    pub kappa: f64,
    /// Benefit per indirect tie.
    pub beta: f64,
    /// Discount of the benefit of an indirect tie to an infected agent.
    pub lamda: f64,
    /// Cost per direct tie.
    pub c: f64,
}

/// Direct benefits, a preference for closed or open triads, quadratic costs
/// and disease costs.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct NunnerBuskens {
    pub b1: f64,
    pub b2: f64,
    /// Preference for ties embedded in closed triads (0: open, 1: closed).
    pub alpha: f64,
    pub c1: f64,
    pub c2: f64,
}

/// Direct benefits, benefits per closed triad and quadratic costs.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct BurgerBuskens {
    pub b1: f64,
    pub b2: f64,
    pub c1: f64,
    pub c2: f64,
}

/// Benefits decaying geometrically with geodesic distance.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct CarayolRoux {
    pub delta: f64,
    pub c: f64,
}

/// Benefits decaying geometrically up to a distance cutoff.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct TruncatedConnections {
    pub delta: f64,
    pub c: f64,
    pub cutoff: usize,
}

/// Closed set of utility models.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtilityFunction {
    Cumulative(Cumulative),
    #[serde(alias = "irtc")]
    Cidm(Cidm),
    NunnerBuskens(NunnerBuskens),
    BurgerBuskens(BurgerBuskens),
    CarayolRoux(CarayolRoux),
    TruncatedConnections(TruncatedConnections),
}

fn check_coef(val: f64) -> Result<()> {
    check_num(val, 0.0..=1e6)
}

fn check_frac(val: f64) -> Result<()> {
    check_num(val, 0.0..=1.0)
}

impl UtilityFunction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cumulative(_) => "cumulative",
            Self::Cidm(_) => "cidm",
            Self::NunnerBuskens(_) => "nunner_buskens",
            Self::BurgerBuskens(_) => "burger_buskens",
            Self::CarayolRoux(_) => "carayol_roux",
            Self::TruncatedConnections(_) => "truncated_connections",
        }
    }

    /// Whether the model charges agents for the disease.
    pub fn is_disease_aware(&self) -> bool {
        matches!(self, Self::Cidm(_) | Self::NunnerBuskens(_))
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Cumulative(p) => {
                check_coef(p.alpha).context("invalid alpha")?;
                check_coef(p.beta).context("invalid beta")?;
                check_coef(p.c).context("invalid c")?;
            }
            Self::Cidm(p) => {
                check_coef(p.alpha).context("invalid alpha")?;
                check_frac(p.kappa).context("invalid kappa")?;
                check_coef(p.beta).context("invalid beta")?;
                check_frac(p.lamda).context("invalid lamda")?;
                check_coef(p.c).context("invalid c")?;
            }
            Self::NunnerBuskens(p) => {
                check_coef(p.b1).context("invalid b1")?;
                check_coef(p.b2).context("invalid b2")?;
                check_frac(p.alpha).context("invalid alpha")?;
                check_coef(p.c1).context("invalid c1")?;
                check_coef(p.c2).context("invalid c2")?;
            }
            Self::BurgerBuskens(p) => {
                check_coef(p.b1).context("invalid b1")?;
                check_coef(p.b2).context("invalid b2")?;
                check_coef(p.c1).context("invalid c1")?;
                check_coef(p.c2).context("invalid c2")?;
            }
            Self::CarayolRoux(p) => {
                check_frac(p.delta).context("invalid delta")?;
                check_coef(p.c).context("invalid c")?;
            }
            Self::TruncatedConnections(p) => {
                check_frac(p.delta).context("invalid delta")?;
                check_coef(p.c).context("invalid c")?;
                if p.cutoff == 0 {
                    bail!("cutoff must be at least 1");
                }
            }
        }
        Ok(())
    }

    /// Score the position of `agent` in `view`.
    pub fn evaluate(&self, agent: &Agent, view: &View<'_>) -> UtilityBreakdown {
        let id = agent.id();
        let ties = view.neighbors(id);
        let t = ties.len() as f64;
        let t_inf = count_infected(view, &ties) as f64;
        let mu = agent.disease_specs().mu;

        match self {
            Self::Cumulative(p) => {
                let x = view.second_order(id).len() as f64;
                UtilityBreakdown {
                    benefit_direct: p.alpha * t,
                    benefit_indirect: p.beta * x,
                    costs_direct: p.c * t,
                    costs_disease: 0.0,
                }
            }
            Self::Cidm(p) => {
                let second = view.second_order(id);
                let x = second.len() as f64;
                let x_inf = count_infected(view, &second) as f64;
                UtilityBreakdown {
                    benefit_direct: p.alpha * ((t - t_inf) + p.kappa * t_inf),
                    benefit_indirect: p.beta * ((x - x_inf) + p.lamda * x_inf),
                    costs_direct: p.c * ((t - t_inf) + mu * t_inf),
                    costs_disease: disease_costs(agent, t_inf as usize),
                }
            }
            Self::NunnerBuskens(p) => {
                let f_closed = closed_share(view, &ties);
                let f_open = if ties.is_empty() { 0.0 } else { 1.0 - f_closed };
                UtilityBreakdown {
                    benefit_direct: p.b1 * t,
                    benefit_indirect: p.b2 * (p.alpha * f_closed + (1.0 - p.alpha) * f_open),
                    costs_direct: p.c1 * ((t - t_inf) + mu * t_inf) + p.c2 * t * t,
                    costs_disease: disease_costs(agent, t_inf as usize),
                }
            }
            Self::BurgerBuskens(p) => {
                let z = closed_triads(view, &ties) as f64;
                UtilityBreakdown {
                    benefit_direct: p.b1 * t,
                    benefit_indirect: p.b2 * z,
                    costs_direct: p.c1 * t + p.c2 * t * t,
                    costs_disease: 0.0,
                }
            }
            Self::CarayolRoux(p) => {
                let (direct, indirect) = decayed_benefits(view, id, p.delta, None);
                UtilityBreakdown {
                    benefit_direct: direct,
                    benefit_indirect: indirect,
                    costs_direct: p.c * t,
                    costs_disease: 0.0,
                }
            }
            Self::TruncatedConnections(p) => {
                let (direct, indirect) = decayed_benefits(view, id, p.delta, Some(p.cutoff));
                UtilityBreakdown {
                    benefit_direct: direct,
                    benefit_indirect: indirect,
                    costs_direct: p.c * t,
                    costs_disease: 0.0,
                }
            }
        }
    }
}

fn count_infected(view: &View<'_>, ids: &BTreeSet<AgentId>) -> usize {
    ids.iter()
        .filter_map(|&id| view.agent(id))
        .filter(|agt| agt.disease_group() == DiseaseGroup::Infected)
        .count()
}

/// Perceived costs of the disease for `agent` given `n_inf` infected ties.
fn disease_costs(agent: &Agent, n_inf: usize) -> f64 {
    let specs = agent.disease_specs();
    let params = agent.params();
    // a harmless disease stays harmless under any perception
    let severity = if specs.s == 0.0 {
        0.0
    } else {
        specs.s.powf(params.r_sigma)
    };
    match agent.disease_group() {
        DiseaseGroup::Susceptible if n_inf == 0 => 0.0,
        DiseaseGroup::Susceptible => severity * specs.prob_infection(n_inf).powf(2.0 - params.r_pi),
        DiseaseGroup::Infected => severity,
        DiseaseGroup::Recovered => 0.0,
    }
}

/// Share of ties whose partner has at least one other neighbour in common
/// with the agent.
fn closed_share(view: &View<'_>, ties: &BTreeSet<AgentId>) -> f64 {
    if ties.is_empty() {
        return 0.0;
    }
    let closed = ties
        .iter()
        .filter(|&&j| view.neighbors(j).intersection(ties).next().is_some())
        .count();
    closed as f64 / ties.len() as f64
}

/// Number of connected pairs among the agent's neighbours.
fn closed_triads(view: &View<'_>, ties: &BTreeSet<AgentId>) -> usize {
    let twice: usize = ties
        .iter()
        .map(|&j| view.neighbors(j).intersection(ties).count())
        .sum();
    twice / 2
}

/// Sum of `delta^d` over agents at distance `d`, split into distance one and
/// beyond.
fn decayed_benefits(
    view: &View<'_>,
    id: AgentId,
    delta: f64,
    cutoff: Option<usize>,
) -> (f64, f64) {
    let mut direct = 0.0;
    let mut indirect = 0.0;
    for (_, dist) in view.distances(id, cutoff) {
        let val = delta.powi(dist as i32);
        if dist == 1 {
            direct += val;
        } else {
            indirect += val;
        }
    }
    (direct, indirect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentParams;
    use crate::disease::DiseaseSpecs;
    use crate::network::Network;
    use std::sync::Arc;

    fn network(utility: UtilityFunction, n: usize, specs: DiseaseSpecs) -> (Network, Vec<AgentId>) {
        let specs = Arc::new(specs);
        let mut net = Network::new();
        let ids = (0..n)
            .map(|_| net.add_agent(AgentParams::new(utility.clone()), specs.clone()).unwrap())
            .collect();
        (net, ids)
    }

    fn no_disease() -> DiseaseSpecs {
        DiseaseSpecs::new(10, 0.0, 0.0, 1.0).unwrap()
    }

    #[test]
    fn isolated_agent_has_zero_benefit() {
        let models = [
            UtilityFunction::Cumulative(Cumulative { alpha: 1.0, beta: 0.5, c: 0.2 }),
            UtilityFunction::NunnerBuskens(NunnerBuskens {
                b1: 1.0,
                b2: 0.5,
                alpha: 0.5,
                c1: 0.2,
                c2: 0.1,
            }),
            UtilityFunction::CarayolRoux(CarayolRoux { delta: 0.5, c: 0.1 }),
        ];
        for utility in models {
            let (net, ids) = network(utility, 3, no_disease());
            let u = net.utility(ids[0]).unwrap();
            assert_eq!(u.benefit_direct, 0.0);
            assert_eq!(u.benefit_indirect, 0.0);
            assert!(u.overall().is_finite());
        }
    }

    #[test]
    fn cumulative_counts_direct_and_indirect_ties() {
        let utility = UtilityFunction::Cumulative(Cumulative { alpha: 1.0, beta: 0.5, c: 0.25 });
        let (mut net, ids) = network(utility, 4, no_disease());
        // path 0 - 1 - 2 - 3
        net.connect(ids[0], ids[1]).unwrap();
        net.connect(ids[1], ids[2]).unwrap();
        net.connect(ids[2], ids[3]).unwrap();

        let u = net.utility(ids[1]).unwrap();
        assert_eq!(u.benefit_direct, 2.0);
        assert_eq!(u.benefit_indirect, 0.5);
        assert_eq!(u.costs_direct, 0.5);
        assert_eq!(u.overall(), 2.0);
    }

    #[test]
    fn counterfactual_view_does_not_mutate() {
        let utility = UtilityFunction::Cumulative(Cumulative { alpha: 1.0, beta: 0.0, c: 0.0 });
        let (net, ids) = network(utility.clone(), 2, no_disease());
        let agent = net.agent(ids[0]).unwrap();
        let with = utility.evaluate(agent, &net.view_toggled(ids[0], ids[1]));
        assert_eq!(with.benefit_direct, 1.0);
        assert_eq!(net.n_ties(), 0);
        assert_eq!(net.utility(ids[0]).unwrap().overall(), 0.0);
    }

    #[test]
    fn cidm_discounts_infected_ties() {
        let utility = UtilityFunction::Cidm(Cidm {
            alpha: 1.0,
            kappa: 0.5,
            beta: 0.0,
            lamda: 1.0,
            c: 0.1,
        });
        let specs = DiseaseSpecs::new(10, 2.0, 0.5, 3.0).unwrap();
        let (mut net, ids) = network(utility, 3, specs);
        net.connect(ids[0], ids[1]).unwrap();
        net.connect(ids[0], ids[2]).unwrap();
        net.infect(ids[2]).unwrap();

        let u = net.utility(ids[0]).unwrap();
        assert!((u.benefit_direct - 1.5).abs() < 1e-12);
        assert!((u.costs_direct - 0.4).abs() < 1e-12);
        // severity 2 with neutral perception, p = 0.5 with neutral perception
        assert!((u.costs_disease - 1.0).abs() < 1e-12);

        let infected = net.utility(ids[2]).unwrap();
        assert!((infected.costs_disease - 2.0).abs() < 1e-12);
    }

    #[test]
    fn risk_perception_distorts_disease_costs() {
        let utility = UtilityFunction::Cidm(Cidm {
            alpha: 1.0,
            kappa: 1.0,
            beta: 0.0,
            lamda: 1.0,
            c: 0.0,
        });
        let specs = Arc::new(DiseaseSpecs::new(10, 4.0, 0.5, 1.0).unwrap());
        let mut net = Network::new();
        let mut params = AgentParams::new(utility.clone());
        params.r_sigma = 0.5;
        params.r_pi = 1.5;
        let a = net.add_agent(params, specs.clone()).unwrap();
        let b = net.add_agent(AgentParams::new(utility), specs).unwrap();
        net.connect(a, b).unwrap();
        net.infect(b).unwrap();

        // 4^0.5 * 0.5^0.5
        let u = net.utility(a).unwrap();
        assert!((u.costs_disease - 2.0 * 0.5f64.sqrt()).abs() < 1e-12);

        net.cure(b).unwrap();
        net.infect(a).unwrap();
        let u = net.utility(a).unwrap();
        assert!((u.costs_disease - 2.0).abs() < 1e-12);
    }

    #[test]
    fn harmless_disease_costs_nothing() {
        let utility = UtilityFunction::Cidm(Cidm {
            alpha: 1.0,
            kappa: 1.0,
            beta: 0.0,
            lamda: 1.0,
            c: 0.0,
        });
        let specs = Arc::new(DiseaseSpecs::new(10, 0.0, 0.5, 1.0).unwrap());
        let mut net = Network::new();
        let mut params = AgentParams::new(utility);
        params.r_sigma = 0.0;
        let a = net.add_agent(params, specs).unwrap();
        net.infect(a).unwrap();
        assert_eq!(net.utility(a).unwrap().costs_disease, 0.0);
    }

    #[test]
    fn triads_are_detected_by_shared_neighbours() {
        let utility = UtilityFunction::BurgerBuskens(BurgerBuskens {
            b1: 0.0,
            b2: 1.0,
            c1: 0.0,
            c2: 0.0,
        });
        let (mut net, ids) = network(utility, 4, no_disease());
        net.connect(ids[0], ids[1]).unwrap();
        net.connect(ids[0], ids[2]).unwrap();
        net.connect(ids[0], ids[3]).unwrap();
        net.connect(ids[1], ids[2]).unwrap();
        assert_eq!(net.utility(ids[0]).unwrap().benefit_indirect, 1.0);

        let view = net.view();
        let ties = view.neighbors(ids[0]);
        assert!((closed_share(&view, &ties) - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn truncation_drops_distant_agents() {
        let full = UtilityFunction::CarayolRoux(CarayolRoux { delta: 0.5, c: 0.0 });
        let truncated = UtilityFunction::TruncatedConnections(TruncatedConnections {
            delta: 0.5,
            c: 0.0,
            cutoff: 1,
        });
        let (mut net, ids) = network(full.clone(), 3, no_disease());
        net.connect(ids[0], ids[1]).unwrap();
        net.connect(ids[1], ids[2]).unwrap();

        let agent = net.agent(ids[0]).unwrap();
        let view = net.view();
        assert_eq!(full.evaluate(agent, &view).overall(), 0.75);
        assert_eq!(truncated.evaluate(agent, &view).overall(), 0.5);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let utility = UtilityFunction::Cidm(Cidm {
            alpha: 1.0,
            kappa: 1.5,
            beta: 0.5,
            lamda: 0.5,
            c: 0.1,
        });
        assert!(utility.validate().is_err());
        let utility = UtilityFunction::TruncatedConnections(TruncatedConnections {
            delta: 0.5,
            c: 0.0,
            cutoff: 0,
        });
        assert!(utility.validate().is_err());
    }
}
