//! Tie formation and removal protocol of an acting agent.
//!
//! An activation reviews at most one existing tie and, if nothing was
//! broken, evaluates at most one new candidate. New ties need the consent of
//! both parties; ties can be broken unilaterally.

use crate::agent::{AgentId, AssortAttr};
use crate::error::NetworkError;
use crate::network::Network;
use rand::prelude::*;

/// Utility differences below this are treated as ties.
const TOLERANCE: f64 = 1e-9;

/// What an activation did to the network.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Action {
    Idle,
    Broke(AgentId),
    Formed(AgentId),
    Declined(AgentId),
}

/// Utility of `id` in the current network.
fn current_utility(net: &Network, id: AgentId) -> Result<f64, NetworkError> {
    Ok(net.utility(id)?.overall())
}

/// Utility of `id` if its tie to `other` flipped.
fn toggled_utility(net: &Network, id: AgentId, other: AgentId) -> Result<f64, NetworkError> {
    let agt = net.get(id)?;
    let view = net.view_toggled(id, other);
    Ok(agt.utility_function().evaluate(agt, &view).overall())
}

/// Breaking the tie to `partner` strictly improves the utility of `id`.
pub fn removal_improves(net: &Network, id: AgentId, partner: AgentId) -> Result<bool, NetworkError> {
    let before = current_utility(net, id)?;
    Ok(toggled_utility(net, id, partner)? - before > TOLERANCE)
}

/// Tying to `candidate` strictly improves the utility of `id`.
pub fn addition_improves(
    net: &Network,
    id: AgentId,
    candidate: AgentId,
) -> Result<bool, NetworkError> {
    let before = current_utility(net, id)?;
    Ok(toggled_utility(net, id, candidate)? - before > TOLERANCE)
}

/// `candidate` accepts a request from `proposer` unless the tie strictly
/// lowers its utility.
pub fn accepts(net: &Network, candidate: AgentId, proposer: AgentId) -> Result<bool, NetworkError> {
    let before = current_utility(net, candidate)?;
    Ok(toggled_utility(net, candidate, proposer)? - before >= -TOLERANCE)
}

/// No single tie change `id` could make would strictly improve its utility.
///
/// Additions only count if the other agent would accept them.
pub fn is_satisfied(net: &Network, id: AgentId) -> Result<bool, NetworkError> {
    let agt = net.get(id)?;
    let before = current_utility(net, id)?;
    for &partner in agt.ties() {
        if toggled_utility(net, id, partner)? - before > TOLERANCE {
            return Ok(false);
        }
    }
    for other in net.ids() {
        if other == id || agt.is_connected_to(other) {
            continue;
        }
        if toggled_utility(net, id, other)? - before > TOLERANCE && accepts(net, other, id)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Pick a non-neighbour of `id`, preferring agents that share `attr` with
/// probability `omega`.
fn pick_candidate<R: Rng + ?Sized>(
    net: &Network,
    id: AgentId,
    attr: AssortAttr,
    rng: &mut R,
) -> Result<Option<AgentId>, NetworkError> {
    let agt = net.get(id)?;
    let others: Vec<_> = net
        .agents()
        .filter(|other| other.id() != id && !agt.is_connected_to(other.id()))
        .collect();
    if others.is_empty() {
        return Ok(None);
    }
    if rng.random_bool(agt.params().omega) {
        let similar: Vec<_> = others
            .iter()
            .filter(|other| agt.shares_attr(other, attr))
            .collect();
        if let Some(other) = similar.choose(rng) {
            return Ok(Some(other.id()));
        }
    }
    Ok(others.choose(rng).map(|other| other.id()))
}

/// Run one activation of agent `id`.
pub fn act<R: Rng + ?Sized>(
    net: &mut Network,
    id: AgentId,
    attr: AssortAttr,
    rng: &mut R,
) -> Result<Action, NetworkError> {
    let agt = net.get(id)?;
    let psi = agt.params().psi;
    let phi = agt.params().phi;

    // review an existing tie
    let partner = agt.ties().iter().copied().choose(rng);
    if let Some(partner) = partner {
        if rng.random_bool(psi) && removal_improves(net, id, partner)? {
            net.disconnect(id, partner)?;
            net.stats_mut(id)?.broken_active += 1;
            net.stats_mut(partner)?.broken_passive += 1;
            log::trace!("{id} broke tie to {partner}");
            return Ok(Action::Broke(partner));
        }
    }

    // evaluate a new candidate
    if !rng.random_bool(phi) {
        return Ok(Action::Idle);
    }
    let Some(candidate) = pick_candidate(net, id, attr, rng)? else {
        return Ok(Action::Idle);
    };
    if !addition_improves(net, id, candidate)? {
        return Ok(Action::Idle);
    }
    if accepts(net, candidate, id)? {
        net.connect(id, candidate)?;
        net.stats_mut(id)?.accepted_out += 1;
        net.stats_mut(candidate)?.accepted_in += 1;
        log::trace!("{candidate} accepted tie request of {id}");
        Ok(Action::Formed(candidate))
    } else {
        net.stats_mut(id)?.declined_out += 1;
        net.stats_mut(candidate)?.declined_in += 1;
        log::trace!("{candidate} declined tie request of {id}");
        Ok(Action::Declined(candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentParams;
    use crate::disease::DiseaseSpecs;
    use crate::utility::{Cidm, Cumulative, UtilityFunction};
    use rand_chacha::ChaCha12Rng;
    use std::sync::Arc;

    fn cumulative(alpha: f64, beta: f64, c: f64) -> UtilityFunction {
        UtilityFunction::Cumulative(Cumulative { alpha, beta, c })
    }

    fn network(utilities: &[UtilityFunction]) -> (Network, Vec<AgentId>) {
        let specs = Arc::new(DiseaseSpecs::new(5, 1.0, 0.0, 1.0).unwrap());
        let mut net = Network::new();
        let ids = utilities
            .iter()
            .map(|utility| net.add_agent(AgentParams::new(utility.clone()), specs.clone()).unwrap())
            .collect();
        (net, ids)
    }

    #[test]
    fn isolated_agent_gains_from_any_tie() {
        let (net, ids) = network(&[cumulative(1.0, 0.0, 0.0), cumulative(1.0, 0.0, 0.0)]);
        assert!(addition_improves(&net, ids[0], ids[1]).unwrap());
        assert!(!net.is_satisfied(ids[0]).unwrap());
    }

    #[test]
    fn mutual_consent_is_required() {
        let (mut net, ids) = network(&[cumulative(1.0, 0.0, 0.0), cumulative(0.0, 0.0, 1.0)]);
        let mut rng = ChaCha12Rng::seed_from_u64(11);
        let action = act(&mut net, ids[0], AssortAttr::Age, &mut rng).unwrap();
        assert_eq!(action, Action::Declined(ids[1]));
        assert_eq!(net.n_ties(), 0);
        assert_eq!(net.agent(ids[0]).unwrap().stats().declined_out, 1);
        assert_eq!(net.agent(ids[1]).unwrap().stats().declined_in, 1);

        // a request that would be declined does not unsettle the proposer
        assert!(net.is_satisfied(ids[0]).unwrap());
    }

    #[test]
    fn costly_tie_is_broken_actively() {
        let (mut net, ids) = network(&[cumulative(0.0, 0.0, 1.0), cumulative(0.0, 0.0, 1.0)]);
        net.connect(ids[0], ids[1]).unwrap();
        let mut rng = ChaCha12Rng::seed_from_u64(5);
        let action = act(&mut net, ids[1], AssortAttr::Age, &mut rng).unwrap();
        assert_eq!(action, Action::Broke(ids[0]));
        assert_eq!(net.agent(ids[1]).unwrap().stats().broken_active, 1);
        assert_eq!(net.agent(ids[0]).unwrap().stats().broken_passive, 1);
        assert!(net.is_stable());
    }

    #[test]
    fn at_most_one_change_per_activation() {
        let utility = cumulative(1.0, 0.0, 0.0);
        let (mut net, ids) = network(&vec![utility; 5]);
        let mut rng = ChaCha12Rng::seed_from_u64(2);
        let action = act(&mut net, ids[0], AssortAttr::Age, &mut rng).unwrap();
        assert!(matches!(action, Action::Formed(_)));
        assert_eq!(net.n_ties(), 1);
    }

    #[test]
    fn risk_averse_candidate_refuses_an_infected_proposer() {
        let utility = UtilityFunction::Cidm(Cidm {
            alpha: 1.0,
            kappa: 1.0,
            beta: 0.0,
            lamda: 1.0,
            c: 0.0,
        });
        let specs = Arc::new(DiseaseSpecs::new(10, 2.0, 0.3, 1.0).unwrap());
        let mut net = Network::new();
        let proposer = net
            .add_agent(AgentParams::new(utility.clone()), specs.clone())
            .unwrap();
        let neutral = net
            .add_agent(AgentParams::new(utility.clone()), specs.clone())
            .unwrap();
        let mut params = AgentParams::new(utility);
        params.r_sigma = 2.0;
        params.r_pi = 2.0;
        let averse = net.add_agent(params, specs).unwrap();
        net.infect(proposer).unwrap();

        // benefit 1 against perceived costs 2 * 0.3 and 4 * 1
        assert!(accepts(&net, neutral, proposer).unwrap());
        assert!(!accepts(&net, averse, proposer).unwrap());
    }

    #[test]
    fn assortative_candidates_share_the_attribute() {
        let specs = Arc::new(DiseaseSpecs::new(5, 1.0, 0.0, 1.0).unwrap());
        let mut net = Network::new();
        let mut ids = Vec::new();
        for age in [25, 27, 70, 75, 80] {
            let mut params = AgentParams::new(cumulative(1.0, 0.0, 0.0));
            params.age = age;
            params.omega = 1.0;
            ids.push(net.add_agent(params, specs.clone()).unwrap());
        }
        let mut rng = ChaCha12Rng::seed_from_u64(9);
        for _ in 0..20 {
            let candidate = pick_candidate(&net, ids[0], AssortAttr::Age, &mut rng).unwrap();
            assert_eq!(candidate, Some(ids[1]));
        }
    }
}
