use crate::models::codon_hky::{CodonHKY, CodonHKYParams};
use crate::models::covarion::{Covarion, CovarionParams};
use crate::models::dec::{DECParams, DEC};
use crate::models::f81::{F81Params, F81};
use crate::models::flow_two_populations::{FlowTwoPopulations, FlowTwoPopulationsParams};
use crate::models::free_k::{FreeK, FreeKParams, TransitionMethod};
use crate::models::get_model::{get_rate_matrix, RateMatrixName};
use crate::models::gtr::{GTRParams, GTR};
use crate::models::hky::{HKY85Params, HKY85};
use crate::models::jc::{JC69Params, JC69};
use crate::models::pomo::{PoMo, PoMoParams};
use crate::models::senca::{Senca, SencaParams};
use crate::models::tim::{TIMParams, TIM};
use crate::rate_matrix::base::UpdateState;
use crate::rate_matrix::rate_matrix::RateMatrix;
use crate::utils::error::report_to_string;
use crate::utils::ndarray::{max_abs_diff, random};
use crate::utils::random::get_random_number_generator;
use crate::{assert_rows_sum_to, pretty_assert_ulps_eq};
use approx::assert_abs_diff_eq;
use eyre::Report;
use lazy_static::lazy_static;
use ndarray::prelude::*;
use rstest::rstest;
use strum::IntoEnumIterator;

const TIMES: [f64; 5] = [0.0, 0.001, 0.1, 1.0, 7.5];

fn build_all() -> Result<Vec<Box<dyn RateMatrix>>, Report> {
  let mut models = RateMatrixName::iter()
    .map(|name| get_rate_matrix(&name))
    .collect::<Result<Vec<_>, _>>()?;

  // Non-default parameters, to leave the symmetric special cases
  models.push(Box::new(HKY85::new(HKY85Params {
    kappa: 4.0,
    pi: array![0.1, 0.2, 0.3, 0.4],
  })?));
  models.push(Box::new(TIM::new(TIMParams {
    kappa_ag: 3.0,
    kappa_ct: 6.0,
    r_ac_gt: 0.5,
    r_at_cg: 1.5,
    pi: array![0.35, 0.15, 0.2, 0.3],
  })?));
  models.push(Box::new(GTR::new(GTRParams {
    exchangeability_rates: array![0.5, 2.0, 1.0, 0.8, 3.0, 1.2],
    pi: array![0.4, 0.1, 0.2, 0.3],
  })?));
  models.push(Box::new(CodonHKY::new(CodonHKYParams {
    kappa: 2.5,
    omega: 0.25,
    nucleotide_frequencies: array![0.2, 0.3, 0.3, 0.2],
  })?));
  models.push(Box::new(FlowTwoPopulations::new(FlowTwoPopulationsParams {
    population_sizes: [3, 2],
    mu: [0.05, 0.1],
    lambda: [0.2, 0.1],
    sigma: [1.0, 2.0],
  })?));
  models.push(Box::new(FreeK::new(FreeKParams {
    num_states: 3,
    transition_rates: Some(array![4.0, 0.2, 0.3, 4.0, 4.0, 0.1]),
    ..FreeKParams::default()
  })?));
  models.push(Box::new(FreeK::new(FreeKParams {
    num_states: 3,
    transition_rates: Some(array![4.0, 0.2, 0.3, 4.0, 4.0, 0.1]),
    method: TransitionMethod::ScalingAndSquaring,
    ..FreeKParams::default()
  })?));
  models.push(Box::new(Covarion::new(CovarionParams {
    num_states_per_class: 3,
    num_classes: 2,
    class_rate_matrices: Some(vec![
      array![[0.0, 1.0, 2.0], [0.5, 0.0, 1.5], [3.0, 0.2, 0.0]],
      array![[0.0, 0.3, 0.1], [0.2, 0.0, 0.4], [0.6, 0.1, 0.0]],
    ]),
    switch_rates: Some(array![[0.0, 0.4], [0.7, 0.0]]),
    clock_rates: Some(array![1.0, 0.25]),
    method: TransitionMethod::Uniformization,
    ..CovarionParams::default()
  })?));
  models.push(Box::new(PoMo::new(PoMoParams {
    population_size: 4,
    mutation_rates: array![0.02, 0.05, 0.01, 0.03, 0.02, 0.06, 0.04, 0.01, 0.02, 0.01, 0.05, 0.03],
    fitness: array![1.0, 1.3, 1.2, 0.9],
  })?));
  models.push(Box::new(DEC::new(DECParams {
    num_areas: 2,
    dispersal_rates: Some(array![[0.0, 0.6], [0.2, 0.0]]),
    extirpation_rates: Some(array![0.3, 0.1]),
    range_size_weights: Some(array![1.0, 1.0, 0.4]),
    rescale: true,
  })?));

  // Randomized generators
  let mut rng = get_random_number_generator(Some(42));
  let pi: Array1<f64> = random(5, &mut rng) + 0.05;
  models.push(Box::new(GTR::new(GTRParams {
    exchangeability_rates: random(10, &mut rng) * 3.0 + 0.1,
    pi: &pi / pi.sum(),
  })?));
  models.push(Box::new(FreeK::new(FreeKParams {
    num_states: 4,
    transition_rates: Some(random(12, &mut rng) + 0.01),
    ..FreeKParams::default()
  })?));
  Ok(models)
}

lazy_static! {
  static ref MODELS: Vec<Box<dyn RateMatrix>> = build_all().unwrap();
}

fn is_reversible(name: &str) -> bool {
  !matches!(name, "FlowTwoPopulations" | "FreeK" | "Covarion" | "PoMo" | "DEC")
}

#[rstest]
fn generators_have_zero_row_sums() {
  for model in MODELS.iter() {
    assert_rows_sum_to!(model.rate_matrix(), 0.0, epsilon = 1e-12);
  }
}

#[rstest]
fn transition_probabilities_are_stochastic() -> Result<(), Report> {
  for model in MODELS.iter() {
    for t in TIMES {
      let P = model.transition_probabilities(t)?;
      assert_rows_sum_to!(P, 1.0, epsilon = 1e-9);
      assert!(
        P.iter().all(|&p| (0.0..=1.0 + 1e-9).contains(&p)),
        "{}: P({t}) has entries outside [0, 1]",
        model.name()
      );
    }
  }
  Ok(())
}

#[rstest]
fn transition_probabilities_start_at_identity() -> Result<(), Report> {
  for model in MODELS.iter() {
    let P = model.transition_probabilities(0.0)?;
    let I = Array2::<f64>::eye(model.num_states());
    assert!(max_abs_diff(&P, &I) < 1e-10, "{}: P(0) is not identity", model.name());
  }
  Ok(())
}

#[rstest]
#[case(0.2, 0.3)]
#[case(1.0, 0.05)]
#[case(2.0, 3.0)]
fn chapman_kolmogorov_holds(#[case] t1: f64, #[case] t2: f64) -> Result<(), Report> {
  for model in MODELS.iter() {
    let P1 = model.transition_probabilities(t1)?;
    let P2 = model.transition_probabilities(t2)?;
    let P12 = model.transition_probabilities(t1 + t2)?;
    let diff = max_abs_diff(&P1.dot(&P2), &P12);
    assert!(diff < 1e-9, "{}: P({t1})·P({t2}) differs from P({}) by {diff}", model.name(), t1 + t2);
  }
  Ok(())
}

#[rstest]
fn reversible_models_satisfy_detailed_balance() {
  for model in MODELS.iter().filter(|model| is_reversible(model.name())) {
    assert!(model.check_time_reversibility(1e-10), "{}: detailed balance is violated", model.name());
  }
}

#[rstest]
fn stationary_frequencies_are_stationary() {
  for model in MODELS.iter() {
    let pi = model.stationary_frequencies();
    pretty_assert_ulps_eq!(pi.sum(), 1.0, epsilon = 1e-10);
    let flux = pi.dot(model.rate_matrix());
    assert!(flux.iter().all(|f| f.abs() < 1e-10), "{}: pi·Q = {flux}", model.name());
  }
}

#[rstest]
fn matches_scaling_and_squaring() -> Result<(), Report> {
  for model in MODELS.iter() {
    for t in [0.05, 0.2, 0.5] {
      let mut expected = Array2::zeros((model.num_states(), model.num_states()));
      model.base().exponentiate_by_scaling_and_squaring(t, &mut expected)?;
      let diff = max_abs_diff(&model.transition_probabilities(t)?, &expected);
      assert!(diff < 1e-8, "{}: P({t}) differs from Taylor approximant by {diff}", model.name());
    }
  }
  Ok(())
}

#[rstest]
#[case(0.5)]
#[case(2.5)]
fn rescales_to_requested_average_rate(#[case] rate: f64) -> Result<(), Report> {
  for model in MODELS.iter().filter(|model| model.average_rate() > 0.0) {
    let mut model = model.clone();
    model.base_mut().rescale_to_average_rate(rate)?;
    pretty_assert_ulps_eq!(model.average_rate(), rate, epsilon = 1e-12);
  }
  Ok(())
}

#[rstest]
fn stale_models_refuse_to_compute() -> Result<(), Report> {
  for model in MODELS.iter() {
    let mut model = model.clone();
    model.base_mut().mark_stale();
    let error = model.transition_probabilities(0.1).unwrap_err();
    assert!(report_to_string(&error).contains("should be updated"));
    model.update()?;
    assert_eq!(model.state(), UpdateState::Current);
    assert!(model.transition_probabilities(0.1).is_ok());
  }
  Ok(())
}

#[rstest]
fn stale_models_refuse_stochastic_mapping() -> Result<(), Report> {
  let mut rng = get_random_number_generator(Some(3));
  for model in MODELS.iter() {
    let mut model = model.clone();
    model.base_mut().mark_stale();
    assert!(model.stochastic_matrix(2).is_err());
    assert!(model.simulate_stochastic_mapping(1.0, 0.0, 1.0, 0, 0, &mut rng).is_err());
  }
  Ok(())
}

#[rstest]
fn stochastic_matrices_are_stochastic() -> Result<(), Report> {
  for model in MODELS.iter() {
    let R = model.stochastic_matrix(3)?;
    assert_rows_sum_to!(R, 1.0, epsilon = 1e-10);
    assert!(R.iter().all(|&r| r >= -1e-15), "{}: negative jump probability", model.name());
  }
  Ok(())
}

/// Most probable state other than `start` after time `t`, or `start` itself when nothing else is reachable
fn likely_end_state(model: &dyn RateMatrix, start: usize, t: f64) -> Result<usize, Report> {
  let P = model.transition_probabilities(t)?;
  let (end, p) = P
    .row(start)
    .iter()
    .enumerate()
    .filter(|&(j, _)| j != start)
    .fold((start, 0.0), |best, (j, &p)| if p > best.1 { (j, p) } else { best });
  Ok(if p > 1e-6 { end } else { start })
}

#[rstest]
fn stochastic_mappings_connect_requested_states() -> Result<(), Report> {
  let (start_age, end_age) = (1.0, 0.2);
  let mut rng = get_random_number_generator(Some(17));
  for model in MODELS.iter() {
    let Q = model.rate_matrix();
    for start in [0, model.num_states() - 1] {
      let end = likely_end_state(&**model, start, start_age - end_age)?;
      let mapping = (0..20)
        .find_map(|_| {
          model
            .simulate_stochastic_mapping(start_age, end_age, 1.0, start, end, &mut rng)
            .transpose()
        })
        .transpose()?
        .unwrap_or_else(|| panic!("{}: no stochastic mapping {start} -> {end} in 20 attempts", model.name()));

      assert_eq!(mapping.states.first(), Some(&start), "{}", model.name());
      assert_eq!(mapping.states.last(), Some(&end), "{}", model.name());
      assert_eq!(mapping.states.len(), mapping.times.len());
      for (&a, &b) in mapping.states.iter().zip(mapping.states.iter().skip(1)) {
        assert_ne!(a, b, "{}: virtual jump kept in mapping", model.name());
        assert!(Q[[a, b]] > 0.0, "{}: jump {a} -> {b} has zero rate", model.name());
      }
      assert!(mapping.times.iter().all(|&dt| dt >= 0.0));
      pretty_assert_ulps_eq!(mapping.times.iter().sum::<f64>(), start_age - end_age, epsilon = 1e-12);
    }
  }
  Ok(())
}

#[rstest]
fn rejects_invalid_time_and_shape() -> Result<(), Report> {
  let model = get_rate_matrix(&RateMatrixName::GTR)?;
  let mut P = Array2::zeros((4, 4));
  assert!(model.calculate_transition_probabilities(-1.0, &mut P).is_err());
  assert!(model.calculate_transition_probabilities(f64::NAN, &mut P).is_err());
  let mut wrong = Array2::zeros((3, 4));
  assert!(model.calculate_transition_probabilities(1.0, &mut wrong).is_err());
  Ok(())
}

#[rstest]
fn uses_elapsed_branch_time() -> Result<(), Report> {
  let model = get_rate_matrix(&RateMatrixName::HKY85)?;
  let mut P = Array2::zeros((4, 4));
  model.calculate_transition_probabilities_between(2.0, 0.5, 2.0, &mut P)?;
  assert_abs_diff_eq!(P, model.transition_probabilities(3.0)?, epsilon = 1e-15);
  Ok(())
}

#[rstest]
fn clones_are_independent() -> Result<(), Report> {
  let original = HKY85::new(HKY85Params {
    kappa: 2.0,
    ..HKY85Params::default()
  })?;
  let expected = original.transition_probabilities(0.4)?;

  let mut copy = original.clone();
  copy.set_kappa(10.0)?;
  copy.update()?;

  assert_eq!(original.kappa(), 2.0);
  assert_abs_diff_eq!(original.transition_probabilities(0.4)?, expected, epsilon = 0.0);
  assert!(max_abs_diff(&copy.transition_probabilities(0.4)?, &expected) > 1e-3);

  let boxed: Box<dyn RateMatrix> = Box::new(original);
  let boxed_copy = boxed.clone();
  assert_abs_diff_eq!(boxed_copy.transition_probabilities(0.4)?, expected, epsilon = 0.0);
  Ok(())
}

#[rstest]
fn update_is_idempotent() -> Result<(), Report> {
  let mut model = Senca::new(SencaParams::default())?;
  let Q = model.rate_matrix().clone();
  model.update()?;
  model.update()?;
  assert_eq!(model.rate_matrix(), &Q);
  Ok(())
}

#[rstest]
fn prints_model_summary() -> Result<(), Report> {
  let model = get_rate_matrix(&RateMatrixName::HKY85)?;
  let text = model.to_string();
  assert!(text.starts_with("Model: HKY85 (4 states, Current)"));
  assert!(text.contains("A\tC\tG\tT"));
  Ok(())
}

#[rstest]
fn jc69_converges_to_uniform() -> Result<(), Report> {
  let jc = JC69::new(JC69Params { num_states: 4 })?;
  pretty_assert_ulps_eq!(jc.transition_probabilities(0.0)?, Array2::<f64>::eye(4));
  assert_abs_diff_eq!(
    jc.transition_probabilities(100.0)?,
    Array2::from_elem((4, 4), 0.25),
    epsilon = 1e-15
  );
  Ok(())
}

#[rstest]
#[case(0.1)]
#[case(1.0)]
#[case(10.0)]
fn f81_with_uniform_frequencies_equals_jc69(#[case] t: f64) -> Result<(), Report> {
  let jc = JC69::new(JC69Params { num_states: 4 })?;
  let f81 = F81::new(F81Params {
    pi: Array1::from_elem(4, 0.25),
  })?;
  pretty_assert_ulps_eq!(
    f81.transition_probabilities(t)?,
    jc.transition_probabilities(t)?,
    epsilon = 1e-15
  );
  Ok(())
}

#[rstest]
fn gtr_spectral_path_is_consistent() -> Result<(), Report> {
  let gtr = GTR::new(GTRParams {
    exchangeability_rates: array![1.2, 4.1, 0.7, 0.9, 3.8, 1.0],
    pi: array![0.31, 0.19, 0.22, 0.28],
  })?;
  let Q = gtr.rate_matrix();
  assert_abs_diff_eq!(Q.dot(&Array1::<f64>::ones(4)), Array1::<f64>::zeros(4), epsilon = 1e-14);
  assert_abs_diff_eq!(
    gtr.stationary_frequencies().dot(Q),
    Array1::<f64>::zeros(4),
    epsilon = 1e-14
  );
  let engine = gtr.engine().unwrap();
  assert!(!engine.is_complex());
  assert_abs_diff_eq!(engine.eigen_system().reconstruct(), Q.clone(), epsilon = 1e-12);
  assert_abs_diff_eq!(
    gtr.transition_probabilities(0.8)?,
    engine.transition_probabilities(0.8)?,
    epsilon = 0.0
  );
  Ok(())
}

#[rstest]
#[case(1.0, array![0.25, 0.25, 0.25, 0.25], 0.3)]
#[case(2.0, array![0.1, 0.2, 0.3, 0.4], 0.01)]
#[case(8.0, array![0.4, 0.1, 0.1, 0.4], 1.5)]
#[case(0.5, array![0.05, 0.5, 0.4, 0.05], 5.0)]
fn hky_closed_form_matches_generic_engine(
  #[case] kappa: f64,
  #[case] pi: Array1<f64>,
  #[case] t: f64,
) -> Result<(), Report> {
  let hky = HKY85::new(HKY85Params { kappa, pi: pi.clone() })?;
  let generic = GTR::new(GTRParams {
    exchangeability_rates: array![1.0, kappa, 1.0, 1.0, kappa, 1.0],
    pi,
  })?;
  assert_abs_diff_eq!(
    hky.transition_probabilities(t)?,
    generic.transition_probabilities(t)?,
    epsilon = 1e-12
  );
  Ok(())
}
