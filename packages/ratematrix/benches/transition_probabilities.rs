use criterion::measurement::WallTime;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkGroup, Criterion};
use ndarray::{array, Array2};
use ratematrix::models::codon_hky::{CodonHKY, CodonHKYParams};
use ratematrix::models::free_k::{FreeK, FreeKParams, TransitionMethod};
use ratematrix::models::gtr::{GTRParams, GTR};
use ratematrix::models::hky::{HKY85Params, HKY85};
use ratematrix::rate_matrix::rate_matrix::RateMatrix;

fn bench_model(g: &mut BenchmarkGroup<WallTime>, name: &str, model: &dyn RateMatrix) {
  let n = model.num_states();
  let mut probabilities = Array2::<f64>::zeros((n, n));
  g.bench_function(name, |b| {
    b.iter(|| {
      model
        .calculate_transition_probabilities(black_box(0.37), &mut probabilities)
        .unwrap();
    });
  });
}

fn benchmark_main(c: &mut Criterion) {
  let pi = array![0.1, 0.2, 0.3, 0.4];
  let hky = HKY85::new(HKY85Params { kappa: 3.0, pi: pi.clone() }).unwrap();
  let gtr = GTR::new(GTRParams {
    exchangeability_rates: array![1.0, 3.0, 1.0, 1.0, 3.0, 1.0],
    pi,
  })
  .unwrap();
  let cyclic = FreeKParams {
    num_states: 4,
    transition_rates: Some(array![5.0, 0.1, 0.1, 0.1, 5.0, 0.1, 0.1, 0.1, 5.0, 5.0, 0.1, 0.1]),
    ..FreeKParams::default()
  };
  let free_eigen = FreeK::new(cyclic.clone()).unwrap();
  let free_taylor = FreeK::new(FreeKParams {
    method: TransitionMethod::ScalingAndSquaring,
    ..cyclic.clone()
  })
  .unwrap();
  let free_uniformization = FreeK::new(FreeKParams {
    method: TransitionMethod::Uniformization,
    ..cyclic
  })
  .unwrap();
  let codon = CodonHKY::new(CodonHKYParams::default()).unwrap();

  let mut g = c.benchmark_group("transition_probabilities");
  bench_model(&mut g, "hky85_closed_form", &hky);
  bench_model(&mut g, "gtr_real_spectral", &gtr);
  bench_model(&mut g, "free_k_complex_spectral", &free_eigen);
  bench_model(&mut g, "free_k_scaling_and_squaring", &free_taylor);
  bench_model(&mut g, "free_k_uniformization", &free_uniformization);
  bench_model(&mut g, "codon_hky_real_spectral", &codon);
  g.finish();
}

criterion_group!(transition_probabilities, benchmark_main);
criterion_main!(transition_probabilities);
