use crate::make_report;
use crate::models::codon_hky::{CodonHKY, CodonHKYParams};
use crate::models::covarion::{Covarion, CovarionParams};
use crate::models::dec::{DECParams, DEC};
use crate::models::doublet_epistatic_gtr::{DoubletEpistaticGTR, DoubletEpistaticGTRParams};
use crate::models::f81::{F81Params, F81};
use crate::models::flow_two_populations::{FlowTwoPopulations, FlowTwoPopulationsParams};
use crate::models::free_k::{FreeK, FreeKParams};
use crate::models::gtr::{GTRParams, GTR};
use crate::models::hky::{HKY85Params, HKY85};
use crate::models::infinite_sites::{InfiniteSites, InfiniteSitesParams};
use crate::models::jc::{JC69Params, JC69};
use crate::models::kimura81::{K81Params, K81};
use crate::models::pomo::{PoMo, PoMoParams};
use crate::models::reversible_pomo::{ReversiblePoMo, ReversiblePoMoParams};
use crate::models::senca::{Senca, SencaParams};
use crate::models::tamura92::{T92Params, T92};
use crate::models::tim::{TIMParams, TIM};
use crate::models::tvm::{TVMParams, TVM};
use crate::models::wag::WAG;
use crate::rate_matrix::rate_matrix::RateMatrix;
use eyre::{Report, WrapErr};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use strum_macros::{Display, EnumIter, EnumString};

#[derive(
  Copy,
  Clone,
  Debug,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  SmartDefault,
  Display,
  EnumIter,
  EnumString,
  Serialize,
  Deserialize,
)]
pub enum RateMatrixName {
  #[default]
  JC69,
  F81,
  HKY85,
  T92,
  TIM,
  GTR,
  K81,
  TVM,
  CodonHKY,
  DoubletEpistaticGTR,
  FlowTwoPopulations,
  InfiniteSites,
  WAG,
  Senca,
  FreeK,
  Covarion,
  PoMo,
  ReversiblePoMo,
  DEC,
}

fn boxed<M: RateMatrix + 'static>(model: Result<M, Report>) -> Result<Box<dyn RateMatrix>, Report> {
  Ok(Box::new(model?))
}

/// Model with default parameters, ready for computing transition probabilities
pub fn get_rate_matrix(name: &RateMatrixName) -> Result<Box<dyn RateMatrix>, Report> {
  let model = match name {
    RateMatrixName::JC69 => boxed(JC69::new(JC69Params::default())),
    RateMatrixName::F81 => boxed(F81::new(F81Params::default())),
    RateMatrixName::HKY85 => boxed(HKY85::new(HKY85Params::default())),
    RateMatrixName::T92 => boxed(T92::new(T92Params::default())),
    RateMatrixName::TIM => boxed(TIM::new(TIMParams::default())),
    RateMatrixName::GTR => boxed(GTR::new(GTRParams::default())),
    RateMatrixName::K81 => boxed(K81::new(K81Params::default())),
    RateMatrixName::TVM => boxed(TVM::new(TVMParams::default())),
    RateMatrixName::CodonHKY => boxed(CodonHKY::new(CodonHKYParams::default())),
    RateMatrixName::DoubletEpistaticGTR => boxed(DoubletEpistaticGTR::new(DoubletEpistaticGTRParams::default())),
    RateMatrixName::FlowTwoPopulations => boxed(FlowTwoPopulations::new(FlowTwoPopulationsParams::default())),
    RateMatrixName::InfiniteSites => boxed(InfiniteSites::new(InfiniteSitesParams::default())),
    RateMatrixName::WAG => boxed(WAG::new()),
    RateMatrixName::Senca => boxed(Senca::new(SencaParams::default())),
    RateMatrixName::FreeK => boxed(FreeK::new(FreeKParams::default())),
    RateMatrixName::Covarion => boxed(Covarion::new(CovarionParams::default())),
    RateMatrixName::PoMo => boxed(PoMo::new(PoMoParams::default())),
    RateMatrixName::ReversiblePoMo => boxed(ReversiblePoMo::new(ReversiblePoMoParams::default())),
    RateMatrixName::DEC => boxed(DEC::new(DECParams::default())),
  };
  model.wrap_err_with(|| make_report!("When creating model '{name}'"))
}
