pub mod iron_condor;
pub mod service;

pub use service::StrategyService;
