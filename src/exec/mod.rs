mod runner;
mod stage;

pub use runner::SimulationRunner;
pub use stage::execute_stage;
