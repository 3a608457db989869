mod admission;
mod interpreter;
mod run;
mod stop;
mod vu;

pub use run::{Population, Simulation, SimulationBuilder};
pub use stop::StopHandle;
