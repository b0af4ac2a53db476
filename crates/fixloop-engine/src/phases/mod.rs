//! Phase controllers. Each performs one transition of its phase on the run state.

mod building;
mod fixing;
mod implementing;
mod planning;
