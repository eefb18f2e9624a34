mod aggregator;
mod series;
mod stats;

#[allow(unused_imports)]
pub use aggregator::TrajectoryPoint;
pub use aggregator::{Aggregator, Trajectory};
pub use series::{read_series, SeriesColumns};
