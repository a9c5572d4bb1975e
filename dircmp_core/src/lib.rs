pub mod lister;
pub mod classifier;
pub mod report;
pub mod synchronizer;
pub mod comparator;

pub use lister::Lister;
pub use classifier::{difference, find_divergent, intersection};
pub use report::build_divergence_report;
pub use synchronizer::Synchronizer;
pub use comparator::Comparator;
