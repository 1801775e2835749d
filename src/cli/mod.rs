pub mod check;
pub mod pull;
pub mod run;

pub use check::check;
pub use pull::pull;
pub use run::{CONTAINERS_ENV, run};
