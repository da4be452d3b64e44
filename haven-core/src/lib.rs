pub mod ledger;

/// Boxed error used at the repository seams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
