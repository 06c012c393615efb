/// Durable store access
pub mod log_repo;

pub use log_repo::{LogRepository, PgLogRepository, RepositoryError};

#[cfg(test)]
pub use log_repo::MockLogRepository;
