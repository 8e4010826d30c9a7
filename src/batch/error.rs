use thiserror::Error;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("batch runner is stopped; no new batch can start")]
    Stopped,
    #[error("concurrency limiter closed while scheduling item {index}")]
    Scheduling { index: usize },
}
