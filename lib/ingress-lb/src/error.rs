use thiserror::Error;

#[derive(Debug, Error)]
pub enum LbError {
    #[error("no healthy server available")]
    ServiceUnavailable,
}
