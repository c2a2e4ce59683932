use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("the broker is not supported: {0}")]
    UnsupportedBroker(String),
    #[error("no terminal of broker {broker} became free within {waited:?}")]
    AcquireTimeout { broker: String, waited: Duration },
}
