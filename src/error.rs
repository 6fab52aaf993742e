//! Error types shared by every stage of the data pipeline.

use thiserror::Error;

/// Errors that can occur while fetching, classifying, filtering or estimating.
///
/// None of these are fatal: a failed cycle leaves the display stale or empty
/// and the next timer tick or submission tries again.
#[derive(Error, Debug)]
pub enum TideError {
    /// HTTP request failed (network, server, or protocol error)
    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream answered but the payload could not be used
    #[error("upstream returned unusable data: {0}")]
    Upstream(String),

    /// Fewer data points than the algorithm needs
    #[error("insufficient data: needed {needed} observations, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Filter or fetch parameters out of range
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A newer fetch cycle started before this one finished
    #[error("fetch superseded by a newer request")]
    Superseded,
}

impl TideError {
    /// True for failures of the request itself rather than of its contents' size.
    pub fn is_upstream(&self) -> bool {
        matches!(self, TideError::Http(_) | TideError::Upstream(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_data_display() {
        let err = TideError::InsufficientData { needed: 2, got: 1 };
        let msg = err.to_string();
        assert!(msg.contains("needed 2"));
        assert!(msg.contains("got 1"));
        assert!(!err.is_upstream());
    }

    #[test]
    fn test_upstream_classification() {
        assert!(TideError::Upstream("bad value".into()).is_upstream());
        assert!(!TideError::Configuration("x".into()).is_upstream());
        assert!(!TideError::Superseded.is_upstream());
    }
}
