//! Remote county authority seam
//!
//! The remote census service is an external collaborator; the resolver only
//! needs its single point lookup, expressed here as a capability trait.

use std::future::Future;
use std::sync::Arc;

/// Two-part county identifier as returned by an authority
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CountyCode {
    pub state_code: String,
    pub county_code: String,
}

impl CountyCode {
    pub fn new(state_code: impl Into<String>, county_code: impl Into<String>) -> Self {
        Self {
            state_code: state_code.into(),
            county_code: county_code.into(),
        }
    }
}

/// Errors reported by a remote authority
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuthorityError {
    #[error("Authority unavailable: {0}")]
    Unavailable(String),

    #[error("No county found at this point")]
    NotFound,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Async trait for remote county authorities.
///
/// Implementors own their transport, retries and backoff. The resolver calls
/// [`lookup_county`](Self::lookup_county) at most once per resolution and
/// bounds it with its own timeout.
pub trait CountyAuthority: Send + Sync {
    /// Looks up the county containing a WGS84 point.
    fn lookup_county(
        &self,
        lat: f64,
        lon: f64,
    ) -> impl Future<Output = Result<CountyCode, AuthorityError>> + Send;

    /// Returns the authority's name for logging and identification.
    fn name(&self) -> &str {
        "remote"
    }
}

impl<A: CountyAuthority> CountyAuthority for Arc<A> {
    fn lookup_county(
        &self,
        lat: f64,
        lon: f64,
    ) -> impl Future<Output = Result<CountyCode, AuthorityError>> + Send {
        self.as_ref().lookup_county(lat, lon)
    }

    fn name(&self) -> &str {
        self.as_ref().name()
    }
}

/// Authority used when no remote service exists; every lookup is unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineAuthority;

impl CountyAuthority for OfflineAuthority {
    async fn lookup_county(&self, _lat: f64, _lon: f64) -> Result<CountyCode, AuthorityError> {
        Err(AuthorityError::Unavailable(
            "no remote authority configured".to_string(),
        ))
    }

    fn name(&self) -> &str {
        "offline"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl CountyAuthority for Fixed {
        async fn lookup_county(&self, _lat: f64, _lon: f64) -> Result<CountyCode, AuthorityError> {
            Ok(CountyCode::new("06", "037"))
        }
    }

    #[tokio::test]
    async fn test_offline_is_unavailable() {
        let result = OfflineAuthority.lookup_county(34.0, -118.2).await;
        assert!(matches!(result, Err(AuthorityError::Unavailable(_))));
        assert_eq!(OfflineAuthority.name(), "offline");
    }

    #[tokio::test]
    async fn test_arc_delegates() {
        let shared = Arc::new(Fixed);
        let result = shared.lookup_county(34.0, -118.2).await.unwrap();
        assert_eq!(result, CountyCode::new("06", "037"));
        assert_eq!(shared.name(), "remote");
    }

    #[test]
    fn test_error_display() {
        let err = AuthorityError::InvalidResponse("missing FIPS".to_string());
        assert_eq!(err.to_string(), "Invalid response: missing FIPS");
    }
}
