//! Detector for platforms without a geolocation capability

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{DetectOptions, DetectedPosition, GeolocationDetector, PermissionState};
use crate::error::GeolocationError;

/// Reports no geolocation support; locations must be entered manually
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedDetector;

#[async_trait]
impl GeolocationDetector for UnsupportedDetector {
    fn is_supported(&self) -> bool {
        false
    }

    async fn detect(
        &self,
        _options: DetectOptions,
        _cancel: CancellationToken,
    ) -> Result<DetectedPosition, GeolocationError> {
        Err(GeolocationError::Other(
            "geolocation is not available on this platform".to_string(),
        ))
    }

    async fn permission_state(&self) -> Result<PermissionState, GeolocationError> {
        Ok(PermissionState::Unknown)
    }
}
