//! Location sampling
//!
//! [`GeoSampler`] wraps a platform [`LocationProvider`] and forwards its fixes to
//! a callback from a background task until it is stopped. A sampler runs at
//! most once; a new session needs a new sampler.
//!
//! Permission refusal is not an error: the sampler reports
//! [`SamplerStatus::Degraded`] and simply never delivers a fix.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::GhostError;
use crate::geo;
use crate::types::{Coordinate, PositionFix};

/// Location permission as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authorization {
    NotDetermined,
    Denied,
    Restricted,
    Authorized,
}

impl Authorization {
    pub fn is_granted(&self) -> bool {
        matches!(self, Authorization::Authorized)
    }
}

/// Platform location capability
#[async_trait]
pub trait LocationProvider: Send + 'static {
    /// Current permission, without prompting
    fn is_authorized(&self) -> Authorization;

    /// Ask the platform for permission; may prompt the user
    async fn request_authorization(&mut self) -> Authorization;

    /// Wait for the next fix. `None` once the capability is revoked.
    async fn next_fix(&mut self) -> Option<PositionFix>;
}

/// Why a sampler delivers no fixes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradeReason {
    PermissionDenied,
}

impl DegradeReason {
    pub fn to_error(self) -> GhostError {
        match self {
            DegradeReason::PermissionDenied => GhostError::PermissionDenied,
        }
    }
}

/// Outcome of starting a sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerStatus {
    Active,
    Degraded(DegradeReason),
}

struct Running {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// One-shot, cancelable stream of fixes from a [`LocationProvider`]
pub struct GeoSampler {
    provider: Option<Box<dyn LocationProvider>>,
    distance_filter_meters: f64,
    running: Option<Running>,
}

impl GeoSampler {
    pub fn new(provider: Box<dyn LocationProvider>, distance_filter_meters: f64) -> Self {
        Self {
            provider: Some(provider),
            distance_filter_meters,
            running: None,
        }
    }

    /// Begin delivering fixes to `callback`.
    ///
    /// Requests permission first if it has not been decided. Fixes closer than
    /// the distance filter to the previously delivered fix are dropped.
    pub async fn start<F>(&mut self, mut callback: F) -> Result<SamplerStatus, GhostError>
    where
        F: FnMut(PositionFix) + Send + 'static,
    {
        let mut provider = self.provider.take().ok_or_else(|| {
            GhostError::InvalidState("a sampler cannot be restarted".to_string())
        })?;

        let mut authorization = provider.is_authorized();
        if authorization == Authorization::NotDetermined {
            authorization = provider.request_authorization().await;
        }
        if !authorization.is_granted() {
            log::warn!("location access {authorization:?}; tracking without fixes");
            return Ok(SamplerStatus::Degraded(DegradeReason::PermissionDenied));
        }

        let filter = self.distance_filter_meters;
        let (cancel, mut cancelled) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut last: Option<Coordinate> = None;
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.changed() => break,
                    fix = provider.next_fix() => match fix {
                        Some(fix) => {
                            let point = fix.coordinate();
                            let far_enough = last
                                .map(|prev| geo::haversine_meters(prev, point) >= filter)
                                .unwrap_or(true);
                            if far_enough {
                                last = Some(point);
                                callback(fix);
                            }
                        }
                        None => {
                            log::warn!("location provider stopped delivering fixes");
                            break;
                        }
                    },
                }
            }
        });

        log::info!("location sampling started (filter {filter} m)");
        self.running = Some(Running { cancel, handle });
        Ok(SamplerStatus::Active)
    }

    /// Stop delivering fixes. Once this returns the callback is never invoked again.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        let _ = running.cancel.send(true);
        if let Err(e) = running.handle.await {
            log::error!("location sampling task failed: {e}");
        }
        log::info!("location sampling stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }
}

impl Drop for GeoSampler {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.handle.abort();
        }
    }
}

/// Provider fed through a channel, for platform shells that push fixes
pub struct ChannelProvider {
    authorization: Authorization,
    on_request: Authorization,
    fixes: mpsc::UnboundedReceiver<PositionFix>,
}

impl ChannelProvider {
    /// Create a provider with the given permission state and the sender that feeds it
    pub fn new(authorization: Authorization) -> (mpsc::UnboundedSender<PositionFix>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let on_request = match authorization {
            Authorization::NotDetermined => Authorization::Authorized,
            other => other,
        };
        (
            tx,
            Self {
                authorization,
                on_request,
                fixes: rx,
            },
        )
    }

    /// Permission the user will answer with when prompted
    pub fn answer_prompt_with(mut self, answer: Authorization) -> Self {
        self.on_request = answer;
        self
    }
}

#[async_trait]
impl LocationProvider for ChannelProvider {
    fn is_authorized(&self) -> Authorization {
        self.authorization
    }

    async fn request_authorization(&mut self) -> Authorization {
        self.authorization = self.on_request;
        self.authorization
    }

    async fn next_fix(&mut self) -> Option<PositionFix> {
        self.fixes.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn fix(lat: f64, lng: f64) -> PositionFix {
        PositionFix::new(lat, lng, Utc::now(), 1.0)
    }

    fn collector() -> (Arc<Mutex<Vec<PositionFix>>>, impl FnMut(PositionFix) + Send + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |fix| sink.lock().unwrap().push(fix))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_delivers_fixes_in_order() {
        let (tx, provider) = ChannelProvider::new(Authorization::Authorized);
        let mut sampler = GeoSampler::new(Box::new(provider), 0.0);
        let (seen, callback) = collector();

        let status = sampler.start(callback).await.unwrap();
        assert_eq!(status, SamplerStatus::Active);

        for i in 0..3 {
            tx.send(fix(10.0 + i as f64, 0.0)).unwrap();
        }
        settle().await;
        sampler.stop().await;

        let lats: Vec<f64> = seen.lock().unwrap().iter().map(|f| f.latitude).collect();
        assert_eq!(lats, vec![10.0, 11.0, 12.0]);
    }

    #[tokio::test]
    async fn test_distance_filter_drops_jitter() {
        let (tx, provider) = ChannelProvider::new(Authorization::Authorized);
        let mut sampler = GeoSampler::new(Box::new(provider), 5.0);
        let (seen, callback) = collector();
        sampler.start(callback).await.unwrap();

        // ~1.1 m apart, then ~111 m away
        tx.send(fix(37.0, -122.0)).unwrap();
        tx.send(fix(37.00001, -122.0)).unwrap();
        tx.send(fix(37.001, -122.0)).unwrap();
        settle().await;
        sampler.stop().await;

        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_no_delivery_after_stop() {
        let (tx, provider) = ChannelProvider::new(Authorization::Authorized);
        let mut sampler = GeoSampler::new(Box::new(provider), 0.0);
        let (seen, callback) = collector();
        sampler.start(callback).await.unwrap();

        tx.send(fix(1.0, 1.0)).unwrap();
        settle().await;
        sampler.stop().await;
        sampler.stop().await;
        assert!(!sampler.is_running());

        let _ = tx.send(fix(2.0, 2.0));
        settle().await;
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_denied_permission_is_degraded() {
        let (tx, provider) = ChannelProvider::new(Authorization::Denied);
        let mut sampler = GeoSampler::new(Box::new(provider), 0.0);
        let (seen, callback) = collector();

        let status = sampler.start(callback).await.unwrap();
        assert_eq!(status, SamplerStatus::Degraded(DegradeReason::PermissionDenied));
        assert!(!sampler.is_running());

        let _ = tx.send(fix(1.0, 1.0));
        settle().await;
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prompts_when_undetermined() {
        let (_tx, provider) = ChannelProvider::new(Authorization::NotDetermined);
        let provider = provider.answer_prompt_with(Authorization::Denied);
        let mut sampler = GeoSampler::new(Box::new(provider), 0.0);

        let status = sampler.start(|_| {}).await.unwrap();
        assert_eq!(status, SamplerStatus::Degraded(DegradeReason::PermissionDenied));
    }

    #[tokio::test]
    async fn test_cannot_restart() {
        let (_tx, provider) = ChannelProvider::new(Authorization::Authorized);
        let mut sampler = GeoSampler::new(Box::new(provider), 0.0);

        sampler.start(|_| {}).await.unwrap();
        sampler.stop().await;

        let again = sampler.start(|_| {}).await;
        assert!(matches!(again, Err(GhostError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_revoked_capability_ends_stream() {
        let (tx, provider) = ChannelProvider::new(Authorization::Authorized);
        let mut sampler = GeoSampler::new(Box::new(provider), 0.0);
        let (seen, callback) = collector();
        sampler.start(callback).await.unwrap();

        tx.send(fix(1.0, 1.0)).unwrap();
        drop(tx);
        settle().await;
        sampler.stop().await;

        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
