//! Feature reprojection to WGS84 longitude/latitude.

use crate::core::error::Result;
use crate::core::geometry::Feature;
use crate::crs::system::CoordinateSystem;
use crate::crs::transform::CoordinateTransform;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// What happens to a run when some geometry cannot be transformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReprojectionPolicy {
    /// Any failure empties the output and yields a single error.
    #[default]
    FailClosed,
    /// Failing features are dropped and reported one error each.
    PartialSuccess,
}

#[derive(Debug, Clone)]
enum EngineState {
    Identity,
    Reprojecting(CoordinateTransform),
}

#[derive(Debug, Default)]
pub struct Reprojected {
    pub features: Vec<Feature>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ReprojectionEngine {
    state: EngineState,
    policy: ReprojectionPolicy,
}

impl ReprojectionEngine {
    /// Picks the source system: `declared` wins over the archive's `.prj`.
    /// With neither, or with a WGS84 lon/lat source, the engine is an
    /// identity.
    pub fn resolve(
        declared: Option<&str>,
        prj_wkt: Option<&str>,
        policy: ReprojectionPolicy,
    ) -> Result<Self> {
        if let Some(wkt) = prj_wkt {
            info!("projection file: {}", wkt.trim());
        }
        let source = match (declared, prj_wkt) {
            (Some(wkt), _) => {
                debug!("using declared source CRS");
                Some(CoordinateSystem::from_wkt(wkt)?)
            }
            (None, Some(wkt)) => Some(CoordinateSystem::from_wkt(wkt)?),
            (None, None) => None,
        };

        let state = match source {
            None => EngineState::Identity,
            Some(crs) => {
                let transform = CoordinateTransform::new(&crs);
                if transform.is_identity() {
                    EngineState::Identity
                } else {
                    info!("reprojecting from {} to WGS84", crs.name());
                    EngineState::Reprojecting(transform)
                }
            }
        };
        Ok(Self { state, policy })
    }

    pub fn is_identity(&self) -> bool {
        matches!(self.state, EngineState::Identity)
    }

    /// Transforms every feature in place. Attributes are never touched.
    pub fn run(&self, features: Vec<Feature>) -> Reprojected {
        let transform = match &self.state {
            EngineState::Identity => {
                return Reprojected {
                    features,
                    errors: Vec::new(),
                }
            }
            EngineState::Reprojecting(t) => t,
        };

        let mut out = Reprojected::default();
        for mut feature in features {
            match feature.geometry.try_map_coords(|c| transform.transform(c)) {
                Ok(()) => out.features.push(feature),
                Err(e) => {
                    let msg = format!("feature {}: {}", feature.geometry_id, e);
                    warn!("reprojection failed: {}", msg);
                    match self.policy {
                        ReprojectionPolicy::FailClosed => {
                            return Reprojected {
                                features: Vec::new(),
                                errors: vec![msg],
                            };
                        }
                        ReprojectionPolicy::PartialSuccess => out.errors.push(msg),
                    }
                }
            }
        }
        out
    }
}
