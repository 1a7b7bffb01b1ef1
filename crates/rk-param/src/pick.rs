//! Picks and pick resolution
//!
//! A [`Pick`] is a captured reference to a sub-shape of some feature. It
//! carries a devolved [`HistorySlice`] so it can be re-resolved after the
//! model regenerates, even when the picked sub-shape was renamed.

use glam::Vec2;
use rk_kernel::{ShapeHandle, ShapeKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::history::{HistorySlice, ShapeHistory};
use crate::id::{FeatureId, Identifier};
use crate::payload::UpdatePayload;

/// Why a pick could not be resolved
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PickError {
    #[error("Selection is ambiguous: {} candidates in feature {feature}", .candidates.len())]
    Ambiguous {
        feature: FeatureId,
        candidates: Vec<Identifier>,
    },

    #[error("Selection {id} was deleted by feature {feature}")]
    Deleted { feature: FeatureId, id: Identifier },

    #[error("Selection {id} not found in feature {feature}")]
    NotFound { feature: FeatureId, id: Identifier },
}

/// Captured reference to a sub-shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pick {
    /// Feature whose result was picked
    pub feature: FeatureId,
    /// Picked identifier, nil for the whole shape
    pub id: Identifier,
    /// Input role this pick serves
    pub tag: String,
    /// Surface or curve coordinates of the pick point
    #[serde(default)]
    pub parameter: Option<Vec2>,
    /// Trace back to the picked sub-shape's origins
    #[serde(default)]
    pub history: HistorySlice,
}

impl Pick {
    /// Pick the whole result of a feature
    pub fn whole(feature: FeatureId, tag: impl Into<String>) -> Self {
        Self {
            feature,
            id: Identifier::NIL,
            tag: tag.into(),
            parameter: None,
            history: HistorySlice::default(),
        }
    }

    /// Pick one sub-shape, capturing its history now
    pub fn capture(
        history: &ShapeHistory,
        feature: FeatureId,
        id: Identifier,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            feature,
            id,
            tag: tag.into(),
            parameter: None,
            history: history.devolve_history(feature, id),
        }
    }

    pub fn with_parameter(mut self, parameter: Vec2) -> Self {
        self.parameter = Some(parameter);
        self
    }

    pub fn is_whole_shape(&self) -> bool {
        self.id.is_nil()
    }

    /// Point this pick at `to` once `from` is gone.
    ///
    /// The identifier becomes the one `to` had in the captured trace. When the
    /// trace never passed through `to` the old identifier stays, so the pick
    /// fails to resolve instead of widening to the whole shape.
    pub fn retarget(&mut self, from: FeatureId, to: FeatureId) -> bool {
        if self.feature != from {
            return false;
        }
        self.feature = to;
        if let Some(id) = self.history.id_in(to) {
            if !self.id.is_nil() {
                self.id = id;
            }
        }
        self.history.forget(from);
        true
    }
}

/// A pick mapped onto a current result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub feature: FeatureId,
    pub id: Identifier,
    pub shape: ShapeHandle,
    pub kind: ShapeKind,
}

/// Resolves picks against the inputs of one regeneration
pub struct Resolver<'a, 'p> {
    payload: &'p UpdatePayload<'a>,
}

impl<'a, 'p> Resolver<'a, 'p> {
    pub fn new(payload: &'p UpdatePayload<'a>) -> Self {
        Self { payload }
    }

    pub fn resolve(&self, pick: &Pick) -> Result<Resolved, PickError> {
        let not_found = || PickError::NotFound {
            feature: pick.feature,
            id: pick.id,
        };
        let feature = self.payload.feature(pick.feature).ok_or_else(not_found)?;
        let store = feature.store();
        if feature.is_failed() || store.is_null() {
            return Err(not_found());
        }

        let id = if pick.is_whole_shape() {
            store.root()
        } else if pick.history.is_empty() {
            pick.id
        } else {
            self.payload
                .history()
                .resolve_forward(&pick.history, pick.feature)?
        };

        let shape = store.shape_of(id).ok_or_else(not_found)?;
        let kind = store
            .topology()
            .and_then(|t| t.kind(shape))
            .ok_or_else(not_found)?;
        Ok(Resolved {
            feature: pick.feature,
            id,
            shape,
            kind,
        })
    }

    /// Resolve every pick, collecting soft failures instead of stopping
    pub fn resolve_all<'q>(
        &self,
        picks: impl IntoIterator<Item = &'q Pick>,
    ) -> (Vec<Resolved>, Vec<PickError>) {
        let mut resolved = Vec::new();
        let mut failures = Vec::new();
        for pick in picks {
            match self.resolve(pick) {
                Ok(r) => resolved.push(r),
                Err(e) => {
                    tracing::warn!("Pick on feature {} ({}) failed: {}", pick.feature, pick.tag, e);
                    failures.push(e);
                }
            }
        }
        (resolved, failures)
    }
}
