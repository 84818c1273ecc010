//! Social graph resolution: which members' logs make up a viewer's feed.

use crate::error::Result;
use crate::retry::RetryPolicy;
use crate::types::{MemberId, Profile};
use async_trait::async_trait;
use tracing::{debug, info};

/// One-shot profile reads.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Read a profile; `Ok(None)` when the document does not exist.
    async fn read_profile(&self, id: &MemberId) -> Result<Option<Profile>>;
}

/// The resolved set of members for one viewer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SocialGraph {
    pub viewer: Option<MemberId>,
    /// Viewer's display name, when the profile exists.
    pub viewer_display_name: Option<String>,
    /// Viewer first, then followees in stored order, without duplicates.
    pub members: Vec<MemberId>,
}

impl SocialGraph {
    /// Graph for a viewer whose profile is missing.
    pub fn empty(viewer: MemberId) -> Self {
        Self {
            viewer: Some(viewer),
            viewer_display_name: None,
            members: Vec::new(),
        }
    }

    /// Build the member set `{viewer} ∪ followees`.
    pub fn from_profile(viewer: MemberId, profile: Profile) -> Self {
        let mut members = vec![viewer.clone()];
        for followee in profile.followee_ids {
            if !members.contains(&followee) {
                members.push(followee);
            }
        }

        Self {
            viewer: Some(viewer),
            viewer_display_name: Some(profile.display_name),
            members,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }
}

/// Resolve the viewer's social graph with a single profile read.
///
/// A missing profile (or a `NotFound` error) resolves to an empty graph.
/// Transient failures are retried per `retry`; anything else propagates.
pub async fn resolve_members(
    profiles: &dyn ProfileStore,
    viewer: &MemberId,
    retry: &RetryPolicy,
) -> Result<SocialGraph> {
    let read = retry
        .run("read_profile", move || profiles.read_profile(viewer))
        .await;

    let profile = match read {
        Ok(Some(profile)) => profile,
        Ok(None) => {
            info!(viewer = %viewer, "Viewer profile not found, feed is empty");
            return Ok(SocialGraph::empty(viewer.clone()));
        }
        Err(e) if e.is_not_found() => {
            info!(viewer = %viewer, "Viewer profile not found, feed is empty");
            return Ok(SocialGraph::empty(viewer.clone()));
        }
        Err(e) => return Err(e),
    };

    let graph = SocialGraph::from_profile(viewer.clone(), profile);
    debug!(viewer = %viewer, members = graph.len(), "Resolved social graph");
    Ok(graph)
}
