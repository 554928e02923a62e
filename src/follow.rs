use tracing::{error, info};

use crate::api::SocioApi;
use crate::core::errors::{ClientError, ClientResult};
use crate::models::models::{Person, Profile};

/// Whether `viewer` appears among `profile`'s followers.
pub fn is_following(profile: &Profile, viewer: &str) -> bool {
    profile.followers.iter().any(|p| p.username == viewer)
}

pub fn followers(profile: &Profile) -> &[Person] {
    &profile.followers
}

pub fn followings(profile: &Profile) -> &[Person] {
    &profile.following
}

/// One round trip that flips the follow relationship; returns the new state.
pub async fn toggle_follow<A: SocioApi>(api: &A, viewer: &str, target: &Profile) -> ClientResult<bool> {
    if target.username == viewer {
        return Err(ClientError::validation("You cannot follow yourself"));
    }
    if target.uid.is_empty() {
        return Err(ClientError::validation("Profile is not loaded yet"));
    }

    match api.follow(&target.uid).await {
        Ok(resp) => {
            let following = resp.is_following();
            info!(viewer, target = %target.username, following, "follow toggled");
            Ok(following)
        }
        Err(err) => {
            error!(error = %err, target = %target.username, "follow error");
            Err(err)
        }
    }
}
