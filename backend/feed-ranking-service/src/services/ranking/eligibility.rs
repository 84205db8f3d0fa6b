/// Candidate eligibility gate
///
/// Re-checked in the engine even though the Content Store query already
/// filters, so a store that over-fetches never leaks posts.
use chrono::Duration;

use super::scorer::ViewerContext;
use crate::models::{Post, Visibility};

pub fn is_eligible(post: &Post, ctx: &ViewerContext, window: Duration) -> bool {
    if !post.is_active {
        return false;
    }
    if post.created_at < ctx.now - window {
        return false;
    }
    if post.author_id == ctx.viewer_id || ctx.blocked.contains(&post.author_id) {
        return false;
    }

    match post.visibility {
        Visibility::Public => true,
        Visibility::Friends => ctx.friends.contains(&post.author_id),
        Visibility::Private => false,
    }
}
