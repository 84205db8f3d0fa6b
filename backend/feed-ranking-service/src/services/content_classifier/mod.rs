// ============================================
// Content Classifier
// ============================================
//
// Maps a post to one coarse ContentType. Used for preference matching in the
// relevance score and for the type-share rule in diversification.
//
// Precedence: media > location > long text > short text

use crate::models::{ContentType, Post};

/// Posts longer than this many characters are long text
pub const LONG_TEXT_THRESHOLD: usize = 200;

pub fn classify(post: &Post) -> ContentType {
    if post.has_media() {
        ContentType::Media
    } else if post.location.is_some() {
        ContentType::Location
    } else if post.content.chars().count() > LONG_TEXT_THRESHOLD {
        ContentType::LongText
    } else {
        ContentType::ShortText
    }
}
