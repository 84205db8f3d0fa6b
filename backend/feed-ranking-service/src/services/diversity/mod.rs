use std::collections::HashMap;
use uuid::Uuid;

use crate::models::ContentType;
use crate::services::ranking::ScoredCandidate;

/// Diversity Layer
///
/// One greedy pass over a score-descending list. Counters cover selected
/// posts only:
/// - an author with `max_per_author` selected posts is skipped
/// - once `type_check_after` posts are selected, a candidate whose content
///   type already holds more than `max_type_share` of the selection is skipped
/// - selection stops at `max_selected`
pub struct DiversityLayer {
    max_per_author: usize,
    max_type_share: f64,
    type_check_after: usize,
    max_selected: usize,
}

impl Default for DiversityLayer {
    fn default() -> Self {
        Self {
            max_per_author: 3,
            max_type_share: 0.3,
            type_check_after: 10,
            max_selected: 100,
        }
    }
}

impl DiversityLayer {
    /// Create with custom per-author cap
    pub fn with_author_limit(max_per_author: usize) -> Self {
        Self {
            max_per_author,
            ..Default::default()
        }
    }

    pub fn rerank(&self, ranked: Vec<ScoredCandidate>) -> Vec<ScoredCandidate> {
        let mut selected: Vec<ScoredCandidate> = Vec::new();
        let mut per_author: HashMap<Uuid, usize> = HashMap::new();
        let mut per_type: HashMap<ContentType, usize> = HashMap::new();

        for candidate in ranked {
            if selected.len() >= self.max_selected {
                break;
            }

            let author_count = per_author.get(&candidate.post.author_id).copied().unwrap_or(0);
            if author_count >= self.max_per_author {
                continue;
            }

            if selected.len() >= self.type_check_after {
                let type_count = per_type.get(&candidate.content_type).copied().unwrap_or(0);
                let share = type_count as f64 / selected.len() as f64;
                if share > self.max_type_share {
                    continue;
                }
            }

            *per_author.entry(candidate.post.author_id).or_insert(0) += 1;
            *per_type.entry(candidate.content_type).or_insert(0) += 1;
            selected.push(candidate);
        }

        selected
    }
}
