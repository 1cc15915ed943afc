//! Dependency-gated story selection.
//!
//! The resolver picks the next eligible user story given the declared
//! dependency edges and the set of completed story ids. Selection is purely
//! positional: the first eligible story in declaration order wins, with no
//! priority reordering.
//!
//! `select_next` alone cannot distinguish "all done" from "stuck"; callers
//! pair it with `all_terminal` to classify a `None` result.

use crate::prd::Subtask;
use std::collections::HashSet;

/// Select the next eligible story, or `None` if no story qualifies.
///
/// A story is eligible when:
/// - its id is not in `completed_ids`
/// - its status is not terminal (`completed`/`failed`)
/// - every dependency id is in `completed_ids`
pub fn select_next<'a>(
    stories: &'a [Subtask],
    completed_ids: &HashSet<String>,
) -> Option<&'a Subtask> {
    stories.iter().find(|story| {
        !completed_ids.contains(&story.id)
            && !story.status.is_terminal()
            && story
                .dependencies
                .iter()
                .all(|dep| completed_ids.contains(dep))
    })
}

/// Whether every story has reached a terminal state.
///
/// A story counts as terminal when its status is `completed`/`failed` or
/// its id appears in `completed_ids`.
pub fn all_terminal(stories: &[Subtask], completed_ids: &HashSet<String>) -> bool {
    stories
        .iter()
        .all(|story| story.status.is_terminal() || completed_ids.contains(&story.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prd::SubtaskStatus;

    fn story(id: &str, deps: &[&str]) -> Subtask {
        Subtask {
            id: id.to_string(),
            title: format!("Story {}", id),
            status: SubtaskStatus::Pending,
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            repos: Vec::new(),
            acceptance_criteria: Vec::new(),
            commits: Vec::new(),
            passes: false,
            notes: String::new(),
        }
    }

    fn completed(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn selects_first_story_with_no_dependencies() {
        let stories = vec![story("A", &[]), story("B", &["A"]), story("C", &["A"])];
        let next = select_next(&stories, &completed(&[])).unwrap();
        assert_eq!(next.id, "A");
    }

    #[test]
    fn declaration_order_breaks_ties() {
        // B and C both become eligible once A completes; B is declared
        // earlier so B wins.
        let stories = vec![story("A", &[]), story("B", &["A"]), story("C", &["A"])];
        let next = select_next(&stories, &completed(&["A"])).unwrap();
        assert_eq!(next.id, "B");
    }

    #[test]
    fn never_selects_completed_story() {
        let stories = vec![story("A", &[]), story("B", &["A"])];
        let done = completed(&["A", "B"]);
        assert!(select_next(&stories, &done).is_none());
    }

    #[test]
    fn never_selects_story_with_unmet_dependency() {
        let stories = vec![story("B", &["A"])];
        assert!(select_next(&stories, &completed(&[])).is_none());
    }

    #[test]
    fn skips_terminal_statuses() {
        let mut failed = story("A", &[]);
        failed.status = SubtaskStatus::Failed;
        let stories = vec![failed, story("B", &[])];

        let next = select_next(&stories, &completed(&[])).unwrap();
        assert_eq!(next.id, "B");
    }

    #[test]
    fn blocked_story_remains_selectable() {
        // blocked is not terminal; a resume may retry it
        let mut blocked = story("A", &[]);
        blocked.status = SubtaskStatus::Blocked;
        let stories = vec![blocked];

        let next = select_next(&stories, &completed(&[])).unwrap();
        assert_eq!(next.id, "A");
    }

    #[test]
    fn all_terminal_with_completed_ids() {
        let stories = vec![story("A", &[]), story("B", &["A"])];
        assert!(!all_terminal(&stories, &completed(&["A"])));
        assert!(all_terminal(&stories, &completed(&["A", "B"])));
    }

    #[test]
    fn all_terminal_with_failed_status() {
        let mut failed = story("B", &["A"]);
        failed.status = SubtaskStatus::Failed;
        let stories = vec![story("A", &[]), failed];
        assert!(all_terminal(&stories, &completed(&["A"])));
    }

    #[test]
    fn none_plus_non_terminal_means_stuck() {
        // C depends on a failed story: no selection, but not all terminal
        let mut failed = story("A", &[]);
        failed.status = SubtaskStatus::Failed;
        let stories = vec![failed, story("C", &["A"])];

        assert!(select_next(&stories, &completed(&[])).is_none());
        assert!(!all_terminal(&stories, &completed(&[])));
    }
}
