use crate::orchestration::types::{EpochMs, SubagentStatus, TrackedSubagent};

/// Predicates for [`super::PersistenceManager::get_all_tasks`].
///
/// Every `Some` field must match; `None` fields are ignored. Time bounds are
/// inclusive and apply to `created_at`.
#[derive(Clone, Debug, Default)]
pub struct TaskFilter {
    pub statuses: Option<Vec<SubagentStatus>>,
    pub session_id: Option<String>,
    pub run_in_background: Option<bool>,
    pub subagent_type: Option<String>,
    pub created_after: Option<EpochMs>,
    pub created_before: Option<EpochMs>,
}

impl TaskFilter {
    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = SubagentStatus>) -> Self {
        self.statuses = Some(statuses.into_iter().collect());
        self
    }

    pub fn in_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn background(mut self, run_in_background: bool) -> Self {
        self.run_in_background = Some(run_in_background);
        self
    }

    pub fn of_type(mut self, subagent_type: impl Into<String>) -> Self {
        self.subagent_type = Some(subagent_type.into());
        self
    }

    pub fn created_between(mut self, after: Option<EpochMs>, before: Option<EpochMs>) -> Self {
        self.created_after = after;
        self.created_before = before;
        self
    }

    pub fn matches(&self, task: &TrackedSubagent) -> bool {
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&task.status) {
                return false;
            }
        }
        if let Some(session) = &self.session_id {
            if &task.parent_session_id != session {
                return false;
            }
        }
        if let Some(bg) = self.run_in_background {
            if task.run_in_background != bg {
                return false;
            }
        }
        if let Some(kind) = &self.subagent_type {
            if &task.subagent_type != kind {
                return false;
            }
        }
        if self.created_after.is_some_and(|after| task.created_at < after) {
            return false;
        }
        if self.created_before.is_some_and(|before| task.created_at > before) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::types::SubagentInput;

    fn task(session: &str, kind: &str, background: bool, created_at: EpochMs) -> TrackedSubagent {
        let input = SubagentInput {
            subagent_type: kind.into(),
            run_in_background: background,
            ..Default::default()
        };
        let mut t = TrackedSubagent::pending("t".into(), session.into(), &input, None);
        t.created_at = created_at;
        t
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(TaskFilter::default().matches(&task("s", "explore", false, 10)));
    }

    #[test]
    fn predicates_compose() {
        let filter = TaskFilter::default()
            .in_session("s1")
            .of_type("explore")
            .background(true)
            .with_statuses([SubagentStatus::Pending]);

        assert!(filter.matches(&task("s1", "explore", true, 10)));
        assert!(!filter.matches(&task("s2", "explore", true, 10)));
        assert!(!filter.matches(&task("s1", "plan", true, 10)));
        assert!(!filter.matches(&task("s1", "explore", false, 10)));
    }

    #[test]
    fn time_bounds_are_inclusive() {
        let filter = TaskFilter::default().created_between(Some(100), Some(200));
        assert!(filter.matches(&task("s", "x", false, 100)));
        assert!(filter.matches(&task("s", "x", false, 200)));
        assert!(!filter.matches(&task("s", "x", false, 99)));
        assert!(!filter.matches(&task("s", "x", false, 201)));
    }
}
