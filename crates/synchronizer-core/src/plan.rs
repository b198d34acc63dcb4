use crate::git::{
    all_tags_push_refspec, branch_delete_refspec, branch_push_refspec, tag_delete_refspec,
};
use crate::refs::RefSet;
use crate::retry::RetryBudgets;
use std::collections::BTreeSet;
use std::time::Duration;

/// What a worker pushes to and deletes from the destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub push_branches: BTreeSet<String>,
    pub push_tags: BTreeSet<String>,
    pub delete_branches: BTreeSet<String>,
    pub delete_tags: BTreeSet<String>,
}

/// Every source ref is pushed; destination refs missing from the source are
/// deleted.
pub fn plan(source: &RefSet, destination: &RefSet) -> SyncPlan {
    SyncPlan {
        push_branches: source.branches().clone(),
        push_tags: source.tags().clone(),
        delete_branches: destination
            .branches()
            .difference(source.branches())
            .cloned()
            .collect(),
        delete_tags: destination
            .tags()
            .difference(source.tags())
            .cloned()
            .collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefOperation {
    PushBranch(String),
    /// All tags go out in one wildcard push.
    PushAllTags,
    DeleteBranch(String),
    DeleteTag(String),
}

impl RefOperation {
    pub fn refspec(&self) -> String {
        match self {
            RefOperation::PushBranch(branch) => branch_push_refspec(branch),
            RefOperation::PushAllTags => all_tags_push_refspec(),
            RefOperation::DeleteBranch(branch) => branch_delete_refspec(branch),
            RefOperation::DeleteTag(tag) => tag_delete_refspec(tag),
        }
    }

    /// Phrase used in logs and error messages, completed by the URL.
    pub fn activity(&self) -> String {
        match self {
            RefOperation::PushBranch(branch) => format!("pushing branch {branch} to"),
            RefOperation::PushAllTags => "pushing all tags to".to_string(),
            RefOperation::DeleteBranch(branch) => format!("removing branch {branch} from"),
            RefOperation::DeleteTag(tag) => format!("removing tag {tag} from"),
        }
    }

    pub fn budget(&self, budgets: &RetryBudgets) -> Duration {
        match self {
            RefOperation::PushBranch(_) => budgets.push_branch,
            RefOperation::PushAllTags => budgets.push_tags,
            RefOperation::DeleteBranch(_) | RefOperation::DeleteTag(_) => budgets.delete,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, RefOperation::DeleteBranch(_) | RefOperation::DeleteTag(_))
    }
}

impl SyncPlan {
    /// Pushes first, then deletions. Each entry is retried and reported on
    /// its own.
    pub fn operations(&self) -> Vec<RefOperation> {
        let mut operations: Vec<RefOperation> = self
            .push_branches
            .iter()
            .cloned()
            .map(RefOperation::PushBranch)
            .collect();
        operations.push(RefOperation::PushAllTags);
        operations.extend(self.delete_branches.iter().cloned().map(RefOperation::DeleteBranch));
        operations.extend(self.delete_tags.iter().cloned().map(RefOperation::DeleteTag));
        operations
    }
}
