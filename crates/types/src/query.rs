use serde::{Deserialize, Serialize};

use crate::{AuditStatus, ExecStatus, TaskAction};

/// 1-based page request. A size of 0 returns everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub index: usize,
    pub size: usize,
}

impl Page {
    pub fn new(index: usize, size: usize) -> Self {
        Self { index, size }
    }

    pub fn all() -> Self {
        Self { index: 1, size: 0 }
    }

    /// Items skipped before this page; saturates instead of overflowing on huge indexes
    pub fn offset(&self) -> usize {
        self.index.saturating_sub(1).saturating_mul(self.size)
    }

    /// Apply this page to an already-filtered, ordered list
    pub fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        if self.size == 0 {
            return items;
        }
        items
            .into_iter()
            .skip(self.offset())
            .take(self.size)
            .collect()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::all()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    /// Number of matches before paging
    pub total: usize,
}

/// Task listing filter; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskFilter {
    pub instance_name: Option<String>,
    pub schema: Option<String>,
    pub action: Option<TaskAction>,
}

impl TaskFilter {
    pub fn with_instance(mut self, instance_name: impl Into<String>) -> Self {
        self.instance_name = Some(instance_name.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_action(mut self, action: TaskAction) -> Self {
        self.action = Some(action);
        self
    }
}

/// Commit statement listing filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementFilter {
    pub exec_status: Option<ExecStatus>,
    pub audit_status: Option<AuditStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_slice() {
        let items: Vec<u32> = (1..=7).collect();
        assert_eq!(Page::new(1, 3).slice(items.clone()), vec![1, 2, 3]);
        assert_eq!(Page::new(3, 3).slice(items.clone()), vec![7]);
        assert_eq!(Page::new(4, 3).slice(items.clone()), Vec::<u32>::new());
        assert_eq!(Page::all().slice(items.clone()), items);
    }

    #[test]
    fn test_page_zero_index_is_first_page() {
        assert_eq!(Page::new(0, 5).offset(), 0);
    }

    #[test]
    fn test_page_far_past_end_is_empty() {
        let page = Page::new(usize::MAX / 2, 4);
        assert_eq!(page.offset(), usize::MAX);
        assert_eq!(page.slice(vec![1, 2, 3]), Vec::<u32>::new());
        assert_eq!(Page::new(usize::MAX, usize::MAX).offset(), usize::MAX);
    }
}
