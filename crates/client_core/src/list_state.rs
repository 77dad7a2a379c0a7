use std::collections::{BTreeMap, HashSet};

use crate::normalize::Entity;

/// Flat filter key -> value mapping sent with every list read.
pub type Filters = BTreeMap<String, String>;

pub const OFFLINE_MESSAGE: &str = "You appear to be offline. Check your connection, then retry.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListStatus {
    #[default]
    Idle,
    Loading,
    LoadingMore,
    Ready,
    Error,
}

impl ListStatus {
    pub fn is_loading(self) -> bool {
        matches!(self, Self::Loading | Self::LoadingMore)
    }

    /// States in which `items` may be touched.
    pub fn allows_item_edits(self) -> bool {
        matches!(self, Self::Ready | Self::Loading | Self::LoadingMore)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorKind {
    #[default]
    None,
    Network,
    Other,
}

/// Snapshot of one list page's data.
#[derive(Debug, Clone, PartialEq)]
pub struct ListState<T> {
    pub status: ListStatus,
    /// Server order; ids are unique.
    pub items: Vec<T>,
    pub error: Option<String>,
    pub error_kind: ErrorKind,
    pub cursor: Option<String>,
    pub has_more: bool,
}

impl<T> Default for ListState<T> {
    fn default() -> Self {
        Self {
            status: ListStatus::Idle,
            items: Vec::new(),
            error: None,
            error_kind: ErrorKind::None,
            cursor: None,
            has_more: false,
        }
    }
}

impl<T: Entity> ListState<T> {
    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn is_offline(&self) -> bool {
        self.error_kind == ErrorKind::Network
    }

    /// Ready with nothing to show; the UI renders its empty state.
    pub fn is_empty(&self) -> bool {
        self.status == ListStatus::Ready && self.items.is_empty()
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        self.items.iter_mut().find(|item| item.id() == id)
    }

    pub(crate) fn begin_load(&mut self, reset: bool) {
        self.status = if reset {
            ListStatus::Loading
        } else {
            ListStatus::LoadingMore
        };
        self.error = None;
        self.error_kind = ErrorKind::None;
    }

    /// Filter change: nothing from the old query may stay visible.
    pub(crate) fn clear_for_new_query(&mut self) {
        self.items.clear();
        self.cursor = None;
        self.has_more = false;
    }

    pub(crate) fn commit_page(
        &mut self,
        page: Vec<T>,
        cursor: Option<String>,
        has_more: bool,
        reset: bool,
    ) {
        if reset {
            self.items.clear();
        }
        let before = self.items.len();
        let mut seen: HashSet<String> = self.items.iter().map(|item| item.id().to_string()).collect();
        for item in page {
            if seen.insert(item.id().to_string()) {
                self.items.push(item);
            }
        }
        // An append that adds nothing new cannot make progress.
        let stalled = !reset && self.items.len() == before;
        self.cursor = cursor;
        self.has_more = has_more && !stalled;
        self.status = ListStatus::Ready;
        self.error = None;
        self.error_kind = ErrorKind::None;
    }

    /// A fresh load failure clears the list; a continuation failure keeps the
    /// pages already shown along with the cursor needed to retry.
    pub(crate) fn fail(&mut self, message: String, kind: ErrorKind, reset: bool) {
        if reset {
            self.clear_for_new_query();
        }
        self.status = ListStatus::Error;
        self.error = Some(message);
        self.error_kind = kind;
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<(usize, T)> {
        let index = self.items.iter().position(|item| item.id() == id)?;
        Some((index, self.items.remove(index)))
    }

    pub(crate) fn replace(&mut self, item: T) -> bool {
        match self.get_mut(item.id()) {
            Some(slot) => {
                *slot = item;
                true
            }
            None => false,
        }
    }
}
