use serde::{Deserialize, Serialize};

/// FIFO of waiting player names; a name appears at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WaitQueue {
    names: Vec<String>,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `name` unless already queued. Returns its 1-based position.
    pub fn push_unique(&mut self, name: &str) -> usize {
        if let Some(index) = self.index_of(name) {
            return index + 1;
        }
        self.names.push(name.to_string());
        self.names.len()
    }

    pub fn pop_front(&mut self) -> Option<String> {
        if self.names.is_empty() {
            None
        } else {
            Some(self.names.remove(0))
        }
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.names.len();
        self.names.retain(|n| n != name);
        self.names.len() != before
    }

    pub fn head(&self) -> Option<&str> {
        self.names.first().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// 1-based position of `name`
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index_of(name).map(|i| i + 1)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

impl From<Vec<&str>> for WaitQueue {
    fn from(names: Vec<&str>) -> Self {
        let mut queue = WaitQueue::new();
        for name in names {
            queue.push_unique(name);
        }
        queue
    }
}
