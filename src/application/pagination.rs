//! Offset pagination window shared by feed reads.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// A clamped `limit`/`offset` pair. The clamped values are also what the
/// feed cache key is built from, so equivalent requests share an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageWindow {
    limit: u32,
    offset: u32,
}

impl PageWindow {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        let limit = limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT);
        Self {
            limit,
            offset: offset.unwrap_or(0),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Number of leading rows each sorted source must yield for the window.
    pub fn bound(&self) -> u64 {
        u64::from(self.offset) + u64::from(self.limit)
    }
}

impl Default for PageWindow {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped() {
        assert_eq!(PageWindow::new(Some(0), None).limit(), 1);
        assert_eq!(PageWindow::new(Some(500), None).limit(), MAX_PAGE_LIMIT);
        assert_eq!(PageWindow::new(None, None).limit(), DEFAULT_PAGE_LIMIT);
        assert_eq!(PageWindow::new(Some(7), Some(3)).offset(), 3);
    }

    #[test]
    fn bound_covers_offset_plus_limit() {
        let window = PageWindow::new(Some(10), Some(20));
        assert_eq!(window.bound(), 30);
        assert_eq!(PageWindow::new(Some(10), Some(u32::MAX)).bound(), u64::from(u32::MAX) + 10);
    }
}
