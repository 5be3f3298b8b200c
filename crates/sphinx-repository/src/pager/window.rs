//! Pages materialized by the pager, bounded by `max_size` rows.

use std::collections::BTreeMap;

use super::source::{Cursor, Page};
use crate::dashboard::DashboardItem;

#[derive(Debug)]
struct CachedPage {
    page: Page,
    last_access: u64,
}

impl CachedPage {
    fn len(&self) -> u64 {
        self.page.items.len() as u64
    }

    /// Steps from `position` to the nearest row of the page; zero inside it.
    fn distance_to(&self, position: u64) -> u64 {
        let start = self.page.offset;
        let end = self.page.end();
        if position < start {
            start - position
        } else if position >= end {
            position + 1 - end.max(start + 1)
        } else {
            0
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct PageWindow {
    pages: BTreeMap<u64, CachedPage>,
    rows: usize,
    clock: u64,
}

impl PageWindow {
    pub(crate) fn clear(&mut self) {
        self.pages.clear();
        self.rows = 0;
    }

    pub(crate) fn insert(&mut self, page: Page) {
        self.clock += 1;
        let rows = page.items.len();
        if let Some(old) = self.pages.insert(
            page.offset,
            CachedPage {
                page,
                last_access: self.clock,
            },
        ) {
            self.rows -= old.page.items.len();
        }
        self.rows += rows;
    }

    /// Mark the page holding `position` as just used.
    pub(crate) fn touch(&mut self, position: u64) {
        self.clock += 1;
        let clock = self.clock;
        if let Some(cached) = self
            .pages
            .values_mut()
            .find(|cached| cached.distance_to(position) == 0)
        {
            cached.last_access = clock;
        }
    }

    /// Drop pages until at most `max_rows` remain, farthest from `viewport`
    /// first and least recently used among equally far pages. The page at
    /// `keep` is never evicted. Returns the evicted offsets.
    pub(crate) fn evict(&mut self, max_rows: usize, viewport: u64, keep: u64) -> Vec<u64> {
        let mut evicted = Vec::new();

        while self.rows > max_rows {
            let victim = self
                .pages
                .iter()
                .filter(|(offset, _)| **offset != keep)
                .max_by(|(_, a), (_, b)| {
                    a.distance_to(viewport)
                        .cmp(&b.distance_to(viewport))
                        .then(b.last_access.cmp(&a.last_access))
                })
                .map(|(offset, _)| *offset);

            let Some(offset) = victim else { break };
            if let Some(removed) = self.pages.remove(&offset) {
                self.rows -= removed.len() as usize;
                evicted.push(offset);
            }
        }

        evicted
    }

    pub(crate) fn rows(&self) -> usize {
        self.rows
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Cached items in list order. Gaps left by eviction are skipped.
    pub(crate) fn items(&self) -> Vec<DashboardItem> {
        self.pages
            .values()
            .flat_map(|cached| cached.page.items.iter().copied())
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn offsets(&self) -> Vec<u64> {
        self.pages.keys().copied().collect()
    }

    /// `(end, next_key)` of the last cached page.
    pub(crate) fn tail(&self) -> Option<(u64, Option<Cursor>)> {
        self.pages
            .values()
            .next_back()
            .map(|cached| (cached.page.end(), cached.page.next_key))
    }

    /// `(offset, prev_key)` of the first cached page.
    pub(crate) fn head(&self) -> Option<(u64, Option<Cursor>)> {
        self.pages
            .values()
            .next()
            .map(|cached| (cached.page.offset, cached.page.prev_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sphinx_shared::{ChatId, MessageId};

    use crate::dashboard::ActiveItem;

    fn page(offset: u64, len: u64) -> Page {
        Page {
            items: (offset..offset + len)
                .map(|i| {
                    DashboardItem::Active(ActiveItem::GroupOrTribe {
                        chat_id: ChatId(i as i64),
                        latest_message_id: Some(MessageId(1000 - i as i64)),
                    })
                })
                .collect(),
            offset,
            prev_key: None,
            next_key: None,
            reset: false,
        }
    }

    #[test]
    fn replacing_a_page_keeps_row_count_exact() {
        let mut window = PageWindow::default();
        window.insert(page(0, 3));
        window.insert(page(0, 2));
        assert_eq!(window.rows(), 2);
    }

    #[test]
    fn evicts_farthest_pages_first() {
        let mut window = PageWindow::default();
        for offset in [0, 10, 20, 30] {
            window.insert(page(offset, 10));
        }

        let evicted = window.evict(25, 35, 30);
        assert_eq!(evicted, vec![0, 10]);
        assert_eq!(window.offsets(), vec![20, 30]);
        assert_eq!(window.rows(), 20);
    }

    #[test]
    fn ties_evict_least_recently_used() {
        let mut window = PageWindow::default();
        window.insert(page(0, 5));
        window.insert(page(10, 5));
        window.insert(page(5, 5));
        window.touch(2);

        // Pages at 0 and 10 are both 3 rows from position 7.
        let evicted = window.evict(10, 7, 5);
        assert_eq!(evicted, vec![10]);
    }

    #[test]
    fn never_evicts_the_kept_page() {
        let mut window = PageWindow::default();
        window.insert(page(0, 50));
        assert!(window.evict(10, 0, 0).is_empty());
        assert_eq!(window.rows(), 50);
    }

    #[test]
    fn distance_is_zero_inside_page() {
        let cached = CachedPage {
            page: page(10, 5),
            last_access: 0,
        };
        assert_eq!(cached.distance_to(12), 0);
        assert_eq!(cached.distance_to(7), 3);
        assert_eq!(cached.distance_to(15), 1);
        assert_eq!(cached.distance_to(20), 6);
    }
}
