use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use tracing::debug;

use crate::types::{Cursor, Page};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Next,
    Previous,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub direction: Direction,
    pub cursor: Cursor,
}

#[async_trait]
pub trait PageSource<T>: Send + Sync {
    async fn fetch(&self, request: PageRequest) -> Result<Page<T>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOrder {
    /// Pages in storage order: previous pages first, then the seed, then next pages.
    Fetched,
    /// Storage order reversed page-wise; items inside a page keep their order.
    Reversed,
}

/// Pages fetched in both directions from a server-rendered seed page.
///
/// Overlapping pages are not deduplicated; the server's cursors are trusted.
#[derive(Debug, Clone)]
pub struct InfiniteList<T> {
    pages: VecDeque<Vec<T>>,
    next_cursor: Option<Cursor>,
    prev_cursor: Option<Cursor>,
}

impl<T: Clone> InfiniteList<T> {
    pub fn seeded(page: Page<T>) -> Self {
        let mut pages = VecDeque::new();
        pages.push_back(page.resources);
        Self {
            pages,
            next_cursor: page.next_cursor,
            prev_cursor: page.prev_cursor,
        }
    }

    pub fn has_next(&self) -> bool {
        self.next_cursor.is_some()
    }

    pub fn has_previous(&self) -> bool {
        self.prev_cursor.is_some()
    }

    pub fn next_cursor(&self) -> Option<&Cursor> {
        self.next_cursor.as_ref()
    }

    pub fn prev_cursor(&self) -> Option<&Cursor> {
        self.prev_cursor.as_ref()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn len(&self) -> usize {
        self.pages.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends the next page. Returns `false` without a request when there is no next cursor.
    pub async fn fetch_next<S>(&mut self, source: &S) -> Result<bool>
    where
        S: PageSource<T> + ?Sized,
    {
        let Some(cursor) = self.next_cursor.clone() else {
            return Ok(false);
        };
        debug!("Fetching next page at cursor {}", cursor);

        let page = source
            .fetch(PageRequest {
                direction: Direction::Next,
                cursor,
            })
            .await?;
        self.next_cursor = page.next_cursor;
        self.pages.push_back(page.resources);
        Ok(true)
    }

    /// Prepends the previous page. Returns `false` without a request when there
    /// is no previous cursor.
    pub async fn fetch_previous<S>(&mut self, source: &S) -> Result<bool>
    where
        S: PageSource<T> + ?Sized,
    {
        let Some(cursor) = self.prev_cursor.clone() else {
            return Ok(false);
        };
        debug!("Fetching previous page at cursor {}", cursor);

        let page = source
            .fetch(PageRequest {
                direction: Direction::Previous,
                cursor,
            })
            .await?;
        self.prev_cursor = page.prev_cursor;
        self.pages.push_front(page.resources);
        Ok(true)
    }

    /// Fetches forward until the cursor runs out or `max_pages` pages were added.
    pub async fn fetch_all_next<S>(&mut self, source: &S, max_pages: usize) -> Result<usize>
    where
        S: PageSource<T> + ?Sized,
    {
        let mut fetched = 0;
        while fetched < max_pages && self.fetch_next(source).await? {
            fetched += 1;
        }
        Ok(fetched)
    }

    pub fn items(&self, order: PageOrder) -> Vec<T> {
        match order {
            PageOrder::Fetched => self.pages.iter().flatten().cloned().collect(),
            PageOrder::Reversed => self.pages.iter().rev().flatten().cloned().collect(),
        }
    }

    /// Drops every fetched page and starts over from a fresh first page.
    pub fn reset(&mut self, page: Page<T>) {
        *self = Self::seeded(page);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeSource {
        pages: HashMap<(Direction, String), Page<i32>>,
        calls: Mutex<Vec<PageRequest>>,
    }

    impl FakeSource {
        fn new(pages: Vec<(Direction, &str, Page<i32>)>) -> Self {
            Self {
                pages: pages
                    .into_iter()
                    .map(|(d, c, p)| ((d, c.to_string()), p))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PageSource<i32> for FakeSource {
        async fn fetch(&self, request: PageRequest) -> Result<Page<i32>> {
            self.calls.lock().unwrap().push(request.clone());
            self.pages
                .get(&(request.direction, request.cursor.to_string()))
                .cloned()
                .ok_or_else(|| anyhow!("no page at {}", request.cursor))
        }
    }

    fn cursor(s: &str) -> Option<Cursor> {
        Some(Cursor::new(s))
    }

    #[tokio::test]
    async fn seed_needs_no_request() {
        let source = FakeSource::new(vec![]);
        let list = InfiniteList::seeded(Page::new(vec![1, 2], None, None));
        assert_eq!(list.items(PageOrder::Fetched), vec![1, 2]);
        assert_eq!(source.call_count(), 0);
    }

    #[tokio::test]
    async fn forward_pages_append_in_order() -> Result<()> {
        let source = FakeSource::new(vec![
            (Direction::Next, "c1", Page::new(vec![3, 4], cursor("c2"), None)),
            (Direction::Next, "c2", Page::new(vec![5], None, None)),
        ]);
        let mut list = InfiniteList::seeded(Page::new(vec![1, 2], cursor("c1"), None));

        let fetched = list.fetch_all_next(&source, 10).await?;

        assert_eq!(fetched, 2);
        assert_eq!(list.items(PageOrder::Fetched), vec![1, 2, 3, 4, 5]);
        assert!(!list.has_next());
        assert!(!list.fetch_next(&source).await?);
        assert_eq!(source.call_count(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn missing_previous_cursor_is_a_no_op() -> Result<()> {
        let source = FakeSource::new(vec![]);
        let mut list = InfiniteList::seeded(Page::new(vec![1], cursor("n"), None));

        assert!(!list.fetch_previous(&source).await?);
        assert_eq!(source.call_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn previous_pages_prepend_and_reverse_view_puts_them_last() -> Result<()> {
        let source = FakeSource::new(vec![
            (Direction::Previous, "p1", Page::new(vec![20, 21], None, cursor("p2"))),
            (Direction::Previous, "p2", Page::new(vec![30], None, None)),
        ]);
        let mut list = InfiniteList::seeded(Page::new(vec![10, 11], None, cursor("p1")));

        assert!(list.fetch_previous(&source).await?);
        assert!(list.fetch_previous(&source).await?);
        assert!(!list.fetch_previous(&source).await?);

        assert_eq!(list.items(PageOrder::Fetched), vec![30, 20, 21, 10, 11]);
        assert_eq!(list.items(PageOrder::Reversed), vec![10, 11, 20, 21, 30]);
        assert_eq!(list.page_count(), 3);
        assert_eq!(source.call_count(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn failed_fetch_keeps_state() {
        let source = FakeSource::new(vec![]);
        let mut list = InfiniteList::seeded(Page::new(vec![1], cursor("gone"), None));

        assert!(list.fetch_next(&source).await.is_err());
        assert_eq!(list.next_cursor(), Some(&Cursor::new("gone")));
        assert_eq!(list.len(), 1);
    }

    #[tokio::test]
    async fn reset_reseeds() -> Result<()> {
        let source = FakeSource::new(vec![(Direction::Next, "c", Page::new(vec![2], None, None))]);
        let mut list = InfiniteList::seeded(Page::new(vec![1], cursor("c"), None));
        list.fetch_next(&source).await?;

        list.reset(Page::new(vec![9], cursor("c"), None));
        assert_eq!(list.items(PageOrder::Fetched), vec![9]);
        assert!(list.has_next());
        Ok(())
    }
}
