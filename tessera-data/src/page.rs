use serde::Serialize;

use crate::search::Pagination;

/// A materialized search result: one page of elements plus the size of the
/// whole filtered population.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub skip: u64,
    pub take: u64,
    pub total_elements: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, pagination: &Pagination, total_elements: u64) -> Self {
        let take = pagination.take();
        Self {
            content,
            skip: pagination.skip(),
            take,
            total_elements,
            total_pages: total_elements.div_ceil(take),
        }
    }

    /// Transform every element, keeping the pagination metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            skip: self.skip,
            take: self.take,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
        }
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages_rounds_up() {
        let page = Page::new(vec![1, 2], &Pagination::new(0, 2).unwrap(), 5);
        assert_eq!(page.total_pages, 3);
        let empty: Page<i32> = Page::new(vec![], &Pagination::default(), 0);
        assert_eq!(empty.total_pages, 0);
    }

    #[test]
    fn test_serializes_flat() {
        let page = Page::new(vec!["a"], &Pagination::new(1, 1).unwrap(), 3);
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "content": ["a"],
                "skip": 1,
                "take": 1,
                "total_elements": 3,
                "total_pages": 3
            })
        );
    }
}
