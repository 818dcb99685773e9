use std::collections::BTreeSet;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PageSetError {
    #[error("Page numbers must be positive integers, got {0}")]
    NotPositive(i64),

    #[error("Page number {0} is out of range")]
    OutOfRange(i64),
}

/// Sorted, deduplicated set of 1-indexed page numbers.
///
/// An empty set means "metadata only": nothing is removed and the job only
/// reports the page count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSet {
    pages: Vec<u32>,
}

impl PageSet {
    /// Validates raw client input. Every entry must be a positive integer;
    /// duplicates collapse into one.
    pub fn parse(raw: &[i64]) -> Result<Self, PageSetError> {
        let mut pages = BTreeSet::new();
        for &page in raw {
            if page <= 0 {
                return Err(PageSetError::NotPositive(page));
            }
            let page = u32::try_from(page).map_err(|_| PageSetError::OutOfRange(page))?;
            pages.insert(page);
        }
        Ok(Self {
            pages: pages.into_iter().collect(),
        })
    }

    /// Builds a set from pages already known to be positive (zeros are dropped).
    pub fn from_pages<I: IntoIterator<Item = u32>>(pages: I) -> Self {
        let pages: BTreeSet<u32> = pages.into_iter().filter(|&p| p > 0).collect();
        Self {
            pages: pages.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn contains(&self, page: u32) -> bool {
        self.pages.binary_search(&page).is_ok()
    }

    /// Highest requested page, if any.
    pub fn max(&self) -> Option<u32> {
        self.pages.last().copied()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.pages
    }

    pub fn to_vec(&self) -> Vec<u32> {
        self.pages.clone()
    }
}
