//! Incremental pagination over the filtered feed.

/// Page position over a filtered feed.
///
/// The visible slice is always a prefix: `filtered[..page * page_size]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pagination {
    page: usize,
    page_size: usize,
    /// A load-more is in flight until `settle` is called.
    loading: bool,
}

impl Pagination {
    pub fn new(page_size: usize) -> Self {
        Self {
            page: 1,
            page_size: page_size.max(1),
            loading: false,
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Number of visible entries out of `total`.
    pub fn visible_len(&self, total: usize) -> usize {
        total.min(self.page.saturating_mul(self.page_size))
    }

    /// The visible prefix of `items`.
    pub fn visible<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        &items[..self.visible_len(items.len())]
    }

    pub fn has_more(&self, total: usize) -> bool {
        total > self.visible_len(total)
    }

    /// Reveal one more page.
    ///
    /// No-op (returns `false`) while a load is in flight or when nothing more
    /// is available. Never advances by more than one page. The in-flight flag
    /// stays set until [`settle`](Self::settle) or [`reset`](Self::reset).
    pub fn load_more(&mut self, total: usize) -> bool {
        if self.loading || !self.has_more(total) {
            return false;
        }
        self.page += 1;
        self.loading = true;
        true
    }

    /// Mark the in-flight load as rendered.
    pub fn settle(&mut self) {
        self.loading = false;
    }

    /// Back to the first page, discarding any deeper position.
    pub fn reset(&mut self) {
        self.page = 1;
        self.loading = false;
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(10)
    }
}
