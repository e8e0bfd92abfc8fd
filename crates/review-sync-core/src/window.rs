/// How much of an ordered list is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSize {
    Count(usize),
    All,
}

/// Prefix of `items` selected by `size`. Never touches the list itself.
pub fn visible<T>(items: &[T], size: WindowSize) -> &[T] {
    match size {
        WindowSize::Count(n) => &items[..n.min(items.len())],
        WindowSize::All => items,
    }
}

/// Collapsed/expanded toggle over a list, collapsed to `page_size` entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowedView {
    page_size: usize,
    size: WindowSize,
}

impl WindowedView {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            size: WindowSize::Count(page_size),
        }
    }

    pub fn size(&self) -> WindowSize {
        self.size
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn is_expanded(&self) -> bool {
        self.size == WindowSize::All
    }

    pub fn toggle(&mut self) {
        self.size = match self.size {
            WindowSize::Count(_) => WindowSize::All,
            WindowSize::All => WindowSize::Count(self.page_size),
        };
    }

    pub fn expand(&mut self) {
        self.size = WindowSize::All;
    }

    pub fn collapse(&mut self) {
        self.size = WindowSize::Count(self.page_size);
    }

    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        visible(items, self.size)
    }

    /// Whether a list of `len` entries has entries hidden by this window
    pub fn has_more(&self, len: usize) -> bool {
        match self.size {
            WindowSize::Count(n) => len > n,
            WindowSize::All => false,
        }
    }
}

impl Default for WindowedView {
    fn default() -> Self {
        Self::new(10)
    }
}
