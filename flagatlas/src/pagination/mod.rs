use serde::Serialize;

/// Records per listing page.
pub const PAGE_SIZE: usize = 60;

/// A requested page number, parsed leniently from a query string value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest(pub usize);

impl PageRequest {
    /// Missing, non-numeric or zero input means page 1.
    pub fn parse(raw: Option<&str>) -> Self {
        let page = raw
            .and_then(|s| s.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(1);
        PageRequest(page)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    pub total: usize,
    pub per_page: usize,
}

impl Paginator {
    pub fn new(total: usize, per_page: usize) -> Self {
        Paginator {
            total,
            per_page: per_page.max(1),
        }
    }

    /// Always at least one page, even for an empty result set.
    pub fn num_pages(&self) -> usize {
        self.total.div_ceil(self.per_page).max(1)
    }

    /// Resolve a request to a concrete page, clamped into `[1, num_pages]`.
    pub fn page(&self, request: PageRequest) -> Page {
        let num_pages = self.num_pages();
        let number = request.0.clamp(1, num_pages);
        let offset = (number - 1) * self.per_page;
        let len = self.total.saturating_sub(offset).min(self.per_page);

        Page {
            number,
            num_pages,
            per_page: self.per_page,
            total: self.total,
            offset,
            has_previous: number > 1,
            has_next: number < num_pages,
            previous: (number > 1).then(|| number - 1),
            next: (number < num_pages).then(|| number + 1),
            start_index: if len == 0 { 0 } else { offset + 1 },
            end_index: if len == 0 { 0 } else { offset + len },
        }
    }
}

/// Paging state handed to the page contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub number: usize,
    pub num_pages: usize,
    pub per_page: usize,
    pub total: usize,
    #[serde(skip)]
    pub offset: usize,
    pub has_previous: bool,
    pub has_next: bool,
    pub previous: Option<usize>,
    pub next: Option<usize>,
    pub start_index: usize,
    pub end_index: usize,
}

impl Page {
    pub fn limit(&self) -> usize {
        self.per_page
    }
}
