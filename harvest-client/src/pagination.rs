//! Drives a page source until the target count is reached or pages run out.

use futures::stream::{self, Stream, TryStreamExt};
use harvest_core::HarvestError;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Position of the next page: an opaque token or a numeric page offset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PageCursor {
    Token(String),
    Offset(u32),
}

/// One page of raw items as returned by a platform.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPage {
    pub items: Vec<Value>,
    /// Cursor for the following page; `None` when the platform has no more.
    pub next: Option<PageCursor>,
    /// Side-loaded objects such as X's `includes.users`.
    pub includes: Option<Value>,
}

/// Something that can fetch one page at a given cursor.
#[allow(async_fn_in_trait)]
pub trait PageSource {
    async fn fetch_page(
        &self,
        cursor: Option<&PageCursor>,
        page_size: u32,
    ) -> Result<RawPage, HarvestError>;
}

#[derive(Debug, Default)]
struct WalkState {
    cursor: Option<PageCursor>,
    requested: HashSet<Option<PageCursor>>,
    collected: usize,
    exhausted: bool,
}

#[derive(Debug)]
pub struct PaginationWalker<S> {
    source: S,
    target: usize,
    page_size: u32,
}

impl<S: PageSource> PaginationWalker<S> {
    /// `page_size` is the smaller of the platform maximum and the target.
    pub fn new(source: S, target: u32, max_page_size: u32) -> Self {
        Self {
            source,
            target: target as usize,
            page_size: target.min(max_page_size).max(1),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Lazy page stream. No page is requested once `target` items have been
    /// produced, and a cursor is never requested twice.
    pub fn pages(&self) -> impl Stream<Item = Result<RawPage, HarvestError>> + '_ {
        stream::try_unfold(WalkState::default(), move |state| self.next_page(state))
    }

    async fn next_page(
        &self,
        mut state: WalkState,
    ) -> Result<Option<(RawPage, WalkState)>, HarvestError> {
        if state.exhausted || state.collected >= self.target {
            return Ok(None);
        }
        if !state.requested.insert(state.cursor.clone()) {
            warn!("Cursor {:?} was already requested, ending walk", state.cursor);
            return Ok(None);
        }

        let page = self
            .source
            .fetch_page(state.cursor.as_ref(), self.page_size)
            .await?;
        debug!(
            "Fetched page of {} items at {:?}",
            page.items.len(),
            state.cursor
        );

        if page.items.is_empty() {
            return Ok(None);
        }

        state.collected += page.items.len();
        state.exhausted = page.next.is_none();
        state.cursor = page.next.clone();
        Ok(Some((page, state)))
    }

    /// Every page needed for `target` items, with the last page trimmed.
    /// Any failure discards the pages already fetched.
    pub async fn collect_pages(&self) -> Result<Vec<RawPage>, HarvestError> {
        let mut pages: Vec<RawPage> = self.pages().try_collect().await?;

        let mut remaining = self.target;
        for page in &mut pages {
            page.items.truncate(remaining);
            remaining -= page.items.len();
        }

        info!(
            "Walk finished: {} pages, {} items",
            pages.len(),
            self.target - remaining
        );
        Ok(pages)
    }

    pub async fn collect_items(&self) -> Result<Vec<Value>, HarvestError> {
        Ok(self
            .collect_pages()
            .await?
            .into_iter()
            .flat_map(|page| page.items)
            .collect())
    }
}
