//! Search / filter / paginate controller shared by every list screen.
//!
//! Keystrokes are debounced by a spawned timer that the next keystroke aborts.
//! Each fetch is stamped with a generation number and its response is applied
//! only while that generation is still the newest one issued, so a slow reply
//! for an old query can never overwrite a newer one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use super::api::{CmsApi, PageQuery};
use super::ClientResult;
use crate::models::{Article, Category, Paginated};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListSettings {
    pub page_size: u32,
    pub debounce: Duration,
}

impl ListSettings {
    pub const ADMIN: ListSettings = ListSettings { page_size: 10, debounce: Duration::from_millis(500) };
    pub const PUBLIC: ListSettings = ListSettings { page_size: 9, debounce: Duration::from_millis(400) };
}

/// Where a list gets its pages from.
#[async_trait]
pub trait ListSource: Send + Sync + 'static {
    type Item: Clone + Send + Sync + 'static;

    async fn fetch(&self, query: &PageQuery) -> ClientResult<Paginated<Self::Item>>;
}

pub struct ArticleSource(pub Arc<dyn CmsApi>);

#[async_trait]
impl ListSource for ArticleSource {
    type Item = Article;

    async fn fetch(&self, query: &PageQuery) -> ClientResult<Paginated<Article>> {
        self.0.list_articles(query).await
    }
}

pub struct CategorySource(pub Arc<dyn CmsApi>);

#[async_trait]
impl ListSource for CategorySource {
    type Item = Category;

    async fn fetch(&self, query: &PageQuery) -> ClientResult<Paginated<Category>> {
        let query = PageQuery { category: None, ..query.clone() };
        self.0.list_categories(&query).await
    }
}

/// Snapshot for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct ListView<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub total_pages: u32,
    /// Text in the search box, applied or not.
    pub search_input: String,
    pub search: String,
    pub category: Option<String>,
    pub loading: bool,
}

struct State<T> {
    search_input: String,
    search: String,
    category: Option<String>,
    page: u32,
    items: Vec<T>,
    total: u64,
    loading: bool,
}

struct Inner<S: ListSource> {
    source: S,
    settings: ListSettings,
    state: Mutex<State<S::Item>>,
    generation: AtomicU64,
    debounce: Mutex<Option<JoinHandle<()>>>,
}

pub struct ListController<S: ListSource> {
    inner: Arc<Inner<S>>,
}

impl<S: ListSource> Clone for ListController<S> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<S: ListSource> ListController<S> {
    pub fn new(source: S, settings: ListSettings) -> Self {
        let state = State {
            search_input: String::new(),
            search: String::new(),
            category: None,
            page: 1,
            items: Vec::new(),
            total: 0,
            loading: false,
        };
        Self {
            inner: Arc::new(Inner {
                source,
                settings,
                state: Mutex::new(state),
                generation: AtomicU64::new(0),
                debounce: Mutex::new(None),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State<S::Item>> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn total_pages(&self, total: u64) -> u32 {
        let size = u64::from(self.inner.settings.page_size.max(1));
        ((total + size - 1) / size) as u32
    }

    pub fn view(&self) -> ListView<S::Item> {
        let st = self.state();
        ListView {
            items: st.items.clone(),
            total: st.total,
            page: st.page,
            total_pages: self.total_pages(st.total),
            search_input: st.search_input.clone(),
            search: st.search.clone(),
            category: st.category.clone(),
            loading: st.loading,
        }
    }

    /// Records a keystroke and (re)starts the debounce timer. The fetch runs
    /// once input has been quiet for the configured window. Must be called
    /// inside a tokio runtime.
    pub fn on_search_input(&self, text: impl Into<String>) {
        self.state().search_input = text.into();
        let this = self.clone();
        let delay = self.inner.settings.debounce;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if this.commit_search() {
                // detached so a later keystroke only ever aborts a sleeping timer
                tokio::spawn(async move {
                    let _ = this.refresh().await;
                });
            }
        });
        let previous = self.inner.debounce.lock().unwrap_or_else(PoisonError::into_inner).replace(timer);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn cancel_debounce(&self) {
        if let Some(timer) = self.inner.debounce.lock().unwrap_or_else(PoisonError::into_inner).take() {
            timer.abort();
        }
    }

    /// Applies the typed text; false when it matches the active search.
    fn commit_search(&self) -> bool {
        let mut st = self.state();
        if st.search_input == st.search {
            return false;
        }
        st.search = st.search_input.clone();
        st.page = 1;
        true
    }

    /// Enter in the search box: apply now, back to page 1.
    pub async fn submit_search(&self) -> ClientResult<()> {
        self.cancel_debounce();
        {
            let mut st = self.state();
            st.search = st.search_input.clone();
            st.page = 1;
        }
        self.refresh().await
    }

    pub async fn set_category(&self, category: Option<String>) -> ClientResult<()> {
        {
            let mut st = self.state();
            st.category = category.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
            st.page = 1;
        }
        self.refresh().await
    }

    pub async fn set_page(&self, page: u32) -> ClientResult<()> {
        {
            let mut st = self.state();
            let last = self.total_pages(st.total);
            let mut page = page.max(1);
            if last > 0 {
                page = page.min(last);
            }
            st.page = page;
        }
        self.refresh().await
    }

    pub async fn next_page(&self) -> ClientResult<()> {
        let page = self.state().page;
        self.set_page(page + 1).await
    }

    pub async fn prev_page(&self) -> ClientResult<()> {
        let page = self.state().page;
        self.set_page(page.saturating_sub(1)).await
    }

    /// Fetches the current filter and page. On failure the previously shown
    /// rows stay in place. When the total has shrunk so that the current page
    /// no longer exists (say, the last row of the last page was deleted) the
    /// page steps back to the new last one and is fetched again, once.
    pub async fn refresh(&self) -> ClientResult<()> {
        let mut may_step_back = true;
        loop {
            let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let query = self.begin_fetch();
            let result = self.inner.source.fetch(&query).await;
            match self.apply(generation, &query, result, may_step_back) {
                Applied::Done(outcome) => return outcome,
                Applied::SteppedBack => may_step_back = false,
            }
        }
    }

    fn begin_fetch(&self) -> PageQuery {
        let mut st = self.state();
        st.loading = true;
        PageQuery {
            search: st.search.clone(),
            category: st.category.clone(),
            page: st.page,
            limit: self.inner.settings.page_size,
        }
    }

    fn apply(
        &self,
        generation: u64,
        query: &PageQuery,
        result: ClientResult<Paginated<S::Item>>,
        may_step_back: bool,
    ) -> Applied {
        let mut st = self.state();
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(generation, "discarding superseded list response");
            return Applied::Done(Ok(()));
        }
        match result {
            Ok(page) => {
                let last = self.total_pages(page.total);
                if may_step_back && page.data.is_empty() && last > 0 && st.page > last {
                    tracing::debug!(page = st.page, last, "page past the end, stepping back");
                    st.page = last;
                    return Applied::SteppedBack;
                }
                st.loading = false;
                st.items = page.data;
                st.total = page.total;
                Applied::Done(Ok(()))
            }
            Err(e) => {
                st.loading = false;
                tracing::warn!(error = %e, page = query.page, "list fetch failed, keeping previous rows");
                Applied::Done(Err(e))
            }
        }
    }
}

enum Applied {
    Done(ClientResult<()>),
    SteppedBack,
}
