use std::sync::Arc;

/// Initial window of a [`PaginationState`].
#[derive(Debug, Clone, Copy)]
pub struct PaginationOptions {
    pub offset: usize,
    pub page: usize,
    pub limit: usize,
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            offset: 0,
            page: 0,
            limit: 10,
        }
    }
}

/// One page cut out of a source snapshot, plus the derived page geometry.
///
/// `loading` is true until the first source arrives. The page starts at
/// `offset + page * limit` within the source; `offset` skips a fixed head
/// that never counts toward the pages.
#[derive(Debug, Clone)]
pub struct PaginationState<T> {
    pub offset: usize,
    pub page: usize,
    pub limit: usize,
    pub source: Arc<[T]>,
    pub total: usize,
    pub loading: bool,
    pub data: Arc<[T]>,
    pub nr_of_pages: usize,
    pub is_first_page: bool,
    pub is_last_page: bool,
}

impl<T: Clone> PaginationState<T> {
    pub fn new(options: PaginationOptions) -> Self {
        let mut state = Self {
            offset: options.offset,
            page: options.page,
            limit: options.limit.max(1),
            source: Arc::from(Vec::new()),
            total: 0,
            loading: true,
            data: Arc::from(Vec::new()),
            nr_of_pages: 0,
            is_first_page: true,
            is_last_page: true,
        };
        paginate(&mut state);
        state
    }
}

/// Recompute `data` and the page geometry from the window fields.
fn paginate<T: Clone>(state: &mut PaginationState<T>) {
    let total = state.source.len();
    let start = (state.offset + state.page * state.limit).min(total);
    let end = (start + state.limit).min(total);

    state.total = total;
    state.data = if start == 0 && end == total {
        Arc::clone(&state.source)
    } else {
        Arc::from(state.source[start..end].to_vec())
    };

    let paged = total.saturating_sub(state.offset);
    state.nr_of_pages = paged.div_ceil(state.limit);
    state.is_first_page = state.page == 0;
    state.is_last_page = state.nr_of_pages == 0 || state.page + 1 >= state.nr_of_pages;
}

/// State transitions of a pagination.
pub enum PaginationAction<T> {
    /// A new source snapshot. Skipped entirely when it is the same
    /// allocation as the current one, so repeated delivery of an unchanged
    /// snapshot costs nothing.
    Changed(Arc<[T]>),
    /// Move the window; `None` fields keep their current value.
    Paginate {
        offset: Option<usize>,
        page: Option<usize>,
        limit: Option<usize>,
    },
}

/// Apply an action, returning the next state. Unchanged inputs return a
/// plain clone with the same `data` allocation.
pub fn reduce<T: Clone>(
    state: &PaginationState<T>,
    action: PaginationAction<T>,
) -> PaginationState<T> {
    match action {
        PaginationAction::Changed(source) => {
            if Arc::ptr_eq(&state.source, &source) && !state.loading {
                return state.clone();
            }
            let mut next = state.clone();
            next.source = source;
            next.loading = false;
            paginate(&mut next);
            next
        }
        PaginationAction::Paginate {
            offset,
            page,
            limit,
        } => {
            let offset = offset.unwrap_or(state.offset);
            let page = page.unwrap_or(state.page);
            let limit = limit.unwrap_or(state.limit).max(1);
            if offset == state.offset && page == state.page && limit == state.limit {
                return state.clone();
            }
            let mut next = state.clone();
            next.offset = offset;
            next.page = page;
            next.limit = limit;
            paginate(&mut next);
            next
        }
    }
}

/// Owned wrapper around the reducer for consumers that prefer methods over
/// dispatching actions themselves.
pub struct Pagination<T> {
    state: PaginationState<T>,
}

impl<T: Clone> Pagination<T> {
    pub fn new(options: PaginationOptions) -> Self {
        Self {
            state: PaginationState::new(options),
        }
    }

    pub fn state(&self) -> &PaginationState<T> {
        &self.state
    }

    pub fn data(&self) -> Arc<[T]> {
        Arc::clone(&self.state.data)
    }

    pub fn dispatch(&mut self, action: PaginationAction<T>) {
        self.state = reduce(&self.state, action);
    }

    pub fn set_source(&mut self, source: Arc<[T]>) {
        self.dispatch(PaginationAction::Changed(source));
    }

    pub fn set_page(&mut self, page: usize) {
        self.dispatch(PaginationAction::Paginate {
            offset: None,
            page: Some(page),
            limit: None,
        });
    }

    pub fn set_limit(&mut self, limit: usize) {
        self.dispatch(PaginationAction::Paginate {
            offset: None,
            page: None,
            limit: Some(limit),
        });
    }

    pub fn set_offset(&mut self, offset: usize) {
        self.dispatch(PaginationAction::Paginate {
            offset: Some(offset),
            page: None,
            limit: None,
        });
    }

    pub fn next_page(&mut self) {
        if !self.state.is_last_page {
            self.set_page(self.state.page + 1);
        }
    }

    pub fn prev_page(&mut self) {
        if self.state.page > 0 {
            self.set_page(self.state.page - 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(n: usize) -> Arc<[usize]> {
        Arc::from((0..n).collect::<Vec<_>>())
    }

    #[test]
    fn test_initial_state_is_loading() {
        let state: PaginationState<usize> = PaginationState::new(PaginationOptions::default());
        assert!(state.loading);
        assert_eq!(state.total, 0);
        assert_eq!(state.nr_of_pages, 0);
        assert!(state.is_first_page);
        assert!(state.is_last_page);
        assert!(state.data.is_empty());
    }

    #[test]
    fn test_page_geometry() {
        let mut pagination = Pagination::new(PaginationOptions {
            limit: 2,
            ..PaginationOptions::default()
        });
        pagination.set_source(source(9));

        let state = pagination.state();
        assert!(!state.loading);
        assert_eq!(state.nr_of_pages, 5);
        assert_eq!(state.data.as_ref(), &[0, 1]);
        assert!(state.is_first_page);
        assert!(!state.is_last_page);

        pagination.set_page(4);
        let state = pagination.state();
        assert_eq!(state.data.as_ref(), &[8]);
        assert!(state.is_last_page);
        assert!(!state.is_first_page);
    }

    #[test]
    fn test_offset_skips_a_fixed_head() {
        let mut pagination = Pagination::new(PaginationOptions {
            offset: 3,
            limit: 2,
            ..PaginationOptions::default()
        });
        pagination.set_source(source(9));

        let state = pagination.state();
        assert_eq!(state.nr_of_pages, 3);
        assert_eq!(state.data.as_ref(), &[3, 4]);
    }

    #[test]
    fn test_same_allocation_is_skipped() {
        let docs = source(4);
        let mut pagination = Pagination::new(PaginationOptions::default());
        pagination.set_source(Arc::clone(&docs));
        let before = pagination.data();

        pagination.set_source(Arc::clone(&docs));
        assert!(Arc::ptr_eq(&before, &pagination.data()));

        // an equal but distinct snapshot is treated as a change
        pagination.set_source(source(4));
        assert_eq!(pagination.data().as_ref(), &[0, 1, 2, 3]);
    }

    #[test]
    fn test_full_window_shares_the_source() {
        let docs = source(5);
        let mut pagination = Pagination::new(PaginationOptions::default());
        pagination.set_source(Arc::clone(&docs));
        assert!(Arc::ptr_eq(&docs, &pagination.data()));
    }

    #[test]
    fn test_limit_clamped_to_one() {
        let mut pagination = Pagination::new(PaginationOptions {
            limit: 0,
            ..PaginationOptions::default()
        });
        pagination.set_source(source(3));
        assert_eq!(pagination.state().limit, 1);
        assert_eq!(pagination.state().nr_of_pages, 3);
    }

    #[test]
    fn test_window_past_the_end_is_empty() {
        let mut pagination = Pagination::new(PaginationOptions {
            limit: 2,
            ..PaginationOptions::default()
        });
        pagination.set_source(source(3));
        pagination.set_page(7);
        let state = pagination.state();
        assert!(state.data.is_empty());
        assert!(state.is_last_page);
    }

    #[test]
    fn test_next_prev_navigation() {
        let mut pagination = Pagination::new(PaginationOptions {
            limit: 2,
            ..PaginationOptions::default()
        });
        pagination.set_source(source(5));
        assert_eq!(pagination.state().nr_of_pages, 3);

        pagination.next_page();
        assert_eq!(pagination.data().as_ref(), &[2, 3]);
        pagination.next_page();
        assert_eq!(pagination.data().as_ref(), &[4]);
        // already on the last page
        pagination.next_page();
        assert_eq!(pagination.state().page, 2);

        pagination.prev_page();
        pagination.prev_page();
        assert!(pagination.state().is_first_page);
        pagination.prev_page();
        assert_eq!(pagination.state().page, 0);
    }
}
