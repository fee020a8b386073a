//! Page cursor with adaptive failure recovery
//!
//! In normal operation the paginator hands out consecutive pages of a fixed
//! size. When the server fails on a page, [`Paginator::enter_failed_state`]
//! pushes a sub-range frame that walks the same span of records with pages
//! ten times smaller, isolating the record that breaks the server. Frames
//! nest: a failing sub-page spawns its own, smaller frame. Once a frame has
//! covered its span it is popped and the parent continues after the span.

use crate::query::QueryError;
use url::Url;

/// Address of one page in a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number
    pub number: u64,
    /// Number of records per page
    pub size: u32,
}

impl Page {
    pub fn as_tuple(&self) -> (u64, u32) {
        (self.number, self.size)
    }
}

/// One level of the cursor stack
#[derive(Debug, Clone)]
struct CursorFrame {
    page_size: u32,
    current_position: u64,
    start_position: u64,
    /// `None` for the root frame, which is unbounded
    end_position: Option<u64>,
}

impl CursorFrame {
    fn root(page_size: u32) -> Self {
        Self {
            page_size,
            current_position: 0,
            start_position: 0,
            end_position: None,
        }
    }

    fn is_exhausted(&self) -> bool {
        self.end_position
            .is_some_and(|end| self.current_position >= end)
    }

    fn page_number(&self) -> u64 {
        let size = u64::from(self.page_size);
        if self.current_position % size == 0 {
            self.current_position / size + 1
        } else {
            self.current_position / size
        }
    }
}

/// Tracks pagination progress for a single target
#[derive(Debug, Clone)]
pub struct Paginator {
    /// Root frame first, the active frame last
    frames: Vec<CursorFrame>,
}

impl Paginator {
    /// Creates a paginator starting at page 1
    ///
    /// A page size of zero is treated as one.
    pub fn new(page_size: u32) -> Self {
        Self {
            frames: vec![CursorFrame::root(page_size.max(1))],
        }
    }

    /// Returns the next page to request
    pub fn next_page(&mut self) -> Page {
        while self.frames.len() > 1 && self.active().is_exhausted() {
            let child = self.frames.pop();
            if let Some(child) = child {
                tracing::debug!(
                    "Sub-range [{}, {}) with page size {} done, resuming at depth {}",
                    child.start_position,
                    child.current_position,
                    child.page_size,
                    self.frames.len() - 1
                );
            }
        }

        let frame = self.active_mut();
        let page = Page {
            number: frame.page_number(),
            size: frame.page_size,
        };
        frame.current_position += u64::from(frame.page_size);
        page
    }

    /// Switches to smaller pages covering the span of the last emitted page
    ///
    /// Fails when the active page size is already 1 or when no page has been
    /// emitted from the active frame yet.
    pub fn enter_failed_state(&mut self) -> Result<(), QueryError> {
        let frame = self.active();
        if frame.page_size <= 1 {
            return Err(QueryError::Unshrinkable {
                page_size: frame.page_size,
            });
        }
        if frame.current_position == frame.start_position {
            return Err(QueryError::NothingToRetry);
        }

        let failed_start = frame.current_position - u64::from(frame.page_size);
        let failed_end = frame.current_position;
        let sub_page_size = (frame.page_size / 10).max(1);

        tracing::debug!(
            "Entering failed state: retrying [{}, {}) with page size {}",
            failed_start,
            failed_end,
            sub_page_size
        );

        self.frames.push(CursorFrame {
            page_size: sub_page_size,
            current_position: failed_start,
            start_position: failed_start,
            end_position: Some(failed_end),
        });
        Ok(())
    }

    /// Reads the `page_size` query parameter of a previously built URL
    pub fn extract_page_size(url: &Url) -> Option<u32> {
        url.query_pairs()
            .find(|(key, _)| key == "page_size")
            .and_then(|(_, value)| value.parse().ok())
    }

    /// Page size of the active frame
    pub fn page_size(&self) -> u32 {
        self.active().page_size
    }

    /// Number of nested sub-range frames currently on the stack
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    fn active(&self) -> &CursorFrame {
        // The root frame is never popped.
        &self.frames[self.frames.len() - 1]
    }

    fn active_mut(&mut self) -> &mut CursorFrame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }
}
