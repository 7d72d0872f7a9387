//! Generic "fetch every page" driver for page/per_page style endpoints.
use std::cmp::Ordering;
use std::future::Future;

use tracing::{debug, warn};

pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Page coordinates handed to the fetcher. Pages start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn first(per_page: u32) -> Self {
        Self { page: 1, per_page }
    }
}

/// Calls `fetch` with increasing page numbers until a short page arrives.
///
/// A page holding exactly `page_size` items means more may follow. A shorter
/// page is the last one and is included. A page holding more than `page_size`
/// items cannot be trusted: it is dropped and whatever was accumulated so far
/// is returned.
pub async fn paginate<T, E, F, Fut>(page_size: u32, mut fetch: F) -> Result<Vec<T>, E>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
{
    // A zero page size would never produce a short page.
    let page_size = page_size.max(1);
    let mut items = Vec::new();
    let mut request = PageRequest::first(page_size);
    loop {
        let batch = fetch(request).await?;
        match batch.len().cmp(&(page_size as usize)) {
            Ordering::Equal => {
                items.extend(batch);
                request.page += 1;
            }
            Ordering::Less => {
                debug!(pages = request.page, items = items.len() + batch.len(), "pagination done");
                items.extend(batch);
                return Ok(items);
            }
            Ordering::Greater => {
                warn!(
                    page = request.page,
                    received = batch.len(),
                    page_size,
                    "page larger than requested; stopping pagination"
                );
                return Ok(items);
            }
        }
    }
}
