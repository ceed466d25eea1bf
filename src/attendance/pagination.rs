use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;

use super::store::{AttendanceStore, PageFilter};
use crate::error::AppError;
use crate::model::attendance::AttendanceView;
use crate::utils::cursor::{Cursor, decode_cursor, encode_cursor};

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// One page of rows plus the token for the next one.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub limit: u32,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CursorMeta {
    #[schema(example = 10)]
    pub limit: u32,
    #[schema(example = true)]
    pub has_next: bool,
    #[schema(example = "eyJpZCI6NDIsInNvcnRfdmFsdWUiOiIyMDI2LTAzLTAyVDA4OjE1OjAwWiJ9")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn meta(&self) -> CursorMeta {
        CursorMeta {
            limit: self.limit,
            has_next: self.next_cursor.is_some(),
            next_cursor: self.next_cursor.clone(),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            limit: self.limit,
            next_cursor: self.next_cursor,
        }
    }
}

/// Missing or zero limits fall back to the default; large ones are capped.
pub fn clamp_limit(limit: Option<u32>) -> u32 {
    match limit {
        None | Some(0) => DEFAULT_PAGE_LIMIT,
        Some(l) => l.min(MAX_PAGE_LIMIT),
    }
}

/// Keyset pagination over `(created_at DESC, id DESC)`.
pub struct HistoryPaginator {
    store: Arc<dyn AttendanceStore>,
}

impl HistoryPaginator {
    pub fn new(store: Arc<dyn AttendanceStore>) -> Self {
        Self { store }
    }

    pub async fn page(
        &self,
        filter: &PageFilter,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<Page<AttendanceView>, AppError> {
        let limit = limit.clamp(1, MAX_PAGE_LIMIT);
        let after = cursor.and_then(decode_cursor);

        // One extra row tells us whether another page exists
        let mut rows = self.store.page(filter, after.as_ref(), limit + 1).await?;

        let next_cursor = if rows.len() > limit as usize {
            rows.truncate(limit as usize);
            rows.last().map(|last| {
                encode_cursor(&Cursor {
                    id: last.id,
                    sort_value: last.created_at,
                })
            })
        } else {
            None
        };

        Ok(Page {
            items: rows,
            limit,
            next_cursor,
        })
    }
}
