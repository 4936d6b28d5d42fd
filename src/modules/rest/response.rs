use poem_openapi::types::{ParseFromJSON, ToJSON, Type};
use poem_openapi::Object;
use serde::{Deserialize, Serialize};

use crate::modules::database::Paginated;

/// One page of a list endpoint. `current_page` and `page_size` echo the request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Object)]
pub struct DataPage<S>
where
    S: Serialize + std::fmt::Debug + Unpin + Send + Sync + Type + ParseFromJSON + ToJSON,
{
    /// Starts at 1. Absent when the whole set is returned.
    pub current_page: Option<u64>,
    pub page_size: Option<u64>,
    pub total_items: u64,
    pub items: Vec<S>,
    pub total_pages: Option<u64>,
}

impl<S> DataPage<S>
where
    S: Serialize + std::fmt::Debug + Unpin + Send + Sync + Type + ParseFromJSON + ToJSON,
{
    /// Wraps an unpaginated list.
    pub fn all(items: Vec<S>) -> Self {
        Self {
            current_page: None,
            page_size: None,
            total_items: items.len() as u64,
            items,
            total_pages: None,
        }
    }
}

impl<S> From<Paginated<S>> for DataPage<S>
where
    S: Serialize + std::fmt::Debug + Unpin + Send + Sync + Type + ParseFromJSON + ToJSON,
{
    fn from(paginated: Paginated<S>) -> Self {
        Self {
            current_page: paginated.page,
            page_size: paginated.page_size,
            total_items: paginated.total_items,
            items: paginated.items,
            total_pages: paginated.total_pages,
        }
    }
}
