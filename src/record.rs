// Shared trait for entities kept in the store's id-keyed maps

use crate::error::StoreError;
use crate::models::{Category, Task};
use std::collections::HashMap;

/// Any entity the store indexes by id
pub trait Record: Clone {
    /// Unique identifier for this record
    fn id(&self) -> &str;

    /// Entity kind used in errors and logs (e.g., "task", "category")
    fn kind() -> &'static str
    where
        Self: Sized;
}

impl Record for Task {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind() -> &'static str {
        "task"
    }
}

impl Record for Category {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind() -> &'static str {
        "category"
    }
}

pub(crate) fn lookup<'a, T: Record>(map: &'a HashMap<String, T>, id: &str) -> Result<&'a T, StoreError> {
    map.get(id).ok_or_else(|| StoreError::not_found(T::kind(), id))
}

pub(crate) fn lookup_mut<'a, T: Record>(map: &'a mut HashMap<String, T>, id: &str) -> Result<&'a mut T, StoreError> {
    map.get_mut(id).ok_or_else(|| StoreError::not_found(T::kind(), id))
}

/// Key a set of records by their id
pub(crate) fn index_by_id<T: Record>(records: impl IntoIterator<Item = T>) -> HashMap<String, T> {
    records.into_iter().map(|r| (r.id().to_string(), r)).collect()
}
