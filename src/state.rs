use crate::services::{Distributor, QueryBuilder, Store};

/// Shared by every HTTP worker. The store is owned by `main` and only
/// borrowed through here.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub builder: QueryBuilder,
    pub distributor: Distributor,
}

impl AppState {
    pub fn new(store: Store, builder: QueryBuilder, distributor: Distributor) -> Self {
        Self {
            store,
            builder,
            distributor,
        }
    }
}
