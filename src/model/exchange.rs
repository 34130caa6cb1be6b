use serde::{Deserialize, Serialize};

/// A registered venue. `id` is the durable primary key used by every event
/// entity's `exchange_id` foreign key; `name` is the unique human name used
/// by the listener registry and CLI (e.g. `"hitbtc"`).
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct Exchange {
    pub id: i64,
    pub name: String,
}

impl Exchange {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}
