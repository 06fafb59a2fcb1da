pub mod collector;
pub mod query;
pub mod realtime;
pub mod sampler;
pub mod store;

pub use collector::{spawn_schedule, Collector};
pub use query::QueryBuilder;
pub use realtime::{Distributor, WsSink};
pub use sampler::{PsStatSource, Sampler};
pub use store::Store;
