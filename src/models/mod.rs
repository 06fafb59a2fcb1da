pub mod filter;
pub mod process;
pub mod report;
pub mod response;

pub use filter::ProcessFilter;
pub use process::{Priority, Process, ProcessState};
pub use report::{ProcessCounts, ProcessList, ProcessUserReport, RealtimeSnapshot};
pub use response::ApiResponse;
