//! Save scheduling: coalescing keys, the debounced scheduler and the save status machine.

mod key;
mod scheduler;
mod status;

pub use key::{CoalescePolicy, SaveKey};
pub use scheduler::{BatchReport, SaveFuture, SaveScheduler, SchedulerConfig};
pub use status::{SaveStatus, SaveStatusBoard};
