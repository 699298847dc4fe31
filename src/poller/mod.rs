mod debounce;
mod managed;

pub use debounce::Debouncer;
pub use managed::{
    poll_operation, ManagedPoller, PollOperation, PollTicket, PollerFlags, PollerStats,
};
