pub mod dispatch;
pub mod echo;
pub mod sync;

pub use self::dispatch::{
    DispatchDecision, MessageCreated, OutboundDispatcher, OutboundJob, run_outbound_worker,
};
pub use self::echo::EchoGuard;
pub use self::sync::{CycleReport, SyncEngine, SyncSettings, wait_for_shutdown};
