//! Start dispatch: queue-first delivery, HTTP ingress fallback, and the
//! watchdog that makes a lost start self-heal.
//!
//! A launch wins the creator's ownership pointer before any message moves,
//! so duplicate and racing starts settle on the registry's compare-and-swap
//! rather than on transport guarantees. Delivery itself is best-effort: the
//! queue first, the ingress endpoints second, and when neither lands (or no
//! consumer ever picks the start up) the armed watchdog claims the pointer
//! after a grace window and executes the run in-process.

mod dispatcher;
mod ingress;
mod launcher;
mod queue;
mod watchdog;


pub use dispatcher::{DeliveryVerification, DispatchReceipt, DispatchTransport, RunDispatcher};
pub use ingress::HttpIngress;
pub use launcher::{LaunchRequest, LaunchTicket, PipelineLauncher};
pub use queue::{derive_event_id, LocalStartQueue, StartMessage, StartQueue};
pub use watchdog::{
    DispatchWatchdog, WatchdogDeps, WatchdogHandle, WatchdogOutcome, WatchdogSkip,
};
