// Playback - clock arbitration and per-block trigger scheduling

pub mod clock;
pub mod events;
pub mod scheduler;

pub use clock::{ClockArbiter, ClockSource, ClockTick, HostTransport};
pub use events::TriggerEvent;
pub use scheduler::{PlaybackMode, PlaybackState, Scheduler, EVENT_CAPACITY};
