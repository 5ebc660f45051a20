pub mod clock;
pub mod commands;
pub mod orchestrator;
pub mod single_flight;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use commands::{CommandOutcome, CommandStatus, PackageCommand};
pub use orchestrator::{
    CheckOrchestrator, CheckOutcome, CheckRequest, MANUAL_CHECK_COOLDOWN, WakeOutcome,
};
pub use single_flight::{FlightGuard, SingleFlight};
pub use timer::{ScheduleTimer, SchedulerHandle};

use crate::models::CoreError;

pub type OrchestrationResult<T> = Result<T, CoreError>;
