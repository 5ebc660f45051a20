pub mod check;
pub mod error;
pub mod operation;
pub mod package;
pub mod schedule;
pub mod settings;

pub use check::{CheckState, TriggerKind};
pub use error::{CoreError, CoreErrorKind};
pub use operation::BrewOperation;
pub use package::{InstalledPackage, OutdatedPackage, PackageSource, UNKNOWN_VERSION};
pub use schedule::{CustomInterval, DEFAULT_INTERVAL_LABEL, ScheduleConfig, ScheduleInterval};
pub use settings::{BrewCommands, Settings};
