//! In-memory drive and clock for exercising the stack without hardware.

pub use clock::ManualClock;
pub use drive::{SimulatedDrive, DEVICE_NAME};

mod clock;
mod drive;
