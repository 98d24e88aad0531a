//! CANopen SDO client and CiA 402 drive control.
//!
//! The crate is layered bottom-up:
//!
//! * [`network`]: the [`Network`](network::Network) trait an adapter implements to
//!   move [`CanOpenFrame`](frame::CanOpenFrame)s on and off the bus
//! * [`sdo`]: expedited and segmented SDO transfers, one transaction per node at a time
//! * [`drive`]: the CiA 402 power state machine, driven over SDO
//! * [`motion`]: validated profile moves (velocity, position, current, torque)
//!
//! With the `sim` feature, [`sim`] provides a simulated drive and a manual clock.

pub mod clock;
pub mod config;
pub mod drive;
pub mod frame;
pub mod motion;
pub mod network;
pub mod nmt;
pub mod node;
pub mod objectdictionary;
pub mod sdo;
#[cfg(feature = "sim")]
pub mod sim;

pub use config::DriveConfig;
pub use drive::{Drive, DriveError, DriveStatus, OperationMode, PowerState};
pub use motion::{MotionController, MotionProfile, MoveOptions, PositionKind};
pub use network::{Network, NetworkError};
pub use node::NodeId;
pub use sdo::{SdoClient, SdoError};
