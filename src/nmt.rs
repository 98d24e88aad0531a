use embedded_can::StandardId;
use tracing::debug;

use crate::frame::CanOpenFrame;
use crate::network::{Network, NetworkError};
use crate::node::NodeId;

/// COB-ID of NMT master commands
pub const NMT_REQUEST_ID: StandardId = StandardId::ZERO;
/// COB-ID base of heartbeat messages, plus the producing node's id
pub const HEARTBEAT_BASE: u16 = 0x700;

/// NMT node control commands (CiA 301)
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum NmtCommand {
    StartRemoteNode,
    StopRemoteNode,
    EnterPreOperational,
    ResetNode,
    ResetCommunication,
}

impl NmtCommand {
    pub const fn code(self) -> u8 {
        match self {
            NmtCommand::StartRemoteNode => 0x01,
            NmtCommand::StopRemoteNode => 0x02,
            NmtCommand::EnterPreOperational => 0x80,
            NmtCommand::ResetNode => 0x81,
            NmtCommand::ResetCommunication => 0x82,
        }
    }
}

pub fn command_frame(command: NmtCommand, node: Option<NodeId>) -> CanOpenFrame {
    let target = node.map_or(0, NodeId::raw);
    CanOpenFrame::from_parts(NMT_REQUEST_ID, &[command.code(), target])
}

/// Sends `command` to `node`, or to all nodes if `node` is `None`.
///
/// NMT is unconfirmed, there is no response to wait for.
pub fn send_command<N: Network>(
    network: &N,
    command: NmtCommand,
    node: Option<NodeId>,
) -> Result<(), NetworkError> {
    debug!(?command, ?node, "NMT");
    network.send_frame(&command_frame(command, node))
}
