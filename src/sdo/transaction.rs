use crate::node::NodeId;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    /// Server → client (read)
    Upload,
    /// Client → server (write)
    Download,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransactionState {
    Pending,
    Completed,
    TimedOut,
    Aborted(u32),
    /// Malformed response or transport failure
    Failed,
}

/// Bookkeeping for one SDO request/response exchange.
///
/// Lives inside the client's channel lock, so there is never more than one
/// pending transaction per node.
#[derive(Clone, Debug)]
pub struct SdoTransaction {
    pub node: NodeId,
    pub index: u16,
    pub subindex: u8,
    pub direction: Direction,
    pub payload: Vec<u8>,
    pub state: TransactionState,
}

impl SdoTransaction {
    pub(crate) fn new(node: NodeId, index: u16, subindex: u8, direction: Direction) -> Self {
        SdoTransaction {
            node,
            index,
            subindex,
            direction,
            payload: Vec::new(),
            state: TransactionState::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state == TransactionState::Pending
    }
}
