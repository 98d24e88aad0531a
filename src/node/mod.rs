use core::fmt;

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid node id {0}, expected 1..=127")]
pub struct InvalidNodeId(pub u8);

/// Address of a CANopen device on the bus (1..=127).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct NodeId(u8);

impl NodeId {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 127;

    pub const fn new(raw: u8) -> Result<Self, InvalidNodeId> {
        if raw >= Self::MIN && raw <= Self::MAX {
            Ok(NodeId(raw))
        } else {
            Err(InvalidNodeId(raw))
        }
    }

    pub const fn raw(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for NodeId {
    type Error = InvalidNodeId;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        NodeId::new(raw)
    }
}

impl From<NodeId> for u8 {
    fn from(node: NodeId) -> Self {
        node.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_node_id_range() {
        assert_eq!(NodeId::new(0), Err(InvalidNodeId(0)));
        assert_eq!(NodeId::new(128), Err(InvalidNodeId(128)));
        assert_eq!(NodeId::new(127).map(NodeId::raw), Ok(127));
        assert!(NodeId::try_from(1).is_ok());
    }
}
