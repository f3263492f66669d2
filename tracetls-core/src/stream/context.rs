use crate::tls::Direction;

/// Where a handshake message or record came from.
///
/// The capture layer owns connection tracking and TCP reassembly; it hands
/// the coordinator an opaque connection id, the direction of flow and the
/// capture timestamp (seconds) of the packet that completed the data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamContext {
    pub connection_id: u64,
    pub direction: Direction,
    pub timestamp: f64,
}

impl StreamContext {
    pub fn new(connection_id: u64, direction: Direction, timestamp: f64) -> Self {
        Self {
            connection_id,
            direction,
            timestamp,
        }
    }

    /// Client-to-server data.
    pub fn to_server(connection_id: u64, timestamp: f64) -> Self {
        Self::new(connection_id, Direction::ClientToServer, timestamp)
    }

    /// Server-to-client data.
    pub fn to_client(connection_id: u64, timestamp: f64) -> Self {
        Self::new(connection_id, Direction::ServerToClient, timestamp)
    }

    /// Same connection and timestamp, opposite direction.
    pub fn reversed(&self) -> Self {
        let direction = match self.direction {
            Direction::ClientToServer => Direction::ServerToClient,
            Direction::ServerToClient => Direction::ClientToServer,
        };
        Self { direction, ..*self }
    }
}
