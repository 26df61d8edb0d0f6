//! Serial port bridged over tokio channels.
//!
//! [`ChannelSerial`] implements [`SerialPort`] on top of bounded
//! `tokio::sync::mpsc` channels, so the synchronous station loop can run on a
//! blocking thread while an async task owns the real device (or plays the
//! controller in tests). The station side never awaits: reads use
//! `try_recv` and writes use `try_send`.
//!
//! # Example
//!
//! ```rust
//! use dcc_station::hal::channel_pair;
//! use dcc_station::traits::SerialPort;
//!
//! let (mut port, mut peer) = channel_pair(8);
//! peer.to_station.try_send(vec![0xFB]).unwrap();
//! assert_eq!(port.read_byte().unwrap(), Some(0xFB));
//!
//! port.write_all(&[0x01]).unwrap();
//! assert_eq!(peer.from_station.try_recv().unwrap(), vec![0x01]);
//! ```

use std::collections::VecDeque;

use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

use crate::traits::SerialPort;

/// Failure on the channel bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChannelSerialError {
    /// The other half was dropped.
    #[error("serial bridge closed")]
    Closed,
    /// The outbound channel is full.
    #[error("serial bridge outbound channel full")]
    Full,
}

/// Station-side half of the bridge.
#[derive(Debug)]
pub struct ChannelSerial {
    rx: mpsc::Receiver<Vec<u8>>,
    tx: mpsc::Sender<Vec<u8>>,
    buffered: VecDeque<u8>,
}

/// Device-side half of the bridge.
#[derive(Debug)]
pub struct SerialPeer {
    /// Bytes the station will read.
    pub to_station: mpsc::Sender<Vec<u8>>,
    /// Bytes the station wrote, one chunk per `write_all`.
    pub from_station: mpsc::Receiver<Vec<u8>>,
}

/// Create a connected bridge with `capacity` chunks in each direction.
pub fn channel_pair(capacity: usize) -> (ChannelSerial, SerialPeer) {
    let (to_station, rx) = mpsc::channel(capacity);
    let (tx, from_station) = mpsc::channel(capacity);
    (
        ChannelSerial {
            rx,
            tx,
            buffered: VecDeque::new(),
        },
        SerialPeer {
            to_station,
            from_station,
        },
    )
}

impl SerialPort for ChannelSerial {
    type Error = ChannelSerialError;

    fn read_byte(&mut self) -> Result<Option<u8>, ChannelSerialError> {
        if let Some(byte) = self.buffered.pop_front() {
            return Ok(Some(byte));
        }
        match self.rx.try_recv() {
            Ok(chunk) => {
                self.buffered.extend(chunk);
                Ok(self.buffered.pop_front())
            }
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(ChannelSerialError::Closed),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ChannelSerialError> {
        self.tx.try_send(bytes.to_vec()).map_err(|e| match e {
            TrySendError::Full(_) => ChannelSerialError::Full,
            TrySendError::Closed(_) => ChannelSerialError::Closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_are_read_bytewise() {
        let (mut port, peer) = channel_pair(4);
        peer.to_station.try_send(vec![1, 2, 3]).unwrap();
        assert_eq!(port.read_byte().unwrap(), Some(1));
        assert_eq!(port.read_byte().unwrap(), Some(2));
        assert_eq!(port.read_byte().unwrap(), Some(3));
        assert_eq!(port.read_byte().unwrap(), None);
    }

    #[test]
    fn dropped_peer_reports_closed() {
        let (mut port, peer) = channel_pair(4);
        drop(peer);
        assert_eq!(port.read_byte(), Err(ChannelSerialError::Closed));
        assert_eq!(port.write_all(&[1]), Err(ChannelSerialError::Closed));
    }

    #[test]
    fn full_outbound_is_reported() {
        let (mut port, _peer) = channel_pair(1);
        port.write_all(&[1]).unwrap();
        assert_eq!(port.write_all(&[2]), Err(ChannelSerialError::Full));
    }
}
