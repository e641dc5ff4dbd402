//! Handshake initiation wire format
//!
//! Only the initiation is composed here; the engine marshals it and hands the
//! bytes to the MAC collaborator before transmission.

use crate::error::ProtocolError;

/// WireGuard message types
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    HandshakeInitiation = 1,
    HandshakeResponse = 2,
    CookieReply = 3,
    TransportData = 4,
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::HandshakeInitiation),
            2 => Ok(Self::HandshakeResponse),
            3 => Ok(Self::CookieReply),
            4 => Ok(Self::TransportData),
            _ => Err(ProtocolError::InvalidMessageType { msg_type: value }),
        }
    }
}

/// Handshake Initiation message (148 bytes)
///
/// ```text
/// type(1) | reserved(3) | sender_index(4) | ephemeral_public(32) |
/// encrypted_static(48) | encrypted_timestamp(28) | mac1(16) | mac2(16)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeInitiation {
    pub sender_index: u32,
    pub ephemeral_public: [u8; 32],
    pub encrypted_static: [u8; 48],
    pub encrypted_timestamp: [u8; 28],
    pub mac1: [u8; 16],
    pub mac2: [u8; 16],
}

impl HandshakeInitiation {
    pub const SIZE: usize = 148;

    /// Offset of mac1; everything before it is covered by mac1
    pub const MAC1_OFFSET: usize = 116;

    /// Offset of mac2; everything before it is covered by mac2
    pub const MAC2_OFFSET: usize = 132;

    /// MACs start zeroed and are filled in after marshalling
    pub fn new(
        sender_index: u32,
        ephemeral_public: [u8; 32],
        encrypted_static: [u8; 48],
        encrypted_timestamp: [u8; 28],
    ) -> Self {
        Self {
            sender_index,
            ephemeral_public,
            encrypted_static,
            encrypted_timestamp,
            mac1: [0u8; 16],
            mac2: [0u8; 16],
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];

        buf[0] = MessageType::HandshakeInitiation as u8;
        // buf[1..4] reserved
        buf[4..8].copy_from_slice(&self.sender_index.to_le_bytes());
        buf[8..40].copy_from_slice(&self.ephemeral_public);
        buf[40..88].copy_from_slice(&self.encrypted_static);
        buf[88..116].copy_from_slice(&self.encrypted_timestamp);
        buf[116..132].copy_from_slice(&self.mac1);
        buf[132..148].copy_from_slice(&self.mac2);

        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < Self::SIZE {
            return Err(ProtocolError::InvalidMessageLength {
                expected: Self::SIZE,
                got: data.len(),
            });
        }

        if data[0] != MessageType::HandshakeInitiation as u8 {
            return Err(ProtocolError::InvalidMessageType { msg_type: data[0] });
        }

        let mut sender_index = [0u8; 4];
        sender_index.copy_from_slice(&data[4..8]);

        let mut msg = Self::new(
            u32::from_le_bytes(sender_index),
            [0u8; 32],
            [0u8; 48],
            [0u8; 28],
        );
        msg.ephemeral_public.copy_from_slice(&data[8..40]);
        msg.encrypted_static.copy_from_slice(&data[40..88]);
        msg.encrypted_timestamp.copy_from_slice(&data[88..116]);
        msg.mac1.copy_from_slice(&data[116..132]);
        msg.mac2.copy_from_slice(&data[132..148]);

        Ok(msg)
    }
}
