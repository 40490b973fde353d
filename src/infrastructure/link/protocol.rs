//! BreezeBlue Command Protocol
//!
//! Wire definitions for the packets exchanged with the drone.

use crate::domain::models::ControlSample;
use thiserror::Error;

/// BreezeBlue BLE service UUID (Crazyflie-family BLE profile)
pub const SERVICE_UUID: &str = "00000201-1c7f-4f9e-947b-43b7c00a9a08";

/// CRTP characteristic UUID - where command packets are written
pub const CRTP_CHAR_UUID: &str = "00000202-1c7f-4f9e-947b-43b7c00a9a08";

/// CRTP-up characteristic UUID - for packets split across writes
pub const CRTP_UP_CHAR_UUID: &str = "00000203-1c7f-4f9e-947b-43b7c00a9a08";

/// Size of an encoded command packet: header + 3 x f32 + u16
pub const COMMAND_PACKET_LEN: usize = 15;

/// Full-scale thrust on the wire
pub const THRUST_MAX: u16 = u16::MAX;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("empty packet")]
    Empty,
    #[error("unknown packet header: {0:#04X}")]
    UnknownHeader(u8),
    #[error("invalid packet size: {actual} (expected {expected})")]
    InvalidLength { expected: usize, actual: usize },
    #[error("non-finite {0} value")]
    NonFinite(&'static str),
}

/// Packet-type discriminator carried in the first byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketHeader {
    /// Roll/pitch/yaw/thrust setpoint
    Commander = 0x30,
}

impl PacketHeader {
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for PacketHeader {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x30 => Ok(Self::Commander),
            other => Err(ProtocolError::UnknownHeader(other)),
        }
    }
}

/// Decoded form of a commander packet
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandPacket {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub thrust: u16,
}

impl CommandPacket {
    pub fn header(&self) -> PacketHeader {
        PacketHeader::Commander
    }

    pub fn from_sample(sample: &ControlSample) -> Self {
        Self {
            roll: sample.roll(),
            pitch: sample.pitch(),
            yaw: sample.yaw(),
            thrust: thrust_to_wire(sample.thrust()),
        }
    }

    /// Serialize to the fixed little-endian wire layout
    ///
    /// ```text
    /// [0]     : Header (0x30)
    /// [1-4]   : Roll (f32)
    /// [5-8]   : Pitch (f32)
    /// [9-12]  : Yaw (f32)
    /// [13-14] : Thrust (u16, 0-65535)
    /// ```
    pub fn to_bytes(&self) -> [u8; COMMAND_PACKET_LEN] {
        let mut bytes = [0u8; COMMAND_PACKET_LEN];
        bytes[0] = PacketHeader::Commander.as_byte();
        bytes[1..5].copy_from_slice(&self.roll.to_le_bytes());
        bytes[5..9].copy_from_slice(&self.pitch.to_le_bytes());
        bytes[9..13].copy_from_slice(&self.yaw.to_le_bytes());
        bytes[13..15].copy_from_slice(&self.thrust.to_le_bytes());
        bytes
    }
}

/// Map normalized thrust onto the u16 wire range: `round(thrust * 65535)`,
/// clamped. NaN maps to zero.
pub fn thrust_to_wire(thrust: f32) -> u16 {
    if thrust.is_nan() {
        return 0;
    }
    (thrust * THRUST_MAX as f32)
        .round()
        .clamp(0.0, THRUST_MAX as f32) as u16
}

/// Encode one control sample into a command packet
pub fn encode(sample: &ControlSample) -> [u8; COMMAND_PACKET_LEN] {
    CommandPacket::from_sample(sample).to_bytes()
}

/// Decode and validate a commander packet
pub fn decode(bytes: &[u8]) -> Result<CommandPacket, ProtocolError> {
    let first = *bytes.first().ok_or(ProtocolError::Empty)?;
    PacketHeader::try_from(first)?;

    if bytes.len() != COMMAND_PACKET_LEN {
        return Err(ProtocolError::InvalidLength {
            expected: COMMAND_PACKET_LEN,
            actual: bytes.len(),
        });
    }

    let roll = read_f32(bytes, 1, "roll")?;
    let pitch = read_f32(bytes, 5, "pitch")?;
    let yaw = read_f32(bytes, 9, "yaw")?;
    let thrust = u16::from_le_bytes([bytes[13], bytes[14]]);

    Ok(CommandPacket {
        roll,
        pitch,
        yaw,
        thrust,
    })
}

fn read_f32(bytes: &[u8], offset: usize, field: &'static str) -> Result<f32, ProtocolError> {
    let value = f32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ]);
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ProtocolError::NonFinite(field))
    }
}

/// Packets the drone may send back over the link
#[derive(Debug, Clone, PartialEq)]
pub enum InboundPacket {
    Command(CommandPacket),
}

/// Classify an inbound packet by its header
pub fn parse_inbound(bytes: &[u8]) -> Result<InboundPacket, ProtocolError> {
    let first = *bytes.first().ok_or(ProtocolError::Empty)?;
    match PacketHeader::try_from(first)? {
        PacketHeader::Commander => decode(bytes).map(InboundPacket::Command),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thrust_scaling() {
        assert_eq!(thrust_to_wire(0.0), 0);
        assert_eq!(thrust_to_wire(1.0), 65535);
        assert_eq!(thrust_to_wire(-0.5), 0);
        assert_eq!(thrust_to_wire(1.5), 65535);
        assert_eq!(thrust_to_wire(0.5), 32768);
        assert_eq!(thrust_to_wire(f32::NAN), 0);
    }

    #[test]
    fn test_encode_layout() {
        let sample = ControlSample::new(0.25, -0.5, 0.75, 1.0);
        let bytes = encode(&sample);

        assert_eq!(bytes.len(), COMMAND_PACKET_LEN);
        assert_eq!(bytes[0], 0x30);
        assert_eq!(&bytes[1..5], &(-0.5f32).to_le_bytes());
        assert_eq!(&bytes[5..9], &0.25f32.to_le_bytes());
        assert_eq!(&bytes[9..13], &0.75f32.to_le_bytes());
        assert_eq!(&bytes[13..15], &[0xFF, 0xFF]);
    }

    #[test]
    fn test_encode_clamps_bad_input() {
        let sample = ControlSample::new(f32::NAN, 4.0, f32::NEG_INFINITY, -0.5);
        let packet = decode(&encode(&sample)).unwrap();

        assert_eq!(packet.pitch, 0.0);
        assert_eq!(packet.roll, 1.0);
        assert_eq!(packet.yaw, -1.0);
        assert_eq!(packet.thrust, 0);
    }

    #[test]
    fn test_decode_matches_input() {
        for &(pitch, roll, yaw, thrust) in &[
            (0.1f32, -0.2f32, 0.3f32, 0.42f32),
            (-1.0, 1.0, 0.0, 0.0),
            (0.999, -0.001, -0.5, 0.123),
        ] {
            let packet = decode(&encode(&ControlSample::new(pitch, roll, yaw, thrust))).unwrap();
            assert!((packet.pitch - pitch).abs() < f32::EPSILON);
            assert!((packet.roll - roll).abs() < f32::EPSILON);
            assert!((packet.yaw - yaw).abs() < f32::EPSILON);
            assert_eq!(packet.thrust, (thrust * 65535.0).round() as u16);
        }
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert_eq!(decode(&[]), Err(ProtocolError::Empty));
        assert_eq!(decode(&[0x31; 15]), Err(ProtocolError::UnknownHeader(0x31)));
        assert_eq!(
            decode(&[0x30, 0, 0]),
            Err(ProtocolError::InvalidLength {
                expected: 15,
                actual: 3
            })
        );

        let mut bytes = encode(&ControlSample::default());
        bytes[5..9].copy_from_slice(&f32::NAN.to_le_bytes());
        assert_eq!(decode(&bytes), Err(ProtocolError::NonFinite("pitch")));
    }

    #[test]
    fn test_parse_inbound() {
        let bytes = encode(&ControlSample::new(0.0, 0.0, 0.0, 0.5));
        match parse_inbound(&bytes).unwrap() {
            InboundPacket::Command(packet) => assert_eq!(packet.thrust, 32768),
        }
        assert!(parse_inbound(&[0x7F, 0x00]).is_err());
    }
}
