//! Wire codec for ICD frames.
//!
//! The byte layout implemented by [`BinaryCodec`] is provisional and must be confirmed
//! against the controller's interface control document. Everything else talks to the
//! [`IcdCodec`] trait so the layout can be swapped without touching the transport.
//!
//! Frame: `sync u16 | message id u8 | payload length u16 | payload | crc16`, all
//! big-endian, CRC-16/CCITT-FALSE over message id through payload.
//!
//! Telemetry payload: `count u8` then `count` records of `field id u8 | value u32/f32`.

use crate::axis::AxisMask;
use crate::telemetry::{FieldKind, FieldValue, PartialTelemetry, TelemetryField};

use super::error::IcdError;
use super::frame::{CommandFrame, MessageId, CRC_LEN, HEADER_LEN, SYNC_WORD};

const CRC_ALGO: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_IBM_3740);
const TELEMETRY_RECORD_LEN: usize = 5;

pub trait IcdCodec: Send + Sync {
    fn encode(&self, frame: &CommandFrame) -> Vec<u8>;

    /// Decodes one inbound telemetry datagram into the fields it carries.
    fn decode(&self, bytes: &[u8]) -> Result<PartialTelemetry, IcdError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl IcdCodec for BinaryCodec {
    fn encode(&self, frame: &CommandFrame) -> Vec<u8> {
        wrap(frame.message_id(), &command_payload(frame))
    }

    fn decode(&self, bytes: &[u8]) -> Result<PartialTelemetry, IcdError> {
        let (id, payload) = unwrap(bytes)?;
        if id != MessageId::Telemetry as u8 {
            return Err(IcdError::UnexpectedMessage(id));
        }
        decode_telemetry_payload(payload)
    }
}

impl BinaryCodec {
    /// Encodes a telemetry frame, as the controller would. Used by simulators and tests.
    pub fn encode_telemetry(&self, fields: &PartialTelemetry) -> Vec<u8> {
        let present = fields.present();
        let mut payload = Vec::with_capacity(1 + present.len() * TELEMETRY_RECORD_LEN);
        payload.push(present.len() as u8);
        for (field, value) in present {
            payload.push(field.id());
            match value {
                FieldValue::Analog(v) => payload.extend_from_slice(&(v as f32).to_be_bytes()),
                FieldValue::Status(v) => payload.extend_from_slice(&v.to_be_bytes()),
            }
        }
        wrap(MessageId::Telemetry, &payload)
    }

    /// Decodes a command frame, as the controller would.
    pub fn decode_command(&self, bytes: &[u8]) -> Result<CommandFrame, IcdError> {
        let (id, payload) = unwrap(bytes)?;
        let message = MessageId::from_u8(id).ok_or(IcdError::UnexpectedMessage(id))?;
        let mut r = Reader::new(payload);

        let frame = match message {
            MessageId::Stop => CommandFrame::Stop {
                axes: AxisMask::from_bits_retain(r.u8()?),
            },
            MessageId::MultiManualControl => CommandFrame::MultiManualControl {
                axes: AxisMask::from_bits_retain(r.u8()?),
                angles: r.f32x3()?,
                speeds: r.f32x3()?,
            },
            MessageId::PositionOffset => CommandFrame::PositionOffset {
                azimuth: r.f32()?,
                elevation: r.f32()?,
                train: r.f32()?,
            },
            MessageId::TimeOffset => CommandFrame::TimeOffset { seconds: r.f32()? },
            MessageId::FeedOnOff => CommandFrame::FeedOnOff { mask: r.u8()? },
            MessageId::Emergency => CommandFrame::Emergency { code: r.u8()? },
            MessageId::Stow => CommandFrame::Stow,
            MessageId::ServoPreset => CommandFrame::ServoPreset {
                axes: AxisMask::from_bits_retain(r.u8()?),
            },
            MessageId::TrackHeader => CommandFrame::TrackHeader {
                mode: r.u8()?,
                start_unix_ms: r.i64()?,
                cadence_ms: r.u32()?,
            },
            MessageId::TrackPoint => CommandFrame::TrackPoint {
                sequence: r.u32()?,
                angles: r.f32x3()?,
                speeds: r.f32x3()?,
            },
            MessageId::Telemetry => return Err(IcdError::UnexpectedMessage(id)),
        };
        r.finish()?;
        Ok(frame)
    }
}

fn command_payload(frame: &CommandFrame) -> Vec<u8> {
    let mut p = Vec::with_capacity(32);
    match frame {
        CommandFrame::Stop { axes } | CommandFrame::ServoPreset { axes } => p.push(axes.bits()),
        CommandFrame::MultiManualControl {
            axes,
            angles,
            speeds,
        } => {
            p.push(axes.bits());
            put_f32s(&mut p, angles);
            put_f32s(&mut p, speeds);
        }
        CommandFrame::PositionOffset {
            azimuth,
            elevation,
            train,
        } => put_f32s(&mut p, &[*azimuth, *elevation, *train]),
        CommandFrame::TimeOffset { seconds } => put_f32s(&mut p, &[*seconds]),
        CommandFrame::FeedOnOff { mask } => p.push(*mask),
        CommandFrame::Emergency { code } => p.push(*code),
        CommandFrame::Stow => {}
        CommandFrame::TrackHeader {
            mode,
            start_unix_ms,
            cadence_ms,
        } => {
            p.push(*mode);
            p.extend_from_slice(&start_unix_ms.to_be_bytes());
            p.extend_from_slice(&cadence_ms.to_be_bytes());
        }
        CommandFrame::TrackPoint {
            sequence,
            angles,
            speeds,
        } => {
            p.extend_from_slice(&sequence.to_be_bytes());
            put_f32s(&mut p, angles);
            put_f32s(&mut p, speeds);
        }
    }
    p
}

fn put_f32s(out: &mut Vec<u8>, values: &[f32]) {
    for v in values {
        out.extend_from_slice(&v.to_be_bytes());
    }
}

fn wrap(id: MessageId, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len() + CRC_LEN);
    out.extend_from_slice(&SYNC_WORD.to_be_bytes());
    out.push(id as u8);
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend_from_slice(payload);

    let crc = CRC_ALGO.checksum(&out[2..]);
    out.extend_from_slice(&crc.to_be_bytes());
    out
}

/// Validates framing and returns the message id and payload.
fn unwrap(bytes: &[u8]) -> Result<(u8, &[u8]), IcdError> {
    if bytes.len() < HEADER_LEN + CRC_LEN {
        return Err(IcdError::Truncated {
            expected: HEADER_LEN + CRC_LEN,
            actual: bytes.len(),
        });
    }

    let sync = u16::from_be_bytes([bytes[0], bytes[1]]);
    if sync != SYNC_WORD {
        return Err(IcdError::BadSync(sync));
    }

    let id = bytes[2];
    let declared = u16::from_be_bytes([bytes[3], bytes[4]]) as usize;
    let actual = bytes.len() - HEADER_LEN - CRC_LEN;
    if declared > actual {
        return Err(IcdError::Truncated {
            expected: HEADER_LEN + declared + CRC_LEN,
            actual: bytes.len(),
        });
    }
    if declared != actual {
        return Err(IcdError::LengthMismatch { declared, actual });
    }

    let body_end = HEADER_LEN + declared;
    let received = u16::from_be_bytes([bytes[body_end], bytes[body_end + 1]]);
    let computed = CRC_ALGO.checksum(&bytes[2..body_end]);
    if received != computed {
        return Err(IcdError::Checksum { received, computed });
    }

    Ok((id, &bytes[HEADER_LEN..body_end]))
}

fn decode_telemetry_payload(payload: &[u8]) -> Result<PartialTelemetry, IcdError> {
    let mut r = Reader::new(payload);
    let count = r.u8()? as usize;
    let mut fields = PartialTelemetry::default();

    for _ in 0..count {
        let id = r.u8()?;
        let field = TelemetryField::from_id(id).ok_or(IcdError::UnknownField(id))?;
        let value = match field.kind() {
            FieldKind::Analog => FieldValue::Analog(r.f32()? as f64),
            FieldKind::Status => FieldValue::Status(r.u32()?),
        };
        fields.set(field, value);
    }
    r.finish()?;
    Ok(fields)
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], IcdError> {
        let end = self.pos + N;
        let slice = self.buf.get(self.pos..end).ok_or(IcdError::Truncated {
            expected: end,
            actual: self.buf.len(),
        })?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, IcdError> {
        Ok(self.take::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32, IcdError> {
        Ok(u32::from_be_bytes(self.take()?))
    }

    fn i64(&mut self) -> Result<i64, IcdError> {
        Ok(i64::from_be_bytes(self.take()?))
    }

    fn f32(&mut self) -> Result<f32, IcdError> {
        Ok(f32::from_be_bytes(self.take()?))
    }

    fn f32x3(&mut self) -> Result<[f32; 3], IcdError> {
        Ok([self.f32()?, self.f32()?, self.f32()?])
    }

    /// Trailing bytes mean the payload disagrees with its message type.
    fn finish(self) -> Result<(), IcdError> {
        if self.pos != self.buf.len() {
            return Err(IcdError::LengthMismatch {
                declared: self.buf.len(),
                actual: self.pos,
            });
        }
        Ok(())
    }
}
