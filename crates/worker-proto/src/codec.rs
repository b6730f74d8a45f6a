use std::io::Cursor;

use bytes::{Buf, BytesMut};

use crate::CodecError;

/// Incremental msgpack frame decoder.
///
/// `feed` appends bytes delivered by a single socket read, which may carry a
/// fractional, single, or several frames. `next_value` drains as many
/// complete top-level msgpack values as are currently buffered; a trailing
/// partial frame is left in the buffer for the next `feed`.
#[derive(Default)]
pub struct Decoder {
    buffer: BytesMut,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Returns the next fully-buffered msgpack value, or `None` if the
    /// buffer is exhausted or holds only a partial frame.
    ///
    /// A value that fails to decode for reasons other than running out of
    /// bytes is malformed: the leading byte is dropped and decoding resumes
    /// from there, since msgpack carries no other self-synchronising
    /// boundary to skip to.
    pub fn next_value(&mut self) -> Result<Option<rmpv::Value>, CodecError> {
        loop {
            if self.buffer.is_empty() {
                return Ok(None);
            }

            let mut cursor = Cursor::new(&self.buffer[..]);
            match rmpv::decode::read_value(&mut cursor) {
                Ok(value) => {
                    let consumed = cursor.position() as usize;
                    self.buffer.advance(consumed);
                    return Ok(Some(value));
                }
                Err(err) if is_truncated(&err) => return Ok(None),
                Err(err) => {
                    tracing::warn!(
                        "dropping malformed frame byte: error={}",
                        err
                    );
                    self.buffer.advance(1);
                    if self.buffer.is_empty() {
                        return Ok(None);
                    }
                }
            }
        }
    }
}

fn is_truncated(err: &rmpv::decode::Error) -> bool {
    match err {
        rmpv::decode::Error::InvalidMarkerRead(io_err)
        | rmpv::decode::Error::InvalidDataRead(io_err) => {
            io_err.kind() == std::io::ErrorKind::UnexpectedEof
        }
    }
}

#[cfg(test)]
mod tests {
    use rmpv::Value;

    use super::Decoder;

    #[test]
    fn feeds_partial_frame_across_two_reads() {
        let mut buf = Vec::new();
        rmpv::encode::write_value(
            &mut buf,
            &Value::Array(vec![Value::from(1_i64), Value::from(1_u64)]),
        )
        .unwrap();

        let mut decoder = Decoder::new();
        let split = buf.len() / 2;
        decoder.feed(&buf[..split]);
        assert!(decoder.next_value().unwrap().is_none());

        decoder.feed(&buf[split..]);
        let value = decoder.next_value().unwrap().unwrap();
        assert_eq!(value, Value::Array(vec![Value::from(1_i64), Value::from(1_u64)]));
        assert!(decoder.next_value().unwrap().is_none());
    }

    #[test]
    fn decodes_several_queued_frames_in_order() {
        let mut buf = Vec::new();
        for session in 0..3_u64 {
            rmpv::encode::write_value(
                &mut buf,
                &Value::Array(vec![Value::from(1_i64), Value::from(session)]),
            )
            .unwrap();
        }

        let mut decoder = Decoder::new();
        decoder.feed(&buf);

        for session in 0..3_u64 {
            let value = decoder.next_value().unwrap().unwrap();
            assert_eq!(
                value,
                Value::Array(vec![Value::from(1_i64), Value::from(session)])
            );
        }
        assert!(decoder.next_value().unwrap().is_none());
    }

    #[test]
    fn skips_malformed_leading_byte_and_resyncs() {
        let mut buf = vec![0xc1_u8]; // msgpack reserves 0xc1, always invalid
        rmpv::encode::write_value(&mut buf, &Value::from(7_i64)).unwrap();

        let mut decoder = Decoder::new();
        decoder.feed(&buf);

        let value = decoder.next_value().unwrap().unwrap();
        assert_eq!(value, Value::from(7_i64));
    }
}
