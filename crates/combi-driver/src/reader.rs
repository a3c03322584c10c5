//! Frame acquisition from a transport.
//!
//! The tag byte is awaited with the request timeout. Once a frame has
//! started, its remaining bytes must follow within the character timeout.
//! The reader asks the [`FrameAssembler`] how many bytes the current stage
//! still needs and never reads past the end of a frame.

use std::time::Duration;

use combi_core::Error;
use combi_protocol::{Frame, FrameAssembler};
use combi_transport::{Result, Transport};

/// Result of one read cycle.
#[derive(Debug)]
pub enum ReadOutcome {
    /// A complete, well-formed frame.
    Frame(Frame),

    /// No tag byte arrived within the request timeout.
    Timeout,

    /// Unknown tag, malformed field or frame cut short. The bytes read so
    /// far are lost.
    Discarded(Error),
}

/// Read one frame.
///
/// # Errors
///
/// Only transport failures are returned as errors; protocol problems are
/// reported as [`ReadOutcome::Discarded`].
pub async fn read_frame<T: Transport>(
    transport: &mut T,
    request_timeout: Duration,
    character_timeout: Duration,
) -> Result<ReadOutcome> {
    transport.set_timeout(request_timeout);
    let head = transport.read(1).await?;
    let Some(&tag) = head.first() else {
        return Ok(ReadOutcome::Timeout);
    };

    let mut assembler = match FrameAssembler::start(tag) {
        Ok(assembler) => assembler,
        Err(e) => return Ok(ReadOutcome::Discarded(e)),
    };

    transport.set_timeout(character_timeout);
    let mut received = 1;
    loop {
        let wanted = assembler.remaining();
        let chunk = transport.read(wanted).await?;
        if chunk.is_empty() {
            return Ok(ReadOutcome::Discarded(Error::Truncated {
                tag: tag as char,
                expected: received + wanted,
                actual: received,
            }));
        }
        received += chunk.len();
        for byte in chunk {
            match assembler.push(byte) {
                Ok(Some(frame)) => return Ok(ReadOutcome::Frame(frame)),
                Ok(None) => {}
                Err(e) => return Ok(ReadOutcome::Discarded(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use combi_core::LockPosition;
    use combi_transport::MockTransport;

    const REQUEST: Duration = Duration::from_millis(500);
    const CHARACTER: Duration = Duration::from_millis(10);

    async fn open_mock() -> (MockTransport, combi_transport::MockTransportHandle) {
        let (mut transport, handle) = MockTransport::new();
        transport.open().await.unwrap();
        (transport, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_fixed_frame() {
        let (mut transport, handle) = open_mock().await;
        handle.inject(b"LX");
        let outcome = read_frame(&mut transport, REQUEST, CHARACTER).await.unwrap();
        assert!(matches!(
            outcome,
            ReadOutcome::Frame(Frame::Lock {
                position: LockPosition::X
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_one_frame_at_a_time() {
        let (mut transport, handle) = open_mock().await;
        handle.inject(b"DOM0051&A?2B3C");
        let first = read_frame(&mut transport, REQUEST, CHARACTER).await.unwrap();
        assert!(matches!(first, ReadOutcome::Frame(Frame::Drawer { open: true })));
        let second = read_frame(&mut transport, REQUEST, CHARACTER).await.unwrap();
        let ReadOutcome::Frame(Frame::Msr { payload }) = second else {
            panic!("expected MSR frame, got {:?}", second);
        };
        assert_eq!(payload, b"1&A?2".to_vec());
        let third = read_frame(&mut transport, REQUEST, CHARACTER).await.unwrap();
        assert!(matches!(
            third,
            ReadOutcome::Frame(Frame::Keyboard { row: 3, column: 2 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_without_tag() {
        let (mut transport, _handle) = open_mock().await;
        let outcome = read_frame(&mut transport, REQUEST, CHARACTER).await.unwrap();
        assert!(matches!(outcome, ReadOutcome::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_tag_discarded() {
        let (mut transport, handle) = open_mock().await;
        handle.inject(b"QLX");
        let outcome = read_frame(&mut transport, REQUEST, CHARACTER).await.unwrap();
        assert!(matches!(
            outcome,
            ReadOutcome::Discarded(Error::UnknownTag(b'Q'))
        ));
        // The reader resynchronizes on the next tag.
        let outcome = read_frame(&mut transport, REQUEST, CHARACTER).await.unwrap();
        assert!(matches!(outcome, ReadOutcome::Frame(Frame::Lock { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_frame_discarded() {
        let (mut transport, handle) = open_mock().await;
        handle.inject(b"SO-0000");
        let outcome = read_frame(&mut transport, REQUEST, CHARACTER).await.unwrap();
        let ReadOutcome::Discarded(Error::Truncated {
            tag,
            expected,
            actual,
        }) = outcome
        else {
            panic!("expected truncated frame, got {:?}", outcome);
        };
        assert_eq!(tag, 'S');
        assert_eq!(actual, 7);
        assert_eq!(expected, 15);
    }

    #[tokio::test(start_paused = true)]
    async fn test_io_failure_is_error() {
        let (mut transport, handle) = open_mock().await;
        handle.fail_next_io();
        assert!(read_frame(&mut transport, REQUEST, CHARACTER).await.is_err());
    }
}
