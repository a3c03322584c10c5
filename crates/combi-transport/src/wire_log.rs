//! Wire traffic logging.
//!
//! Every transport logs the bytes it moves at `trace` level, rendered
//! according to the configured [`LoggingType`]:
//!
//! ```text
//! EscapeString   SO-000000000000\r\n -> "SO-000000000000\x0D\x0A"
//! HexString      SR                  -> "53 52"
//! None           (nothing logged)
//! ```

use combi_core::LoggingType;
use tracing::trace;

/// Renders and logs traffic for one transport.
#[derive(Debug, Clone)]
pub struct WireLogger {
    kind: LoggingType,
    target: String,
}

impl WireLogger {
    pub fn new(kind: LoggingType, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
        }
    }

    pub fn kind(&self) -> LoggingType {
        self.kind
    }

    /// Log bytes received from the device.
    pub fn inbound(&self, data: &[u8]) {
        if let Some(text) = render(self.kind, data) {
            trace!(target: "combi::wire", port = %self.target, "<< {}", text);
        }
    }

    /// Log bytes sent to the device.
    pub fn outbound(&self, data: &[u8]) {
        if let Some(text) = render(self.kind, data) {
            trace!(target: "combi::wire", port = %self.target, ">> {}", text);
        }
    }
}

/// Render bytes for logging, `None` if logging is disabled or there is
/// nothing to log.
pub fn render(kind: LoggingType, data: &[u8]) -> Option<String> {
    if data.is_empty() {
        return None;
    }
    match kind {
        LoggingType::None => None,
        LoggingType::EscapeString => Some(escape(data)),
        LoggingType::HexString => Some(
            data.iter()
                .map(|b| format!("{:02X}", b))
                .collect::<Vec<_>>()
                .join(" "),
        ),
    }
}

fn escape(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() + 2);
    out.push('"');
    for &b in data {
        match b {
            b'"' | b'\\' => {
                out.push('\\');
                out.push(b as char);
            }
            0x20..=0x7E => out.push(b as char),
            other => out.push_str(&format!("\\x{:02X}", other)),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(LoggingType::EscapeString, b"SR".as_slice(), Some("\"SR\""))]
    #[case(LoggingType::EscapeString, b"A\r\n".as_slice(), Some("\"A\\x0D\\x0A\""))]
    #[case(LoggingType::EscapeString, b"a\"b".as_slice(), Some("\"a\\\"b\""))]
    #[case(LoggingType::HexString, b"SR".as_slice(), Some("53 52"))]
    #[case(LoggingType::None, b"SR".as_slice(), None)]
    #[case(LoggingType::HexString, b"".as_slice(), None)]
    fn test_render(#[case] kind: LoggingType, #[case] data: &[u8], #[case] expected: Option<&str>) {
        assert_eq!(render(kind, data).as_deref(), expected);
    }
}
