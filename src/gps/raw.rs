// src/gps/raw.rs
//! Raw sentence capture for troubleshooting
//!
//! Reads an open source for a fixed time without decoding anything beyond
//! the sentence address, and tallies what arrived. Answers the first
//! question when the status goes `LOST`: is the receiver talking at all?

use super::source::LineReader;
use crate::error::ReadError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

/// Longest single wait, so a silent device still ends on time.
const POLL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Nothing at all came over the line.
    NoData,
    /// Lines arrived but none of them carry a position.
    NoPositionSentences,
    Communicating,
}

impl Verdict {
    pub fn describe(&self) -> &'static str {
        match self {
            Verdict::NoData => "no GPS data received, check the wiring and the device path",
            Verdict::NoPositionSentences => "GPS data received but no position sentences",
            Verdict::Communicating => "GPS is communicating",
        }
    }
}

/// Tally of one capture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RawCapture {
    pub lines: u64,
    /// Keyed by full address, e.g. `GPGGA`, `GNRMC`. Lines without one are under `other`.
    pub by_address: BTreeMap<String, u64>,
    pub position_sentences: u64,
    /// Read failure that ended the capture before its time ran out.
    pub ended_early: Option<String>,
}

impl RawCapture {
    pub fn record(&mut self, line: &str) {
        self.lines += 1;
        let key = match sentence_address(line) {
            Some(address) => {
                if matches!(&address[2..], "GGA" | "RMC") {
                    self.position_sentences += 1;
                }
                address.to_string()
            }
            None => "other".to_string(),
        };
        *self.by_address.entry(key).or_default() += 1;
    }

    pub fn verdict(&self) -> Verdict {
        if self.lines == 0 {
            Verdict::NoData
        } else if self.position_sentences == 0 {
            Verdict::NoPositionSentences
        } else {
            Verdict::Communicating
        }
    }
}

/// The five-character address of a `$`-framed sentence, without checking its checksum.
pub fn sentence_address(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix('$')?;
    let end = rest.find([',', '*']).unwrap_or(rest.len());
    let address = &rest[..end];
    (address.len() == 5 && address.bytes().all(|b| b.is_ascii_alphanumeric())).then_some(address)
}

/// Read `reader` for `duration`, handing every non-empty line to `on_line`.
///
/// Timeouts are expected on a quiet line and don't end the capture; any
/// other read error does.
pub async fn capture<R: LineReader>(reader: &mut R, duration: Duration, mut on_line: impl FnMut(&str)) -> RawCapture {
    let deadline = Instant::now() + duration;
    let mut tally = RawCapture::default();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match reader.read_line(remaining.min(POLL)).await {
            Ok(line) if line.is_empty() => {}
            Ok(line) => {
                tally.record(&line);
                on_line(&line);
            }
            Err(ReadError::Timeout(_)) => {}
            Err(e) => {
                tally.ended_early = Some(e.to_string());
                break;
            }
        }
    }
    tally
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use tokio::time::sleep;

    const GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";
    const RMC: &str = "$GNRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*74";
    const GSV: &str = "$GPGSV,3,1,11,03,03,111,00,04,15,270,00,06,01,010,00,13,06,292,00*74";

    /// Replays lines one per second, then either goes quiet or closes.
    struct Replay {
        lines: VecDeque<&'static str>,
        close_when_done: bool,
    }

    impl Replay {
        fn new(lines: &[&'static str], close_when_done: bool) -> Self {
            Self {
                lines: lines.iter().copied().collect(),
                close_when_done,
            }
        }
    }

    impl LineReader for Replay {
        async fn read_line(&mut self, timeout: Duration) -> Result<String, ReadError> {
            match self.lines.pop_front() {
                Some(line) => {
                    sleep(Duration::from_secs(1).min(timeout)).await;
                    Ok(line.to_string())
                }
                None if self.close_when_done => Err(ReadError::Closed),
                None => {
                    sleep(timeout).await;
                    Err(ReadError::Timeout(timeout))
                }
            }
        }

        async fn close(self) {}
    }

    #[test]
    fn test_sentence_address() {
        assert_eq!(sentence_address(GGA), Some("GPGGA"));
        assert_eq!(sentence_address("  $GNRMC*00"), Some("GNRMC"));
        assert_eq!(sentence_address("$PMTK001,604,3*32"), None);
        assert_eq!(sentence_address("GPGGA,123519"), None);
        assert_eq!(sentence_address("$GP"), None);
        assert_eq!(sentence_address(""), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_counts_by_address() {
        let mut reader = Replay::new(&[GGA, RMC, GSV, GSV, "\u{fffd}garbage", ""], false);
        let mut echoed = Vec::new();
        let tally = capture(&mut reader, Duration::from_secs(30), |line| echoed.push(line.to_string())).await;

        assert_eq!(tally.lines, 5);
        assert_eq!(echoed.len(), 5);
        assert_eq!(tally.by_address["GPGGA"], 1);
        assert_eq!(tally.by_address["GNRMC"], 1);
        assert_eq!(tally.by_address["GPGSV"], 2);
        assert_eq!(tally.by_address["other"], 1);
        assert_eq!(tally.position_sentences, 2);
        assert_eq!(tally.verdict(), Verdict::Communicating);
        assert!(tally.ended_early.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_device_ends_on_time() {
        let mut reader = Replay::new(&[], false);
        let started = Instant::now();
        let tally = capture(&mut reader, Duration::from_secs(10), |_| {}).await;

        assert_eq!(started.elapsed(), Duration::from_secs(10));
        assert_eq!(tally.verdict(), Verdict::NoData);
        assert!(tally.ended_early.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_position_sentences() {
        let mut reader = Replay::new(&[GSV, GSV, "$GPGSA,A,1,,,,,,,,,,,,,,,*1E"], false);
        let tally = capture(&mut reader, Duration::from_secs(5), |_| {}).await;

        assert_eq!(tally.lines, 3);
        assert_eq!(tally.verdict(), Verdict::NoPositionSentences);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_stream_ends_early() {
        let mut reader = Replay::new(&[RMC], true);
        let started = Instant::now();
        let tally = capture(&mut reader, Duration::from_secs(60), |_| {}).await;

        assert!(started.elapsed() < Duration::from_secs(60));
        assert_eq!(tally.lines, 1);
        assert_eq!(tally.ended_early.as_deref(), Some("source closed the stream"));
    }
}
