use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// A timed span of transcribed speech.
///
/// Invariant: `start <= end`. Segments are ordered by start time as emitted
/// by the transcriber and that order is preserved through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Transcribed text
    pub text: String,
}

impl Segment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

/// A segment with its timings rendered as `H:MM:SS.mmm` strings.
/// Presentation-layer derivative of [`Segment`], not independently mutable.
#[derive(Debug, Clone, PartialEq)]
pub struct FormattedSegment {
    pub start: String,
    pub end: String,
    pub text: String,
}

/// Format a seconds offset as `H:MM:SS.mmm`.
///
/// Timings carry whole-second precision, so the millisecond field is always
/// zero. Hours are unpadded; minutes and seconds are two digits.
pub fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    format!("{}:{:02}:{:02}.000", hours, minutes, secs)
}

/// Render segments for presentation, preserving order.
pub fn format_segments(segments: &[Segment]) -> Vec<FormattedSegment> {
    segments
        .iter()
        .map(|seg| FormattedSegment {
            start: format_timestamp(seg.start),
            end: format_timestamp(seg.end),
            text: seg.text.clone(),
        })
        .collect()
}

/// Streaming transcript writer that flushes after each line
pub struct TranscriptWriter<W: Write> {
    writer: BufWriter<W>,
    count: usize,
}

impl<W: Write> TranscriptWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            count: 0,
        }
    }

    /// Write one `[<start> --> <end>] <text>` line and flush immediately
    pub fn write_segment(&mut self, segment: &FormattedSegment) -> io::Result<()> {
        writeln!(
            self.writer,
            "[{} --> {}] {}",
            segment.start, segment.end, segment.text
        )?;
        self.writer.flush()?;
        self.count += 1;
        Ok(())
    }

    /// Number of lines written so far
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn finish(mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl TranscriptWriter<File> {
    /// Create a transcript writer, truncating any existing file at `path`
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(Self::new(File::create(path)?))
    }
}

/// Write a whole transcript to `path`, one line per segment, in order,
/// overwriting any existing file.
pub fn save_transcript(path: &Path, segments: &[FormattedSegment]) -> io::Result<()> {
    let mut writer = TranscriptWriter::create(path)?;
    for segment in segments {
        writer.write_segment(segment)?;
    }
    writer.finish()
}

/// Read a transcript file back into formatted segments.
pub fn read_transcript(path: &Path) -> io::Result<Vec<FormattedSegment>> {
    parse_transcript(BufReader::new(File::open(path)?))
}

fn parse_transcript<R: BufRead>(reader: R) -> io::Result<Vec<FormattedSegment>> {
    let mut segments = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let malformed = || {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("malformed transcript line: {}", line),
            )
        };

        let rest = line.strip_prefix('[').ok_or_else(malformed)?;
        let (times, text) = rest.split_once("] ").ok_or_else(malformed)?;
        let (start, end) = times.split_once(" --> ").ok_or_else(malformed)?;

        segments.push(FormattedSegment {
            start: start.to_string(),
            end: end.to_string(),
            text: text.to_string(),
        });
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "0:00:00.000");
        assert_eq!(format_timestamp(5.0), "0:00:05.000");
        assert_eq!(format_timestamp(61.0), "0:01:01.000");
        assert_eq!(format_timestamp(3600.0), "1:00:00.000");
        assert_eq!(format_timestamp(3661.25), "1:01:01.000");
    }

    #[test]
    fn test_format_timestamp_truncates_fraction() {
        // Sub-second precision is dropped, never rounded up
        assert_eq!(format_timestamp(5.999), "0:00:05.000");
    }

    #[test]
    fn test_format_segments_preserves_order() {
        let segments = vec![
            Segment::new(0.0, 2.5, "first"),
            Segment::new(2.5, 5.0, "second"),
        ];

        let formatted = format_segments(&segments);
        assert_eq!(formatted.len(), 2);
        assert_eq!(formatted[0].start, "0:00:00.000");
        assert_eq!(formatted[0].end, "0:00:02.000");
        assert_eq!(formatted[0].text, "first");
        assert_eq!(formatted[1].text, "second");
    }

    #[test]
    fn test_transcript_line_format() {
        let mut buffer = Vec::new();
        let mut writer = TranscriptWriter::new(&mut buffer);
        writer
            .write_segment(&FormattedSegment {
                start: "0:00:00.000".to_string(),
                end: "0:00:02.000".to_string(),
                text: "hello world".to_string(),
            })
            .unwrap();
        assert_eq!(writer.count(), 1);
        writer.finish().unwrap();

        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "[0:00:00.000 --> 0:00:02.000] hello world\n"
        );
    }

    #[test]
    fn test_transcript_roundtrip() {
        let segments = format_segments(&[
            Segment::new(0.0, 2.0, "first line"),
            Segment::new(2.0, 4.5, "second [bracketed] line"),
        ]);

        let mut buffer = Vec::new();
        let mut writer = TranscriptWriter::new(&mut buffer);
        for segment in &segments {
            writer.write_segment(segment).unwrap();
        }
        writer.finish().unwrap();

        let parsed = parse_transcript(buffer.as_slice()).unwrap();
        assert_eq!(parsed, segments);
    }

    #[test]
    fn test_save_and_read_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.txt");

        let segments = format_segments(&[Segment::new(1.0, 3.0, "one"), Segment::new(3.0, 6.0, "two")]);
        save_transcript(&path, &segments).unwrap();

        let parsed = read_transcript(&path).unwrap();
        assert_eq!(parsed, segments);

        // A second save truncates, not appends
        save_transcript(&path, &segments[..1]).unwrap();
        assert_eq!(read_transcript(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_rejects_malformed_line() {
        let err = parse_transcript("no brackets here\n".as_bytes()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
