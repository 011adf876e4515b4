//! Tolerant parser for growing WebVTT-style caption documents
//!
//! The document may be cut off anywhere because it is still being written.
//! Nothing here fails: unreadable blocks are skipped and unreadable
//! timestamps read as `0`.
//!
//! Grammar accepted:
//! - everything before the first line containing `-->` is ignored
//!   (`WEBVTT` header, `NOTE`/`STYLE` blocks, ...)
//! - timestamps are `HH:MM:SS.mmm` or `MM:SS.mmm`; cue settings after the end
//!   timestamp are ignored
//! - cue text runs until a blank line or the next timing line; purely numeric
//!   lines are cue identifiers and are dropped
//! - `<i>...</i>` marks italic runs, every other tag is stripped
//! - `&lt; &gt; &amp; &nbsp;` are decoded

use tracing::trace;

use crate::cue::{Cue, CueSet, StyledSegment};

const RANGE_SEPARATOR: &str = "-->";

/// Parse a caption document into an ordered cue list.
#[must_use]
pub fn parse(document: &str) -> CueSet {
    let document = document.strip_prefix('\u{feff}').unwrap_or(document);
    let lines: Vec<&str> = document.lines().collect();
    let mut cues = CueSet::new();

    // Skip the header: nothing before the first timing line is a cue
    let mut idx = lines
        .iter()
        .position(|line| is_timing_line(line))
        .unwrap_or(lines.len());

    while idx < lines.len() {
        let line = lines[idx];
        idx += 1;
        if !is_timing_line(line) {
            continue;
        }

        let (start_time, end_time) = parse_timing_line(line);

        let mut text_lines = Vec::new();
        while idx < lines.len() {
            let text = lines[idx].trim();
            if text.is_empty() || is_timing_line(text) {
                break;
            }
            if !is_identifier_line(text) {
                text_lines.push(text);
            }
            idx += 1;
        }

        match build_cue(start_time, end_time, &text_lines) {
            Some(cue) => cues.push(cue),
            None => trace!(start_time, end_time, "Dropping cue without text"),
        }
    }

    cues
}

fn is_timing_line(line: &str) -> bool {
    line.contains(RANGE_SEPARATOR)
}

fn is_identifier_line(line: &str) -> bool {
    !line.is_empty() && line.chars().all(|c| c.is_ascii_digit())
}

/// `start --> end [settings]`
fn parse_timing_line(line: &str) -> (f64, f64) {
    let (left, right) = line.split_once(RANGE_SEPARATOR).unwrap_or((line, ""));
    let start = parse_timestamp(left.trim());
    let end = right
        .split_whitespace()
        .next()
        .map_or(0.0, parse_timestamp);

    // Every produced cue keeps start <= end
    (start, end.max(start))
}

/// Parse `HH:MM:SS.mmm` or `MM:SS.mmm` into seconds.
///
/// Anything unreadable yields `0.0`. A malformed cue therefore sorts to the
/// very start of the timeline; this is known and left as is.
#[must_use]
pub fn parse_timestamp(text: &str) -> f64 {
    let parts: Vec<&str> = text.split(':').collect();
    let parsed = match parts.as_slice() {
        [hours, minutes, seconds] => components(hours, minutes, seconds),
        [minutes, seconds] => components("0", minutes, seconds),
        _ => None,
    };

    parsed.unwrap_or_else(|| {
        trace!(timestamp = text, "Unreadable timestamp, using 0");
        0.0
    })
}

fn components(hours: &str, minutes: &str, seconds: &str) -> Option<f64> {
    let hours: u32 = hours.trim().parse().ok()?;
    let minutes: u32 = minutes.trim().parse().ok()?;
    let seconds = seconds.trim();
    // Reject forms f64::from_str accepts but a timestamp never has
    if seconds.is_empty() || !seconds.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    let seconds: f64 = seconds.parse().ok()?;
    Some(f64::from(hours) * 3600.0 + f64::from(minutes) * 60.0 + seconds)
}

fn build_cue(start_time: f64, end_time: f64, text_lines: &[&str]) -> Option<Cue> {
    let raw = text_lines.join("\n");
    if raw.trim().is_empty() {
        return None;
    }

    // Tags come off the markup first; `&lt;b&gt;` is text, not a tag
    let segments: Vec<StyledSegment> = styled_segments(&raw)
        .into_iter()
        .map(|segment| StyledSegment {
            text: decode_entities(&segment.text),
            italic: segment.italic,
        })
        .collect();
    let plain_text: String = segments.iter().map(|s| s.text.as_str()).collect();
    if plain_text.trim().is_empty() {
        return None;
    }

    Some(Cue {
        start_time,
        end_time,
        plain_text,
        segments,
    })
}

/// Decode the fixed entity set in a single pass, so `&amp;lt;` stays `&lt;`.
#[must_use]
pub fn decode_entities(text: &str) -> String {
    const ENTITIES: [(&str, &str); 4] = [
        ("&lt;", "<"),
        ("&gt;", ">"),
        ("&amp;", "&"),
        ("&nbsp;", " "),
    ];

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match ENTITIES.iter().find(|(entity, _)| rest.starts_with(entity)) {
            Some((entity, replacement)) => {
                out.push_str(replacement);
                rest = &rest[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Remove every `<...>` tag, keeping the text between them.
#[must_use]
pub fn strip_tags(text: &str) -> String {
    styled_segments(text).into_iter().map(|s| s.text).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Outside,
    Inside,
}

/// Split raw cue markup into italic and non-italic runs. Entities are left
/// encoded.
///
/// An `<i>` without a matching `</i>` makes the rest of the text italic. A `<`
/// with no closing `>` is literal text.
fn styled_segments(text: &str) -> Vec<StyledSegment> {
    let mut segments = Vec::new();
    let mut state = ScanState::Outside;
    let mut current = String::new();
    let mut rest = text;

    while let Some(open) = rest.find('<') {
        current.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('>') else {
            current.push('<');
            rest = after;
            continue;
        };

        let tag = &after[..close];
        rest = &after[close + 1..];

        match (state, italic_tag(tag)) {
            (ScanState::Outside, Some(true)) => {
                flush(&mut segments, &mut current, false);
                state = ScanState::Inside;
            }
            (ScanState::Inside, Some(false)) => {
                flush(&mut segments, &mut current, true);
                state = ScanState::Outside;
            }
            // Any other tag is stripped
            _ => {}
        }
    }
    current.push_str(rest);
    flush(&mut segments, &mut current, state == ScanState::Inside);

    segments
}

/// `Some(true)` for an opening italic tag, `Some(false)` for a closing one.
fn italic_tag(tag: &str) -> Option<bool> {
    let tag = tag.trim();
    let (closing, body) = match tag.strip_prefix('/') {
        Some(body) => (true, body),
        None => (false, tag),
    };
    // `<i.loud>` carries a class, `<i lang=en>` an annotation
    let name = body
        .split(|c: char| c == '.' || c.is_whitespace())
        .next()
        .unwrap_or("");
    name.eq_ignore_ascii_case("i").then_some(!closing)
}

fn flush(segments: &mut Vec<StyledSegment>, current: &mut String, italic: bool) {
    if current.is_empty() {
        return;
    }
    let text = std::mem::take(current);
    match segments.last_mut() {
        Some(last) if last.italic == italic => last.text.push_str(&text),
        _ => segments.push(StyledSegment { text, italic }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO_A: &str = "WEBVTT\n\n\
        00:01.000 --> 00:03.000\n\
        Hello\n\n\
        00:03.500 --> 00:05.000\n\
        <i>World</i>\n";

    #[test]
    fn test_parse_basic_document() {
        let cues = parse(SCENARIO_A);
        assert_eq!(cues.len(), 2);

        let first = &cues.as_slice()[0];
        assert_eq!(first.start_time, 1.0);
        assert_eq!(first.end_time, 3.0);
        assert_eq!(first.plain_text, "Hello");
        assert_eq!(first.segments, vec![StyledSegment::plain("Hello")]);

        let second = &cues.as_slice()[1];
        assert_eq!(second.start_time, 3.5);
        assert_eq!(second.plain_text, "World");
        assert_eq!(second.segments, vec![StyledSegment::italic("World")]);
    }

    #[test]
    fn test_entities_decoded() {
        let cues = parse("00:00:01.000 --> 00:00:02.000\nTom &amp; Jerry\n");
        assert_eq!(cues.as_slice()[0].plain_text, "Tom & Jerry");
    }

    #[test]
    fn test_entity_decoding_is_single_pass() {
        assert_eq!(decode_entities("&amp;lt;"), "&lt;");
        assert_eq!(decode_entities("a &nbsp;b &copy;"), "a  b &copy;");
        assert_eq!(decode_entities("&"), "&");
    }

    #[test]
    fn test_unterminated_italic_runs_to_end() {
        let cues = parse("00:01.000 --> 00:02.000\n<i>oops\n");
        assert_eq!(cues.as_slice()[0].segments, vec![StyledSegment::italic("oops")]);
        assert_eq!(cues.as_slice()[0].plain_text, "oops");
    }

    #[test]
    fn test_mixed_styles_and_foreign_tags() {
        let cues = parse("00:01.000 --> 00:02.000\n<v Bob>Say <b>hi</b> <i.loud>now</i> ok</v>\n");
        let cue = &cues.as_slice()[0];
        assert_eq!(cue.plain_text, "Say hi now ok");
        assert_eq!(
            cue.segments,
            vec![
                StyledSegment::plain("Say hi "),
                StyledSegment::italic("now"),
                StyledSegment::plain(" ok"),
            ]
        );
    }

    #[test]
    fn test_lone_angle_bracket_is_literal() {
        let cues = parse("00:01.000 --> 00:02.000\nI &lt;3 you\n");
        assert_eq!(cues.as_slice()[0].plain_text, "I <3 you");
    }

    #[test]
    fn test_escaped_tags_are_text() {
        let cues = parse("00:01.000 --> 00:02.000\nif a &lt;b&gt; c\n");
        assert_eq!(cues.as_slice()[0].plain_text, "if a <b> c");

        let cues = parse("00:01.000 --> 00:02.000\n<i>&lt;i&gt; stays</i> &amp;lt;\n");
        let cue = &cues.as_slice()[0];
        assert_eq!(
            cue.segments,
            vec![StyledSegment::italic("<i> stays"), StyledSegment::plain(" &lt;")]
        );
        assert_eq!(cue.plain_text, "<i> stays &lt;");
    }

    #[test]
    fn test_identifier_lines_dropped() {
        let doc = "WEBVTT\n\n1\n00:01.000 --> 00:02.000\nFirst\n2\n00:02.000 --> 00:03.000\nSecond\n\n42\n";
        let cues = parse(doc);
        let texts: Vec<_> = cues.iter().map(|c| c.plain_text.as_str()).collect();
        assert_eq!(texts, vec!["First", "Second"]);
    }

    #[test]
    fn test_multiline_cue_and_settings() {
        let doc = "intro\n01:00:00.000 --> 01:00:05.250 align:start position:10%\r\nline one\r\nline two\r\n\r\n";
        let cues = parse(doc);
        let cue = &cues.as_slice()[0];
        assert_eq!(cue.start_time, 3600.0);
        assert_eq!(cue.end_time, 3605.25);
        assert_eq!(cue.plain_text, "line one\nline two");
    }

    #[test]
    fn test_timestamp_forms() {
        assert_eq!(parse_timestamp("00:00:01.500"), 1.5);
        assert_eq!(parse_timestamp("01:02.5"), 62.5);
        assert_eq!(parse_timestamp("1:00:00.000"), 3600.0);
        assert_eq!(parse_timestamp("garbage"), 0.0);
        assert_eq!(parse_timestamp("00:xx.000"), 0.0);
        assert_eq!(parse_timestamp("00:01:inf"), 0.0);
        assert_eq!(parse_timestamp(""), 0.0);
    }

    #[test]
    fn test_malformed_block_does_not_abort() {
        let doc = "00:01.000 --> 00:02.000\nGood\n\nnonsense --> ??\nStill parsed\n\n00:05.000 --> 00:06.000\nAlso good\n";
        let cues = parse(doc);
        assert_eq!(cues.len(), 3);
        assert_eq!(cues.as_slice()[1].start_time, 0.0);
        assert_eq!(cues.as_slice()[1].end_time, 0.0);
        assert_eq!(cues.as_slice()[2].plain_text, "Also good");
    }

    #[test]
    fn test_empty_cues_dropped() {
        let doc = "00:01.000 --> 00:02.000\n\n00:02.000 --> 00:03.000\n<i> </i>\n\n00:03.000 --> 00:04.000\nkept\n";
        let cues = parse(doc);
        assert_eq!(cues.len(), 1);
        assert_eq!(cues.as_slice()[0].plain_text, "kept");
    }

    #[test]
    fn test_end_before_start_is_clamped() {
        let cues = parse("00:05.000 --> 00:04.000\nbackwards\n");
        let cue = &cues.as_slice()[0];
        assert!(cue.start_time <= cue.end_time);
        assert_eq!(cue.duration(), 0.0);
    }

    #[test]
    fn test_segments_concatenate_to_plain_text() {
        let doc = "00:01.000 --> 00:02.000\n<b>a</b><i>b<u>c</u></i>d &amp; <i>e\n\n\
                   00:02.000 --> 00:03.000\n<i></i>x</i><i>y\n";
        for cue in &parse(doc) {
            let joined: String = cue.segments.iter().map(|s| s.text.as_str()).collect();
            assert_eq!(joined, cue.plain_text);
            assert!(cue.start_time <= cue.end_time);
        }
    }

    #[test]
    fn test_parse_is_idempotent() {
        assert_eq!(parse(SCENARIO_A), parse(SCENARIO_A));
    }

    #[test]
    fn test_growing_document_keeps_earlier_cues() {
        let partial = "WEBVTT\n\n00:01.000 --> 00:03.000\nHello\n\n00:03.500 --> 00:0";
        let before = parse(partial);
        let after = parse(SCENARIO_A);
        assert_eq!(before.as_slice()[0], after.as_slice()[0]);
        assert!(after.len() >= before.len());
    }

    #[test]
    fn test_header_only_document() {
        assert!(parse("WEBVTT\n\nNOTE nothing yet\n").is_empty());
        assert!(parse("").is_empty());
    }

    #[test]
    fn test_bom_is_ignored() {
        let cues = parse("\u{feff}WEBVTT\n\n00:01.000 --> 00:02.000\nHi\n");
        assert_eq!(cues.len(), 1);
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("<c.yellow>hi</c> <i>there</i>"), "hi there");
    }
}
