//! Segment Files and Record Framing
//!
//! A segment is one append-only log file in the store's directory. This
//! module owns everything about the bytes inside and around a segment: the
//! record frame, the file naming scheme, and the parser that rebuilds index
//! entries from a segment during recovery.
//!
//! ## Record Format
//!
//! One record is the concatenation of five comma-delimited fields:
//!
//! ```text
//! <expire>,<keyLen>,<valueLen>,<key>,<value>,
//! ```
//!
//! The three integer fields are unpadded ASCII decimal, terminated by commas
//! because their widths vary. Key and value are raw bytes (possibly empty,
//! possibly containing commas, newlines, or NUL) and the parser skips past
//! them using the explicit lengths rather than scanning for a delimiter. A
//! segment is a plain concatenation of records: no file header, no
//! terminator, no checksums.
//!
//! ## File Naming
//!
//! `"<unixMillis>-<16 random ASCII letters>"`. The millisecond prefix makes
//! the directory's lexical sort match creation order, which is what recovery
//! relies on to replay segments oldest-first; the random suffix prevents
//! collisions within one millisecond.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rand::Rng;

use super::error::{StoreError, StoreResult};
use super::index::IndexEntry;

/// Length of the random portion of a segment file name.
const NAME_SUFFIX_LEN: usize = 16;

/// Alphabet for the random portion: ASCII letters only, so names stay
/// shell-safe and the lexical-sort property rests on the timestamp alone.
const NAME_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Generates a fresh segment file name for a segment created at `now_ms`.
pub(crate) fn segment_name(now_ms: i64) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..NAME_SUFFIX_LEN)
        .map(|_| NAME_ALPHABET[rng.random_range(0..NAME_ALPHABET.len())] as char)
        .collect();
    format!("{now_ms}-{suffix}")
}

/// Builds the frame header for one record: everything up to and including
/// the comma that separates the key from the value.
///
/// The full record is `header || value || ","`, and the value's first byte
/// lands exactly `header.len()` bytes past the record's start, which is the
/// offset arithmetic the index relies on.
pub(crate) fn record_header(expire_at: i64, key: &str, value_len: usize) -> Vec<u8> {
    let mut header = format!("{},{},{},", expire_at, key.len(), value_len).into_bytes();
    header.extend_from_slice(key.as_bytes());
    header.push(b',');
    header
}

/// Parses one segment and returns the (key → entry) pairs it contributes to
/// the index, with `now` deciding liveness.
///
/// Within the segment, later records for a key overwrite earlier ones, and a
/// record whose expiration is at or before `now` removes any earlier pair
/// for that key: an expired record on disk is a tombstone. The returned map
/// is merged over whatever older segments produced.
///
/// End-of-file while reading the leading expire field ends the segment
/// cleanly. End-of-file anywhere later in a record, or a malformed decimal
/// field, aborts recovery with [`StoreError::SegmentParse`]; corrupt tails
/// are never silently truncated.
pub(crate) fn parse_segment(path: &Path, now: i64) -> StoreResult<HashMap<String, IndexEntry>> {
    let file = File::open(path).map_err(|err| parse_error(path, format_args!("{err}")))?;
    let mut reader = BufReader::new(file);
    let mut entries = HashMap::new();
    let mut cur: u64 = 0;

    loop {
        let mut field = Vec::new();
        let n = reader
            .read_until(b',', &mut field)
            .map_err(|err| parse_error(path, format_args!("couldn't read expire: {err}")))?;
        cur += n as u64;
        if field.last() != Some(&b',') {
            // End of segment: no record starts here.
            break;
        }
        let expire_at: i64 = decimal_field(&field, path, "expire")?;

        let field = read_delimited(&mut reader, &mut cur, path, "key length")?;
        let key_len: usize = decimal_field(&field, path, "key length")?;
        let field = read_delimited(&mut reader, &mut cur, path, "value length")?;
        let value_len: u64 = decimal_field(&field, path, "value length")?;

        // Key plus its trailing separator.
        let mut key_bytes = vec![0u8; key_len + 1];
        reader
            .read_exact(&mut key_bytes)
            .map_err(|err| parse_error(path, format_args!("couldn't read key: {err}")))?;
        cur += key_len as u64 + 1;
        key_bytes.pop();
        let key = String::from_utf8(key_bytes)
            .map_err(|_| parse_error(path, format_args!("key is not valid UTF-8")))?;

        // The value's first byte lives at the cursor right after the key's
        // separator has been consumed.
        let value_offset = cur;

        let skipped = io::copy(
            &mut reader.by_ref().take(value_len + 1),
            &mut io::sink(),
        )
        .map_err(|err| parse_error(path, format_args!("couldn't skip value for {key:?}: {err}")))?;
        cur += skipped;
        if skipped != value_len + 1 {
            return Err(parse_error(
                path,
                format_args!("unexpected end of segment in value for {key:?}"),
            ));
        }

        if expire_at > now {
            entries.insert(
                key,
                IndexEntry {
                    segment_path: path.to_path_buf(),
                    expire_at,
                    value_offset,
                    value_len,
                },
            );
        } else {
            // Expired record: tombstone anything older for this key.
            entries.remove(&key);
        }
    }

    Ok(entries)
}

/// Reads one comma-terminated field where end-of-file is not acceptable.
fn read_delimited(
    reader: &mut BufReader<File>,
    cur: &mut u64,
    path: &Path,
    what: &str,
) -> StoreResult<Vec<u8>> {
    let mut field = Vec::new();
    let n = reader
        .read_until(b',', &mut field)
        .map_err(|err| parse_error(path, format_args!("couldn't read {what}: {err}")))?;
    *cur += n as u64;
    if field.last() != Some(&b',') {
        return Err(parse_error(
            path,
            format_args!("unexpected end of segment in {what}"),
        ));
    }
    Ok(field)
}

/// Parses a comma-terminated ASCII decimal field.
fn decimal_field<T: FromStr>(field: &[u8], path: &Path, what: &str) -> StoreResult<T> {
    std::str::from_utf8(&field[..field.len() - 1])
        .ok()
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| parse_error(path, format_args!("couldn't parse {what}")))
}

fn parse_error(path: &Path, reason: std::fmt::Arguments<'_>) -> StoreError {
    StoreError::SegmentParse {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Frames a full record the way the segment writer does.
    fn record(expire_at: i64, key: &str, value: &[u8]) -> Vec<u8> {
        let mut bytes = record_header(expire_at, key, value.len());
        bytes.extend_from_slice(value);
        bytes.push(b',');
        bytes
    }

    fn write_segment(bytes: &[u8]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(segment_name(1_000));
        let mut file = File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        (dir, path)
    }

    #[test]
    fn test_record_header_exact_bytes() {
        assert_eq!(record_header(9999, "key", 5), b"9999,3,5,key,".to_vec());
        assert_eq!(record_header(1, "", 0), b"1,0,0,,".to_vec());
        assert_eq!(
            record(1700000000000, "a", b"hello"),
            b"1700000000000,1,5,a,hello,".to_vec()
        );
    }

    #[test]
    fn test_segment_name_shape() {
        let name = segment_name(1_700_000_000_123);
        let (millis, suffix) = name.split_once('-').unwrap();
        assert_eq!(millis.parse::<i64>().unwrap(), 1_700_000_000_123);
        assert_eq!(suffix.len(), NAME_SUFFIX_LEN);
        assert!(suffix.bytes().all(|b| b.is_ascii_alphabetic()));
    }

    #[test]
    fn test_segment_names_sort_chronologically() {
        let earlier = segment_name(1_700_000_000_000);
        let later = segment_name(1_700_000_000_001);
        assert!(earlier < later);
    }

    #[test]
    fn test_parse_empty_segment() {
        let (_dir, path) = write_segment(b"");
        assert!(parse_segment(&path, 0).unwrap().is_empty());
    }

    #[test]
    fn test_parse_single_record_offsets() {
        let bytes = record(2_000, "name", b"hello");
        let (_dir, path) = write_segment(&bytes);

        let entries = parse_segment(&path, 1_000).unwrap();
        let entry = &entries["name"];
        assert_eq!(entry.expire_at, 2_000);
        assert_eq!(entry.value_len, 5);
        assert_eq!(entry.segment_path, path);

        // The recorded offset must point at the value's first byte.
        let contents = std::fs::read(&path).unwrap();
        let start = entry.value_offset as usize;
        assert_eq!(&contents[start..start + 5], b"hello");
    }

    #[test]
    fn test_parse_last_record_wins_within_segment() {
        let mut bytes = record(2_000, "k", b"old");
        bytes.extend(record(3_000, "k", b"new"));
        let (_dir, path) = write_segment(&bytes);

        let entries = parse_segment(&path, 1_000).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries["k"].expire_at, 3_000);
        assert_eq!(entries["k"].value_len, 3);
    }

    #[test]
    fn test_parse_expired_record_tombstones_earlier() {
        let mut bytes = record(2_000, "k", b"live");
        bytes.extend(record(500, "k", b"dead"));
        let (_dir, path) = write_segment(&bytes);

        let entries = parse_segment(&path, 1_000).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_parse_expiry_is_inclusive() {
        // expire_at == now is already expired.
        let bytes = record(1_000, "k", b"v");
        let (_dir, path) = write_segment(&bytes);
        assert!(parse_segment(&path, 1_000).unwrap().is_empty());
    }

    #[test]
    fn test_parse_binary_value_with_embedded_delimiters() {
        let value = b"a,b\n\0c,";
        let mut bytes = record(2_000, "bin", value);
        bytes.extend(record(2_000, "after", b"x"));
        let (_dir, path) = write_segment(&bytes);

        let entries = parse_segment(&path, 1_000).unwrap();
        assert_eq!(entries.len(), 2);

        let entry = &entries["bin"];
        let contents = std::fs::read(&path).unwrap();
        let start = entry.value_offset as usize;
        assert_eq!(&contents[start..start + value.len()], value);
    }

    #[test]
    fn test_parse_empty_key_and_empty_value() {
        let mut bytes = record(2_000, "", b"zz");
        bytes.extend(record(2_000, "a", b""));
        let (_dir, path) = write_segment(&bytes);

        let entries = parse_segment(&path, 1_000).unwrap();
        assert_eq!(entries[""].value_len, 2);
        assert_eq!(entries["a"].value_len, 0);
    }

    #[test]
    fn test_parse_truncated_value_is_an_error() {
        let full = record(2_000, "k", b"hello");
        let (_dir, path) = write_segment(&full[..full.len() - 3]);

        let err = parse_segment(&path, 1_000).unwrap_err();
        assert!(matches!(err, StoreError::SegmentParse { .. }));
    }

    #[test]
    fn test_parse_truncated_header_is_an_error() {
        // Ends after the expire field's comma: the key-length read hits EOF.
        let (_dir, path) = write_segment(b"2000,");
        let err = parse_segment(&path, 1_000).unwrap_err();
        assert!(matches!(err, StoreError::SegmentParse { .. }));
    }

    #[test]
    fn test_parse_garbage_length_field_is_an_error() {
        let (_dir, path) = write_segment(b"2000,xx,3,key,abc,");
        let err = parse_segment(&path, 1_000).unwrap_err();
        assert!(matches!(err, StoreError::SegmentParse { .. }));
    }

    #[test]
    fn test_parse_partial_expire_field_ends_cleanly() {
        // A tail that dies inside the leading expire field is treated as end
        // of segment; complete earlier records survive.
        let mut bytes = record(2_000, "k", b"v");
        bytes.extend(b"17000");
        let (_dir, path) = write_segment(&bytes);

        let entries = parse_segment(&path, 1_000).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key("k"));
    }
}
