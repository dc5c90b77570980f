//! `_changes` feed iterator

use std::fmt;
use std::io::{BufReader, Read};

use serde::Deserialize;
use serde_json::de::IoRead;
use serde_json::value::RawValue;
use serde_json::{StreamDeserializer, Value};
use tracing::{debug, warn};

use super::event::{rev_list, ChangeEvent, Sequence};
use super::scanner::Scanner;
use super::Feed;
use crate::couch::{Error, Options, Result};

/// Leading tokens of a poll-style response
const POLL_PREFIX: [&str; 4] = ["{", "\"results\"", ":", "["];

/// Tokens between the end of the results array and the last sequence
const POLL_SUFFIX: [&str; 3] = [",", "\"last_seq\"", ":"];

/// How the server delivers changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedMode {
    /// Everything up to now, then the response ends
    #[default]
    Normal,
    /// Like `Normal`, but waits for at least one change
    LongPoll,
    /// Never-ending stream of one object per line
    Continuous,
}

impl FeedMode {
    /// Pick the mode from the `feed` option. Unset means `Normal`.
    pub fn from_options(options: &Options) -> Result<Self> {
        match options.get("feed") {
            None => Ok(FeedMode::Normal),
            Some(Value::String(s)) if s == "normal" => Ok(FeedMode::Normal),
            Some(Value::String(s)) if s == "longpoll" => Ok(FeedMode::LongPoll),
            Some(Value::String(s)) if s == "continuous" => Ok(FeedMode::Continuous),
            Some(other) => Err(Error::Configuration(format!(
                "unsupported value for option \"feed\": {}",
                other
            ))),
        }
    }

    /// Whether responses are a single `{"results":[...]}` document
    pub fn is_poll(&self) -> bool {
        !matches!(self, FeedMode::Continuous)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedMode::Normal => "normal",
            FeedMode::LongPoll => "longpoll",
            FeedMode::Continuous => "continuous",
        }
    }
}

impl fmt::Display for FeedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one parser step
enum Step {
    Event(ChangeEvent),
    End(Option<Sequence>),
}

trait FeedParser {
    fn step(&mut self) -> Result<Step>;
}

/// Walks `{"results":[...],"last_seq":...}` one element at a time
struct PollParser<R: Read> {
    scanner: Scanner<R>,
    first: bool,
}

impl<R: Read> PollParser<R> {
    fn open(reader: R) -> Result<Self> {
        let mut scanner = Scanner::new(reader);
        scanner.match_tokens(&POLL_PREFIX)?;
        Ok(Self {
            scanner,
            first: true,
        })
    }
}

impl<R: Read> FeedParser for PollParser<R> {
    fn step(&mut self) -> Result<Step> {
        match self.scanner.peek()? {
            b']' => {
                self.scanner.skip_byte()?;
                self.scanner.match_tokens(&POLL_SUFFIX)?;
                let last_seq = self.scanner.read_sequence()?;
                return Ok(Step::End(Some(last_seq)));
            }
            b',' if !self.first => self.scanner.skip_byte()?,
            _ => {}
        }
        self.first = false;
        let event = self.scanner.decode_object()?;
        Ok(Step::Event(event))
    }
}

/// One line of a continuous feed: either a change or the final marker
#[derive(Deserialize)]
struct ContinuousRow {
    #[serde(default)]
    id: String,
    #[serde(default)]
    seq: Option<Sequence>,
    #[serde(default, deserialize_with = "rev_list::deserialize")]
    changes: Vec<String>,
    #[serde(default)]
    doc: Option<Box<RawValue>>,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    last_seq: Option<Value>,
}

impl ContinuousRow {
    fn is_final(&self) -> bool {
        !matches!(self.last_seq, None | Some(Value::Null) | Some(Value::Bool(false)))
    }
}

/// Decodes one whitespace-delimited object per step
struct ContinuousParser<R: Read> {
    rows: StreamDeserializer<'static, IoRead<BufReader<R>>, ContinuousRow>,
}

impl<R: Read> ContinuousParser<R> {
    fn new(reader: R) -> Self {
        let rows = serde_json::Deserializer::from_reader(BufReader::new(reader)).into_iter();
        Self { rows }
    }
}

impl<R: Read> FeedParser for ContinuousParser<R> {
    fn step(&mut self) -> Result<Step> {
        let row = match self.rows.next() {
            Some(row) => row.map_err(Error::from_stream)?,
            None => return Err(Error::unexpected_eof("continuous feed closed by server")),
        };

        if row.is_final() {
            let last_seq = row.last_seq.as_ref().and_then(Sequence::from_value);
            return Ok(Step::End(last_seq));
        }

        Ok(Step::Event(ChangeEvent {
            id: row.id,
            deleted: row.deleted,
            seq: row.seq,
            revisions: row.changes,
            doc: row.doc,
        }))
    }
}

enum Parser<R: Read> {
    Poll(PollParser<R>),
    Continuous(ContinuousParser<R>),
}

impl<R: Read> FeedParser for Parser<R> {
    fn step(&mut self) -> Result<Step> {
        match self {
            Parser::Poll(p) => p.step(),
            Parser::Continuous(p) => p.step(),
        }
    }
}

/// Iterator over the `_changes` feed of a database.
///
/// Designed for a `while` loop:
///
/// ```ignore
/// let mut feed = db.changes(&Options::new())?;
/// while feed.advance() {
///     let event = feed.event().unwrap();
///     println!("changed: {}", event.id);
/// }
/// if let Some(err) = feed.err() { ... }
/// ```
pub struct ChangesFeed<R: Read> {
    /// `None` once the connection has been released
    parser: Option<Parser<R>>,
    mode: FeedMode,
    event: Option<ChangeEvent>,
    last_seq: Option<Sequence>,
    ended: bool,
    err: Option<Error>,
}

impl<R: Read> ChangesFeed<R> {
    /// Start reading a feed from an open response body.
    ///
    /// Poll-style feeds check the response prefix right away; a mismatch
    /// fails here and the reader is already released when the error is
    /// returned.
    pub fn from_reader(reader: R, mode: FeedMode) -> Result<Self> {
        let parser = if mode.is_poll() {
            Parser::Poll(PollParser::open(reader).inspect_err(|e| {
                warn!(error = %e, "malformed changes feed prefix");
            })?)
        } else {
            Parser::Continuous(ContinuousParser::new(reader))
        };
        debug!(%mode, "changes feed opened");

        Ok(Self {
            parser: Some(parser),
            mode,
            event: None,
            last_seq: None,
            ended: false,
            err: None,
        })
    }

    pub fn mode(&self) -> FeedMode {
        self.mode
    }

    /// Sequence sent by the server at the end of the feed
    pub fn last_seq(&self) -> Option<&Sequence> {
        self.last_seq.as_ref()
    }

    /// Whether the connection is still held
    pub fn is_open(&self) -> bool {
        self.parser.is_some()
    }
}

impl<R: Read> Feed for ChangesFeed<R> {
    type Event = ChangeEvent;

    fn advance(&mut self) -> bool {
        self.event = None;
        if self.ended {
            return false;
        }
        let Some(parser) = self.parser.as_mut() else {
            self.ended = true;
            return false;
        };

        match parser.step() {
            Ok(Step::Event(event)) => {
                self.err = None;
                self.event = Some(event);
                true
            }
            Ok(Step::End(last_seq)) => {
                self.err = None;
                if last_seq.is_some() {
                    self.last_seq = last_seq;
                }
                debug!(last_seq = ?self.last_seq, "changes feed ended");
                self.close();
                false
            }
            Err(err) => {
                warn!(error = %err, mode = %self.mode, "changes feed failed");
                self.err = Some(err);
                self.close();
                false
            }
        }
    }

    fn event(&self) -> Option<&ChangeEvent> {
        self.event.as_ref()
    }

    fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    fn take_err(&mut self) -> Option<Error> {
        self.err.take()
    }

    fn close(&mut self) {
        self.ended = true;
        if self.parser.take().is_some() {
            debug!("changes feed connection closed");
        }
    }

    fn is_ended(&self) -> bool {
        self.ended
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Reader that counts how often it is released
    struct TrackedReader {
        inner: Cursor<Vec<u8>>,
        closed: Arc<AtomicUsize>,
    }

    impl Read for TrackedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl Drop for TrackedReader {
        fn drop(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn tracked(input: &str) -> (TrackedReader, Arc<AtomicUsize>) {
        let closed = Arc::new(AtomicUsize::new(0));
        let reader = TrackedReader {
            inner: Cursor::new(input.as_bytes().to_vec()),
            closed: Arc::clone(&closed),
        };
        (reader, closed)
    }

    fn poll_feed(input: &str) -> ChangesFeed<Cursor<Vec<u8>>> {
        ChangesFeed::from_reader(Cursor::new(input.as_bytes().to_vec()), FeedMode::Normal)
            .unwrap()
    }

    fn continuous_feed(input: &str) -> ChangesFeed<Cursor<Vec<u8>>> {
        ChangesFeed::from_reader(Cursor::new(input.as_bytes().to_vec()), FeedMode::Continuous)
            .unwrap()
    }

    fn collect_ids<R: Read>(feed: &mut ChangesFeed<R>) -> Vec<String> {
        let mut ids = Vec::new();
        while feed.advance() {
            ids.push(feed.event().unwrap().id.clone());
        }
        ids
    }

    #[test]
    fn test_feed_mode_from_options() {
        assert_eq!(FeedMode::from_options(&Options::new()).unwrap(), FeedMode::Normal);
        assert_eq!(
            FeedMode::from_options(&Options::new().with("feed", "longpoll")).unwrap(),
            FeedMode::LongPoll
        );
        assert_eq!(
            FeedMode::from_options(&Options::new().with("feed", "continuous")).unwrap(),
            FeedMode::Continuous
        );
        assert!(matches!(
            FeedMode::from_options(&Options::new().with("feed", "eventsource")),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            FeedMode::from_options(&Options::new().with("feed", 1)),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_poll_single_event() {
        let mut feed = poll_feed(
            r#"{"results":[{"id":"doc1","changes":[{"rev":"1-a"}]}],"last_seq":5}"#,
        );

        assert!(feed.advance());
        let event = feed.event().unwrap();
        assert_eq!(event.id, "doc1");
        assert_eq!(event.revisions, vec!["1-a"]);
        assert!(!event.deleted);

        assert!(!feed.advance());
        assert!(feed.err().is_none());
        assert!(feed.event().is_none());
        assert_eq!(feed.last_seq(), Some(&Sequence::Number(5)));
        assert!(feed.is_ended());
        assert!(!feed.is_open());
    }

    #[test]
    fn test_poll_row_without_id() {
        let mut feed = poll_feed(r#"{"results":[{"seq":7,"changes":[]}],"last_seq":7}"#);

        assert!(feed.advance());
        let event = feed.event().unwrap();
        assert_eq!(event.id, "");
        assert_eq!(event.seq, Some(Sequence::Number(7)));

        assert!(!feed.advance());
        assert!(feed.err().is_none());
    }

    #[test]
    fn test_poll_many_events() {
        let input = r#"{"results":[
{"seq":1,"id":"a","changes":[{"rev":"1-a"}]},
{"seq":2,"id":"b","changes":[{"rev":"1-b"}],"deleted":true},
{"seq":3,"id":"c","changes":[{"rev":"3-c"},{"rev":"3-d"}]}
],
"last_seq":3}
"#;
        let mut feed = poll_feed(input);

        assert!(feed.advance());
        assert_eq!(feed.event().unwrap().id, "a");
        assert!(!feed.event().unwrap().deleted);

        assert!(feed.advance());
        assert_eq!(feed.event().unwrap().id, "b");
        assert!(feed.event().unwrap().deleted);

        assert!(feed.advance());
        let event = feed.event().unwrap();
        assert_eq!(event.id, "c");
        // deleted does not leak from the previous event
        assert!(!event.deleted);
        assert_eq!(event.seq, Some(Sequence::Number(3)));
        assert_eq!(event.revisions, vec!["3-c", "3-d"]);

        assert!(!feed.advance());
        assert!(feed.err().is_none());
        assert_eq!(feed.last_seq(), Some(&Sequence::Number(3)));
    }

    #[test]
    fn test_poll_empty_results() {
        let mut feed = poll_feed(r#"{"results":[],"last_seq":0}"#);
        assert!(!feed.advance());
        assert!(feed.err().is_none());
        assert_eq!(feed.last_seq(), Some(&Sequence::Number(0)));
    }

    #[test]
    fn test_poll_string_last_seq() {
        let mut feed = poll_feed(
            r#"{"results":[{"seq":"1-g1AA","id":"a","changes":[]}],"last_seq":"1-g1AA","pending":0}"#,
        );
        assert_eq!(collect_ids(&mut feed), vec!["a"]);
        assert!(feed.err().is_none());
        assert_eq!(feed.last_seq(), Some(&Sequence::Opaque("1-g1AA".to_string())));
    }

    #[test]
    fn test_poll_braces_and_quotes_in_strings() {
        let input = r#"{"results":[{"id":"a","note":"{nested}","changes":[]},{"id":"b","note":"a\"b}","changes":[]}],"last_seq":2}"#;
        let mut feed = poll_feed(input);
        assert_eq!(collect_ids(&mut feed), vec!["a", "b"]);
        assert!(feed.err().is_none());
    }

    #[test]
    fn test_poll_include_docs() {
        let input = r#"{"results":[{"id":"v1","changes":[{"rev":"1-x"}],"doc":{"_id":"v1","name":"Bob","tags":{"a":"}"}}}],"last_seq":1}"#;
        let mut feed = poll_feed(input);
        assert!(feed.advance());
        let doc: Value = feed.event().unwrap().doc_as().unwrap().unwrap();
        assert_eq!(doc["name"], "Bob");
        assert_eq!(doc["tags"]["a"], "}");
    }

    #[test]
    fn test_poll_malformed_prefix_closes_connection() {
        let (reader, closed) = tracked(r#"[{"id":"a"}]"#);
        let result = ChangesFeed::from_reader(reader, FeedMode::Normal);
        assert!(matches!(result, Err(Error::Protocol { .. })));
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_poll_malformed_suffix() {
        let mut feed = poll_feed(r#"{"results":[{"id":"a","changes":[]}],"pending":0}"#);
        assert!(feed.advance());
        assert!(!feed.advance());
        assert!(matches!(feed.err(), Some(Error::Protocol { .. })));
        assert!(feed.last_seq().is_none());
    }

    #[test]
    fn test_poll_decode_error_mid_object() {
        let (reader, closed) =
            tracked(r#"{"results":[{"id":"a","changes":[]},{"id":"b" "changes":[]}],"last_seq":2}"#);
        let mut feed = ChangesFeed::from_reader(reader, FeedMode::Normal).unwrap();

        assert!(feed.advance());
        assert!(!feed.advance());
        assert!(matches!(feed.err(), Some(Error::Decode(_))));
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        // Ended feeds stay ended, and the error is kept
        assert!(!feed.advance());
        assert!(feed.err().is_some());
    }

    #[test]
    fn test_poll_premature_end() {
        let mut feed = poll_feed(r#"{"results":[{"id":"a","changes":[]},"#);
        assert!(feed.advance());
        assert!(!feed.advance());
        match feed.err() {
            Some(Error::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("Expected Io error, got {:?}", other),
        }
    }

    #[test]
    fn test_poll_unexpected_element() {
        let mut feed = poll_feed(r#"{"results":["nope"],"last_seq":1}"#);
        assert!(!feed.advance());
        assert!(matches!(feed.err(), Some(Error::Protocol { .. })));
    }

    #[test]
    fn test_close_is_idempotent() {
        let (reader, closed) = tracked(r#"{"results":[{"id":"a","changes":[]}],"last_seq":1}"#);
        let mut feed = ChangesFeed::from_reader(reader, FeedMode::Normal).unwrap();

        feed.close();
        feed.close();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(!feed.advance());
        assert!(feed.err().is_none());

        drop(feed);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_connection_released_once_at_end() {
        let (reader, closed) = tracked(r#"{"results":[],"last_seq":1}"#);
        let mut feed = ChangesFeed::from_reader(reader, FeedMode::Normal).unwrap();
        assert!(!feed.advance());
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        feed.close();
        drop(feed);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_continuous_single_event_then_marker() {
        let mut feed = continuous_feed(
            "{\"id\":\"x\",\"seq\":1,\"changes\":[]}\n{\"last_seq\":1}\n",
        );

        assert!(feed.advance());
        let event = feed.event().unwrap();
        assert_eq!(event.id, "x");
        assert_eq!(event.seq, Some(Sequence::Number(1)));

        assert!(!feed.advance());
        assert!(feed.is_ended());
        assert!(feed.err().is_none());
        assert_eq!(feed.last_seq(), Some(&Sequence::Number(1)));
        assert!(!feed.advance());
    }

    #[test]
    fn test_continuous_heartbeats_and_docs() {
        let input = concat!(
            "\n\n",
            r#"{"seq":"1-a","id":"v1","changes":[{"rev":"1-x"}],"doc":{"name":"Bob"}}"#,
            "\n\n\n",
            r#"{"seq":"2-a","id":"v1","changes":[{"rev":"2-y"}],"deleted":true}"#,
            "\n",
            r#"{"last_seq":"2-a","pending":0}"#,
            "\n"
        );
        let mut feed = continuous_feed(input);

        assert!(feed.advance());
        let event = feed.event().unwrap();
        assert_eq!(event.revisions, vec!["1-x"]);
        assert!(event.doc.is_some());

        assert!(feed.advance());
        let event = feed.event().unwrap();
        assert!(event.deleted);
        assert!(event.doc.is_none());

        assert!(!feed.advance());
        assert!(feed.err().is_none());
        assert_eq!(feed.last_seq(), Some(&Sequence::from("2-a")));
    }

    #[test]
    fn test_continuous_boolean_marker() {
        let mut feed = continuous_feed("{\"id\":\"a\",\"changes\":[]}\n{\"last_seq\":true}\n");
        assert!(feed.advance());
        assert!(!feed.advance());
        assert!(feed.err().is_none());
        assert!(feed.last_seq().is_none());
    }

    #[test]
    fn test_continuous_end_of_stream_is_an_error() {
        let (reader, closed) = tracked("{\"id\":\"a\",\"seq\":1,\"changes\":[]}\n");
        let mut feed = ChangesFeed::from_reader(reader, FeedMode::Continuous).unwrap();

        assert!(feed.advance());
        assert!(!feed.advance());
        match feed.err() {
            Some(Error::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("Expected Io error, got {:?}", other),
        }
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_continuous_closed_by_caller() {
        let mut feed = continuous_feed("{\"id\":\"a\",\"changes\":[]}\n");
        assert!(feed.advance());
        feed.close();
        assert!(!feed.advance());
        assert!(feed.err().is_none());
    }

    #[test]
    fn test_continuous_decode_error() {
        let mut feed = continuous_feed("{\"id\":\"a\",\"changes\":[]}\n{\"id\":}\n");
        assert!(feed.advance());
        assert!(!feed.advance());
        assert!(matches!(feed.err(), Some(Error::Decode(_))));
    }

    #[test]
    fn test_for_each_event() {
        let mut feed = poll_feed(
            r#"{"results":[{"id":"a","changes":[]},{"id":"b","changes":[]}],"last_seq":2}"#,
        );
        let mut ids = Vec::new();
        feed.for_each_event(|event| ids.push(event.id.clone())).unwrap();
        assert_eq!(ids, vec!["a", "b"]);

        let mut feed = continuous_feed("{\"id\":\"a\",\"changes\":[]}\n");
        let result = feed.for_each_event(|_| {});
        assert!(matches!(result, Err(Error::Io(_))));
        // The error was moved out
        assert!(feed.err().is_none());
    }
}
