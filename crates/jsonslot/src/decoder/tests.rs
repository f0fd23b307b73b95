use std::{
    collections::{BTreeMap, HashMap},
    io,
    sync::{Arc, Mutex, PoisonError},
};

use rstest::rstest;

use super::Decoder;
use crate::{
    error::{DecodeError, ErrorKind, Found},
    options::DecoderOptions,
    schema::{ElementKind, Kind, Record},
    source::{ByteSource, Filled, SliceSource},
};

/// Hands out at most `size` bytes per read.
struct Chunked<'a> {
    data: &'a [u8],
    size: usize,
}

impl ByteSource for Chunked<'_> {
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<Filled> {
        let len = self.size.min(buf.len()).min(self.data.len());
        buf[..len].copy_from_slice(&self.data[..len]);
        self.data = &self.data[len..];
        Ok(Filled {
            len,
            end_of_input: self.data.is_empty(),
        })
    }
}

struct Failing;

impl io::Read for Failing {
    fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::other("disk on fire"))
    }
}

crate::record! {
    #[derive(Debug, Default, PartialEq, Clone)]
    struct Credits {
        title: String,
        director: String,
    }
}

crate::record! {
    #[derive(Debug, Default, PartialEq, Clone)]
    struct Figures {
        year: i32,
        rating: f64,
        budget: u64,
        small: i8,
        ratio: f32,
        flag: bool,
    }
}

crate::record! {
    #[derive(Debug, Default, PartialEq, Clone)]
    struct Cast {
        starring: Vec<String>,
        scores: Vec<i64>,
        weights: Vec<f64>,
        flags: Vec<bool>,
    }
}

crate::record! {
    #[derive(Debug, Default, PartialEq, Clone)]
    struct Person {
        name: String,
        age: u8,
    }
}

crate::record! {
    #[derive(Debug, Default, PartialEq, Clone)]
    struct Studio {
        name: String,
        owner: Person,
        staff: Vec<Person>,
        by_role: BTreeMap<String, Person> as "byRole",
        counts: HashMap<String, u32>,
        note: Option<String>,
        partner: Option<Person>,
    }
}

const STUDIO: &str = r#"{
    "name": "Cruise/Wagner",
    "owner": {"name": "Paula", "age": 61},
    "staff": [{"name": "Tom", "age": 41}, {"age": 52, "name": "Ken"}],
    "byRole": {"lead": {"name": "Tom"}, "villain": {"name": "Ken", "age": 44}},
    "counts": {"films": 3, "awards": 0},
    "note": "first \"draft\"",
    "partner": {"name": "Edward"}
}"#;

fn decode_with<R: Record + Default>(
    options: DecoderOptions,
    input: &str,
) -> Result<R, DecodeError> {
    let mut dest = R::default();
    Decoder::new(options).decode(&mut SliceSource::new(input.as_bytes()), &mut dest)?;
    Ok(dest)
}

fn decode<R: Record + Default>(input: &str) -> Result<R, DecodeError> {
    decode_with(DecoderOptions::default(), input)
}

fn decode_chunked<R: Record + Default>(input: &str, size: usize) -> Result<R, DecodeError> {
    let mut dest = R::default();
    let mut source = Chunked {
        data: input.as_bytes(),
        size,
    };
    Decoder::default().decode(&mut source, &mut dest)?;
    Ok(dest)
}

fn expected_studio() -> Studio {
    Studio {
        name: "Cruise/Wagner".into(),
        owner: Person {
            name: "Paula".into(),
            age: 61,
        },
        staff: vec![
            Person {
                name: "Tom".into(),
                age: 41,
            },
            Person {
                name: "Ken".into(),
                age: 52,
            },
        ],
        by_role: BTreeMap::from([
            (
                "lead".to_owned(),
                Person {
                    name: "Tom".into(),
                    age: 0,
                },
            ),
            (
                "villain".to_owned(),
                Person {
                    name: "Ken".into(),
                    age: 44,
                },
            ),
        ]),
        counts: HashMap::from([("films".to_owned(), 3), ("awards".to_owned(), 0)]),
        note: Some("first \"draft\"".into()),
        partner: Some(Person {
            name: "Edward".into(),
            age: 0,
        }),
    }
}

#[test]
fn flat_strings() {
    let credits: Credits =
        decode(r#"{"title":"The Last Samurai","director":"Edward Zwick"}"#).unwrap();
    assert_eq!(credits.title, "The Last Samurai");
    assert_eq!(credits.director, "Edward Zwick");
}

#[test]
fn integer_and_float() {
    let figures: Figures = decode(r#"{"year":2003,"rating":7.7}"#).unwrap();
    assert_eq!(figures.year, 2003);
    assert_eq!(figures.rating, 7.7);
}

#[test]
fn string_list_in_order() {
    let cast: Cast = decode(r#"{"starring":["Tom Cruise","Ken Watanabe"]}"#).unwrap();
    assert_eq!(cast.starring, ["Tom Cruise", "Ken Watanabe"]);
}

#[test]
fn nested_records_lists_and_maps() {
    let studio: Studio = decode(STUDIO).unwrap();
    assert_eq!(studio, expected_studio());
}

#[rstest]
fn chunk_size_does_not_change_the_result(#[values(1, 2, 3, 5, 7, 16, 64, 4096)] size: usize) {
    let studio: Studio = decode_chunked(STUDIO, size).unwrap();
    assert_eq!(studio, expected_studio());
}

#[rstest]
fn read_buffer_size_does_not_change_the_result(#[values(0, 1, 2, 9, 31)] size: usize) {
    let options = DecoderOptions {
        read_buffer_size: size,
        ..Default::default()
    };
    let studio: Studio = decode_with(options, STUDIO).unwrap();
    assert_eq!(studio, expected_studio());
}

#[test]
fn io_read_sources_work() {
    let mut studio = Studio::default();
    let mut reader = STUDIO.as_bytes();
    Decoder::default().decode(&mut reader, &mut studio).unwrap();
    assert_eq!(studio, expected_studio());
}

#[rstest]
#[case(r#""plain""#, "plain")]
#[case(r#""say \"hi\"""#, "say \"hi\"")]
#[case(r#""back\\slash""#, "back\\slash")]
#[case(r#""a\/b\tc\nd""#, "a/b\tc\nd")]
#[case(r#""caf\u00e9""#, "caf\u{e9}")]
#[case(r#""\ud83d\ude00!""#, "\u{1F600}!")]
#[case(r#""""#, "")]
#[case("\"ünïcödé\"", "ünïcödé")]
fn escapes_across_any_boundary(#[case] value: &str, #[case] expected: &str) {
    let input = format!(r#"{{"title":{value},"director":"x"}}"#);
    for size in 1..=input.len() {
        let credits: Credits = decode_chunked(&input, size).unwrap();
        assert_eq!(credits.title, expected, "chunk size {size}");
        assert_eq!(credits.director, "x");
    }
}

#[rstest]
#[case(r#"{"year":-17}"#, -17)]
#[case(r#"{"year":-0}"#, 0)]
#[case(r#"{"year":2147483647}"#, i32::MAX)]
#[case(r#"{"year":-2147483648}"#, i32::MIN)]
fn integers(#[case] input: &str, #[case] expected: i32) {
    assert_eq!(decode::<Figures>(input).unwrap().year, expected);
}

#[test]
fn negative_zero_and_long_fractions_keep_sign() {
    let figures: Figures = decode(r#"{"rating":-0,"ratio":-0.0}"#).unwrap();
    assert!(figures.rating == 0.0 && figures.rating.is_sign_negative());
    assert!(figures.ratio.is_sign_negative());

    let figures: Figures = decode(r#"{"rating":-454.62726300000000000001}"#).unwrap();
    assert!((figures.rating + 454.627_263).abs() < 1e-12);
}

#[test]
fn numbers_end_at_any_delimiter() {
    let cast: Cast = decode("{\"scores\":[1,-2 ,3\n],\"weights\":[1e2,2.5E-1\t]}").unwrap();
    assert_eq!(cast.scores, [1, -2, 3]);
    assert_eq!(cast.weights, [100.0, 0.25]);
}

#[test]
fn booleans_and_nulls() {
    let figures: Figures = decode(r#"{"flag":true,"year":null}"#).unwrap();
    assert!(figures.flag);
    assert_eq!(figures.year, 0);

    let mut studio = Studio {
        note: Some("old".into()),
        name: "kept".into(),
        ..Default::default()
    };
    let mut source = SliceSource::new(br#"{"note":null,"name":null,"partner":null}"#);
    Decoder::default().decode(&mut source, &mut studio).unwrap();
    assert_eq!(studio.note, None);
    assert_eq!(studio.name, "kept");
    assert_eq!(studio.partner, None);
}

#[test]
fn empty_array_leaves_list_and_non_empty_replaces() {
    let mut cast = Cast {
        starring: vec!["old".into()],
        flags: vec![true],
        ..Default::default()
    };
    let mut source = SliceSource::new(br#"{"starring":[],"flags":[false, false]}"#);
    Decoder::default().decode(&mut source, &mut cast).unwrap();
    assert_eq!(cast.starring, ["old"]);
    assert_eq!(cast.flags, [false, false]);
}

#[test]
fn unknown_field_keeps_earlier_fields() {
    let mut credits = Credits::default();
    let err = Decoder::default()
        .decode(
            &mut SliceSource::new(br#"{"title":"Heat","nope":1}"#),
            &mut credits,
        )
        .unwrap_err();
    insta::assert_snapshot!(err, @"field does not exist: nope at byte 21");
    assert!(matches!(err.kind(), ErrorKind::UnknownField(name) if name == "nope"));
    assert_eq!(credits.title, "Heat");
}

#[test]
fn unknown_field_offset_is_chunk_independent() {
    for size in 1..8 {
        let err = decode_chunked::<Credits>(r#"{"title":"Heat","nope":1}"#, size).unwrap_err();
        assert_eq!(err.offset(), 21);
    }
}

#[test]
fn depth_is_bounded() {
    let options = DecoderOptions {
        max_depth: 1,
        ..Default::default()
    };
    let err = decode_with::<Studio>(options, r#"{"owner":{"name":"x"}}"#).unwrap_err();
    insta::assert_snapshot!(err, @"nesting depth exceeds the limit of 1 at byte 9");
}

#[test]
fn type_mismatch() {
    let err = decode::<Figures>(r#"{"year":"x"}"#).unwrap_err();
    insta::assert_snapshot!(
        err,
        @"type mismatch for field `year`: expected integer, found string at byte 10"
    );

    let err = decode::<Figures>(r#"{"year":1.5}"#).unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::Mismatch {
            field: "year",
            expected: Kind::Integer,
            found: Found::Float
        }
    ));

    let err = decode::<Cast>(r#"{"starring":["a",null]}"#).unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::Mismatch {
            field: "starring",
            expected: Kind::List(ElementKind::String),
            found: Found::Null
        }
    ));
}

#[test]
fn out_of_range() {
    let err = decode::<Figures>(r#"{"small":300}"#).unwrap_err();
    insta::assert_snapshot!(err, @"number out of range for field `small` at byte 12");

    let err = decode::<Figures>(r#"{"budget":-1}"#).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::NumberOutOfRange("budget")));
}

#[test]
fn unsupported_shapes() {
    let err = decode::<Credits>(r#"{"title":["a"]}"#).unwrap_err();
    insta::assert_snapshot!(
        err,
        @"unsupported destination kind for field `title`: cannot hold array at byte 9"
    );

    let err = decode::<Cast>(r#"{"starring":[["a"]]}"#).unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::Unsupported {
            field: "starring",
            found: Found::Array
        }
    ));

    let err = decode::<Cast>(r#"{"starring":[{}]}"#).unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::Unsupported {
            found: Found::Object,
            ..
        }
    ));

    let err = decode::<Studio>(r#"{"counts":{"a":[1]}}"#).unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::Unsupported {
            field: "counts",
            found: Found::Array
        }
    ));
}

#[rstest]
#[case("")]
#[case("   ")]
#[case(r#"{"name":"He"#)]
#[case(r#"{"name":"Heat""#)]
#[case(r#"{"owner":{"name":"x"}"#)]
#[case(r#"{"name":"a\"#)]
fn truncated_input(#[case] input: &str) {
    let err = decode::<Studio>(input).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::UnexpectedEndOfInput));
    assert_eq!(err.offset(), input.len());
}

#[test]
fn truncated_error_display() {
    let err = decode::<Credits>(r#"{"title":"He"#).unwrap_err();
    insta::assert_snapshot!(err, @"unexpected end of input at byte 12");
}

#[test]
fn trailing_characters() {
    let err = decode::<Credits>("{} x").unwrap_err();
    insta::assert_snapshot!(err, @"trailing characters after the top-level object at byte 3");

    decode::<Credits>("{}\n\t ").unwrap();

    let options = DecoderOptions {
        allow_trailing_characters: true,
        ..Default::default()
    };
    let credits: Credits = decode_with(options, r#"{"title":"a"} {"title":"b"}"#).unwrap();
    assert_eq!(credits.title, "a");
}

#[rstest]
#[case("[]", '[')]
#[case(r#"{"year":1,1:2}"#, '1')]
#[case(r#"{"year":?}"#, '?')]
#[case(r#"{"year":-}"#, '}')]
fn unexpected_characters(#[case] input: &str, #[case] expected: char) {
    match decode::<Figures>(input).map_err(DecodeError::into_kind) {
        Err(ErrorKind::UnexpectedCharacter(c)) => assert_eq!(c, expected),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn invalid_escapes() {
    let err = decode::<Credits>(r#"{"title":"\q"}"#).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidEscape('q')));
    let err = decode::<Credits>(r#"{"title":"\ud800"}"#).unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::InvalidUnicodeEscapeSequence(0xD800)
    ));
    let err = decode::<Credits>(r#"{"title":"\u12x4"}"#).unwrap_err();
    insta::assert_snapshot!(err, @"invalid unicode escape sequence at character: 'x' at byte 14");
}

#[test]
fn invalid_utf8_value() {
    let mut credits = Credits::default();
    let err = Decoder::default()
        .decode(
            &mut SliceSource::new(b"{\"title\":\"\xff\"}"),
            &mut credits,
        )
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidUtf8));
}

#[test]
fn source_errors_propagate() {
    let err = Decoder::default()
        .decode(&mut Failing, &mut Credits::default())
        .unwrap_err();
    insta::assert_snapshot!(err, @"read failed: disk on fire at byte 0");
}

#[test]
fn long_strings_spill_past_the_capture_limit() {
    let options = DecoderOptions {
        capture_buffer_size: 4,
        capture_buffer_limit: 8,
        read_buffer_size: 3,
        ..Default::default()
    };
    let mut decoder = Decoder::new(options);
    let long = "x".repeat(100);
    let input = format!(r#"{{"title":"{long}","director":"short"}}"#);
    let mut credits = Credits::default();
    decoder
        .decode(&mut SliceSource::new(input.as_bytes()), &mut credits)
        .unwrap();
    assert_eq!(credits.title, long);
    assert_eq!(credits.director, "short");
    assert!(decoder.scanner.capture.capacity() <= 8);
}

#[test]
fn decoder_is_reusable_after_an_error() {
    let mut decoder = Decoder::default();
    let mut credits = Credits::default();
    decoder
        .decode(&mut SliceSource::new(br#"{"title":"a\"#), &mut credits)
        .unwrap_err();
    decoder
        .decode(&mut SliceSource::new(br#"{"title":"b"}"#), &mut credits)
        .unwrap();
    assert_eq!(credits.title, "b");

    let mut figures = Figures::default();
    decoder
        .decode(&mut SliceSource::new(br#"{"year":1999}"#), &mut figures)
        .unwrap();
    assert_eq!(figures.year, 1999);
    assert_eq!(decoder.scanner.stack.depth(), 0);
}

#[test]
fn rejected_scalar_leaves_option_unset() {
    let mut studio = Studio::default();
    let err = Decoder::default()
        .decode(&mut SliceSource::new(br#"{"note":1}"#), &mut studio)
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Mismatch { field: "note", .. }));
    assert_eq!(studio.note, None);

    studio.note = Some("kept".into());
    Decoder::default()
        .decode(&mut SliceSource::new(br#"{"note":true}"#), &mut studio)
        .unwrap_err();
    assert_eq!(studio.note.as_deref(), Some("kept"));
}

#[test]
fn rejected_container_leaves_option_unset() {
    let mut studio = Studio::default();
    let err = Decoder::default()
        .decode(&mut SliceSource::new(br#"{"partner":[1]}"#), &mut studio)
        .unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::Unsupported {
            field: "partner",
            found: Found::Array
        }
    ));
    assert_eq!(studio.partner, None);

    let err = Decoder::default()
        .decode(&mut SliceSource::new(br#"{"note":{}}"#), &mut studio)
        .unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::Unsupported {
            field: "note",
            found: Found::Object
        }
    ));
    assert_eq!(studio.note, None);
}

#[rstest]
#[case(r#"{"scores":["x"]}"#)]
#[case(r#"{"scores":[1,2,"x"]}"#)]
#[case(r#"{"scores":[1,2,null]}"#)]
#[case(r#"{"scores":[1,[2]]}"#)]
#[case(r#"{"scores":[1,2"#)]
fn rejected_array_keeps_previous_list(#[case] input: &str) {
    let mut cast = Cast {
        scores: vec![7, 8],
        ..Default::default()
    };
    Decoder::default()
        .decode(&mut SliceSource::new(input.as_bytes()), &mut cast)
        .unwrap_err();
    assert_eq!(cast.scores, [7, 8]);
}

#[test]
fn failed_record_element_keeps_previous_list() {
    let mut studio = Studio {
        staff: vec![Person {
            name: "Tom".into(),
            age: 41,
        }],
        ..Default::default()
    };
    let err = Decoder::default()
        .decode(
            &mut SliceSource::new(br#"{"staff":[{"name":"Ken"},{"nope":1}]}"#),
            &mut studio,
        )
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::UnknownField(name) if name == "nope"));
    assert_eq!(
        studio.staff,
        [Person {
            name: "Tom".into(),
            age: 41,
        }]
    );
}

#[test]
fn closed_arrays_survive_a_later_failure() {
    let mut cast = Cast {
        scores: vec![7, 8],
        ..Default::default()
    };
    Decoder::default()
        .decode(
            &mut SliceSource::new(br#"{"scores":[1,2],"starring":[3]}"#),
            &mut cast,
        )
        .unwrap_err();
    assert_eq!(cast.scores, [1, 2]);
}

/// Collects formatted log lines.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for Captured {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

crate::record! {
    #[derive(Debug, Default)]
    struct Logged {
        title: String,
    }
}

#[test]
fn logs_through_tracing() {
    let captured = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .with_writer(captured.clone())
        .finish();
    tracing::subscriber::with_default(subscriber, || {
        let mut logged = Logged::default();
        let mut decoder = Decoder::default();
        decoder
            .decode(&mut SliceSource::new(br#"{"title":"Heat"}"#), &mut logged)
            .unwrap();
        decoder
            .decode(&mut SliceSource::new(br#"{"nope":1}"#), &mut logged)
            .unwrap_err();
    });

    let text = captured.text();
    assert!(text.contains("published field map"), "{text}");
    assert!(text.contains("type_name=\"Logged\"") || text.contains("type_name=Logged"), "{text}");
    assert!(text.contains("read buffer refilled"), "{text}");
    assert!(text.contains("decode failed"), "{text}");
    assert!(text.contains("field does not exist: nope"), "{text}");
}
