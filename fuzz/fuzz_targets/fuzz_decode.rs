#![no_main]
use std::{cell::RefCell, collections::BTreeMap, io};

use arbitrary::Arbitrary;
use jsonslot::{ByteSource, Decoder, DecoderOptions, Filled, SliceSource};
use libfuzzer_sys::{fuzz_mutator, fuzz_target, fuzzer_mutate};
use rand::{Rng, RngCore, SeedableRng, rngs::StdRng};
use serde_json::{Map, Value};

const HEADER: usize = 5; // 1 flag + 4-byte seed

jsonslot::record! {
    #[derive(Debug, Default, PartialEq)]
    struct Inner {
        name: String,
        score: Option<i32>,
    }
}

jsonslot::record! {
    #[derive(Debug, Default, PartialEq)]
    struct Target {
        text: String,
        count: i64,
        small: u8,
        ratio: f64 as "aspectRatio",
        flag: bool,
        tags: Vec<String>,
        values: Vec<f64>,
        labels: BTreeMap<String, i32>,
        inner: Inner,
        children: Vec<Inner>,
        maybe: Option<String>,
    }
}

// `name` and `score` only exist on `Inner`, so at the top level they are
// unknown.
static NAMES: &[&str] = &[
    "text",
    "count",
    "small",
    "aspectRatio",
    "flag",
    "tags",
    "values",
    "labels",
    "inner",
    "children",
    "maybe",
    "name",
    "score",
];

thread_local! {
    static RNG: RefCell<StdRng> = RefCell::new(StdRng::from_os_rng());
}

fn with_rng<F, R>(f: F) -> R
where
    F: FnOnce(&mut StdRng) -> R,
{
    RNG.with(|cell| f(&mut cell.borrow_mut()))
}

fn mutator(data: &mut [u8], size: usize, max_size: usize, seed: u32) -> usize {
    if max_size <= HEADER {
        return fuzzer_mutate(data, size, max_size);
    }
    if size < HEADER || seed % 10 == 0 {
        data[0] = with_rng(|rng| rng.next_u32() as u8);
        data[1..HEADER].copy_from_slice(&with_rng(|rng| rng.next_u32().to_le_bytes()));
        HEADER + append_document(&mut data[HEADER..], max_size - HEADER)
    } else {
        fuzzer_mutate(data, size, max_size)
    }
}

/// Write a document built from known field names into `buf`, cut short at
/// `limit` bytes.
fn append_document(buf: &mut [u8], limit: usize) -> usize {
    let document = with_rng(|rng| {
        let entries = rng.random_range(0..=NAMES.len());
        let mut object = Map::new();
        for _ in 0..entries {
            let name = NAMES[rng.random_range(0..NAMES.len())];
            let value = if rng.random_ratio(1, 8) {
                arbitrary_value(rng)
            } else {
                typed(name, rng)
            };
            object.insert(name.to_owned(), value);
        }
        Value::Object(object)
    });

    let serialized = serde_json::to_vec(&document).expect("Failed to serialize document");
    let len = serialized.len().min(limit).min(buf.len());
    buf[..len].copy_from_slice(&serialized[..len]);
    len
}

fn text(rng: &mut StdRng) -> String {
    const ALPHABET: &[char] = &['a', 'Z', ' ', '"', '\\', '\n', 'é', '😀', '\u{1}'];
    let len = rng.random_range(0..24);
    (0..len)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())])
        .collect()
}

fn inner(rng: &mut StdRng) -> Value {
    let mut object = Map::new();
    object.insert("name".into(), Value::String(text(rng)));
    if rng.random_bool(0.5) {
        object.insert("score".into(), Value::from(rng.random::<i32>()));
    } else {
        object.insert("score".into(), Value::Null);
    }
    Value::Object(object)
}

fn typed(name: &str, rng: &mut StdRng) -> Value {
    let len = rng.random_range(0..6);
    match name {
        "text" | "name" | "maybe" => Value::String(text(rng)),
        "count" | "score" | "small" => Value::from(rng.random::<i64>() >> rng.random_range(0..64)),
        "aspectRatio" => Value::from(rng.random::<f64>() * 10f64.powi(rng.random_range(-20..20))),
        "flag" => Value::Bool(rng.random()),
        "tags" => Value::Array((0..len).map(|_| Value::String(text(rng))).collect()),
        "values" => Value::Array((0..len).map(|_| Value::from(rng.random::<f64>())).collect()),
        "labels" => Value::Object(
            (0..len)
                .map(|_| (text(rng), Value::from(rng.random::<i32>())))
                .collect(),
        ),
        "inner" => inner(rng),
        "children" => Value::Array((0..len).map(|_| inner(rng)).collect()),
        _ => Value::Null,
    }
}

fn arbitrary_value(rng: &mut StdRng) -> Value {
    loop {
        let len = rng.random_range(1..256);
        let bytes: Vec<u8> = (0..len).map(|_| rng.random::<u8>()).collect();
        if let Ok(value) = ArbitraryValue::arbitrary(&mut arbitrary::Unstructured::new(&bytes)) {
            return value.0;
        }
    }
}

fuzz_mutator!(|data: &mut [u8], size: usize, max_size: usize, seed: u32| {
    mutator(data, size, max_size, seed)
});

#[derive(Debug)]
struct ArbitraryValue(Value);

impl<'a> Arbitrary<'a> for ArbitraryValue {
    fn arbitrary(u: &mut arbitrary::Unstructured<'_>) -> arbitrary::Result<Self> {
        let value = match u.choose_index(16)? {
            0 => Value::Null,
            1 => Value::Bool(u.arbitrary()?),
            2 => {
                let n: f64 = u.arbitrary()?;
                Value::Number(
                    serde_json::Number::from_f64(n).ok_or(arbitrary::Error::IncorrectFormat)?,
                )
            }
            3 => Value::from(u.arbitrary::<i64>()?),
            4..=8 => Value::String(u.arbitrary()?),
            9..=12 => {
                let elems: Vec<ArbitraryValue> = u.arbitrary()?;
                Value::Array(elems.into_iter().map(|v| v.0).collect())
            }
            13..=15 => {
                let m: Vec<(String, ArbitraryValue)> = u.arbitrary()?;
                Value::Object(Map::from_iter(m.into_iter().map(|(k, v)| (k, v.0))))
            }
            _ => Err(arbitrary::Error::IncorrectFormat)?,
        };
        Ok(ArbitraryValue(value))
    }
}

/// Hands out the document in randomly sized reads.
struct Splits<'a> {
    data: &'a [u8],
    rng: StdRng,
}

impl ByteSource for Splits<'_> {
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<Filled> {
        if self.data.is_empty() || buf.is_empty() {
            return Ok(Filled {
                len: 0,
                end_of_input: self.data.is_empty(),
            });
        }
        let len = self.rng.random_range(1..=self.data.len().min(buf.len()));
        buf[..len].copy_from_slice(&self.data[..len]);
        self.data = &self.data[len..];
        Ok(Filled {
            len,
            end_of_input: self.data.is_empty(),
        })
    }
}

fn decode(data: &[u8]) {
    if data.len() < HEADER {
        return;
    }

    let flags = data[0];
    let split_seed = u64::from(u32::from_le_bytes([data[1], data[2], data[3], data[4]]));
    let document = &data[HEADER..];

    let options = DecoderOptions {
        read_buffer_size: 1 + usize::from(flags & 0x0F) * 17,
        capture_buffer_size: 1 + usize::from((flags >> 4) & 0x03) * 8,
        capture_buffer_limit: 64,
        max_depth: if flags & 0x40 != 0 { 2 } else { 32 },
        allow_trailing_characters: flags & 0x80 != 0,
    };

    let mut whole = Target::default();
    let expected = Decoder::new(options).decode(&mut SliceSource::new(document), &mut whole);

    let mut chunked = Target::default();
    let mut source = Splits {
        data: document,
        rng: StdRng::seed_from_u64(split_seed),
    };
    let actual = Decoder::new(options).decode(&mut source, &mut chunked);

    match (&expected, &actual) {
        (Ok(()), Ok(())) => {}
        (Err(a), Err(b)) => assert_eq!(a.to_string(), b.to_string()),
        _ => panic!("chunking changed the outcome: {expected:?} vs {actual:?}"),
    }
    assert_eq!(whole, chunked);
}

fuzz_target!(|data: &[u8]| decode(data));
