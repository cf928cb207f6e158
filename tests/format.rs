mod common;

use std::collections::BTreeMap;
use std::fs;
use std::io::Cursor;

use lexivol::dict::codec::compression::{compress, decompress};
use lexivol::dict::format::content::{decode_payload, encode_payload, raw_payload};
use lexivol::dict::format::header::{self, PREAMBLE_LEN, SIGNATURE};
use lexivol::dict::text::{clamp_note_end, clamped_tags};
use lexivol::dict::types::models::AttrValue;
use lexivol::dict::utils::SharedFile;
use lexivol::dict::CodecChain;
use lexivol::{Codec, DictError, FormatVersion, OpenOptions, Tag, Volume};

fn raw_header(token: &[u8], digits: &[u8], json: &str) -> Vec<u8> {
    let mut out = SIGNATURE.to_vec();
    out.extend_from_slice(token);
    out.extend_from_slice(digits);
    out.extend_from_slice(json.as_bytes());
    out
}

fn with_len(token: &[u8], json: &str) -> Vec<u8> {
    let digits = format!("{:08}", json.len());
    raw_header(token, digits.as_bytes(), json)
}

fn tag(name: &str, start: usize, end: usize) -> Tag {
    Tag {
        name: name.to_string(),
        start,
        end,
        attributes: BTreeMap::new(),
    }
}

#[test]
fn test_header_parse() {
    let json = r#"{"title":"Demo","version":"2","timestamp":7,"article_offset":4096,"index_offset":200,"index_count":3,"compression":"lzo"}"#;
    let bytes = with_len(b"POS1", json);
    let parsed = header::parse(&mut Cursor::new(bytes)).unwrap();
    assert_eq!(parsed.format, FormatVersion::Positional);
    assert_eq!(parsed.metadata.title, "Demo");
    assert_eq!(parsed.metadata.file_count, 1);
    assert_eq!(parsed.metadata.file_no, 0);
    assert_eq!(parsed.metadata.codec_hint(), Some(Codec::Lzo));
    assert_eq!(parsed.len, PREAMBLE_LEN + json.len() as u64);
}

#[test]
fn test_header_rejections() {
    let good = r#"{"title":"Demo","version":"2","timestamp":7,"article_offset":4096}"#;
    let mut bad_signature = with_len(b"FIX1", good);
    bad_signature[0] = b'X';

    let cases: Vec<(&str, Vec<u8>)> = vec![
        ("signature", bad_signature),
        ("token", with_len(b"ZZZ9", good)),
        ("digits", raw_header(b"FIX1", b"0000012x", good)),
        ("truncated preamble", SIGNATURE[..5].to_vec()),
        ("truncated metadata", raw_header(b"FIX1", b"00099999", good)),
        (
            "missing field",
            with_len(b"FIX1", r#"{"title":"Demo","version":"2","timestamp":7}"#),
        ),
        (
            "non-numeric field",
            with_len(
                b"FIX1",
                r#"{"title":"Demo","version":"2","timestamp":"soon","article_offset":4096}"#,
            ),
        ),
        (
            "offset inside header",
            with_len(b"FIX1", r#"{"title":"Demo","version":"2","timestamp":7,"article_offset":3}"#),
        ),
    ];
    for (name, bytes) in cases {
        match header::parse(&mut Cursor::new(bytes)) {
            Err(DictError::Format(_)) => {}
            other => panic!("{}: expected a format error, got {:?}", name, other),
        }
    }
}

#[test]
fn test_open_rejects_bad_files() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _) = common::build(dir.path(), "demo.lxv", common::builder("Demo", FormatVersion::FixedRecord));

    let mut bytes = fs::read(&path).unwrap();
    bytes[3] ^= 0xFF;
    let broken = dir.path().join("broken.lxv");
    fs::write(&broken, &bytes).unwrap();
    assert!(matches!(
        Volume::open(&broken, OpenOptions::new()),
        Err(DictError::Format(_))
    ));

    let empty = dir.path().join("empty.lxv");
    fs::write(&empty, b"").unwrap();
    assert!(matches!(
        Volume::open(&empty, OpenOptions::new()),
        Err(DictError::Format(_))
    ));

    // A header without index fields parses but does not describe a volume.
    let json = format!(
        r#"{{"title":"Demo","version":"2","timestamp":7,"article_offset":{}}}"#,
        PREAMBLE_LEN + 200
    );
    let mut headless = with_len(b"FIX1", &json);
    headless.resize(PREAMBLE_LEN as usize + 400, 0);
    let no_index = dir.path().join("no_index.lxv");
    fs::write(&no_index, &headless).unwrap();
    assert!(matches!(
        Volume::open(&no_index, OpenOptions::new()),
        Err(DictError::Format(_))
    ));
}

/// A LNK1 file whose header declares an eager table, padded to `file_len` bytes.
fn eager_table_file(count: u64, depth: u64, offset: u64, file_len: usize) -> Vec<u8> {
    let json = format!(
        r#"{{"title":"Demo","version":"1","timestamp":7,"article_offset":3000,"index_offset":2000,"index_count":0,"short_index_offset":{},"short_index_count":{},"short_index_depth":{}}}"#,
        offset, count, depth
    );
    let mut bytes = with_len(b"LNK1", &json);
    bytes.resize(file_len, 0);
    bytes
}

#[test]
fn test_open_rejects_oversized_eager_table() {
    let dir = tempfile::tempdir().unwrap();
    let cases = [
        ("count overflows the index region", eager_table_file(1_000_000_000_000_000_000, 1, 1000, 1000)),
        ("depth overflows the entry size", eager_table_file(1, 1 << 62, 1000, 1000)),
        ("depth at the integer limit", eager_table_file(1, u64::MAX, 1000, 1000)),
        ("table inside the header", eager_table_file(1, 1, 4, 3000)),
        ("table overlaps the long index", eager_table_file(200, 1, 300, 3000)),
    ];
    for (name, bytes) in cases {
        let path = dir.path().join("eager.lxv");
        fs::write(&path, &bytes).unwrap();
        match Volume::open(&path, OpenOptions::new()) {
            Err(DictError::Format(_)) => {}
            other => panic!("{}: expected a format error, got {:?}", name, other.map(|v| v.len())),
        }
    }
}

#[test]
fn test_oversized_read_is_refused_before_allocating() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("small.bin");
    fs::write(&path, [0u8; 16]).unwrap();
    let file = SharedFile::open(&path).unwrap();
    assert!(matches!(
        file.read_vec_at(8, usize::MAX),
        Err(DictError::IllegalRead { limit: 16, .. })
    ));
    assert_eq!(file.read_vec_at(8, 8).unwrap(), vec![0u8; 8]);
}

#[test]
fn test_payload_decoding() {
    let plain = decode_payload(br#"["Some text", [["b", 0, 4], ["i", 5, 9, null]]]"#).unwrap();
    assert_eq!(plain.text, "Some text");
    assert_eq!(plain.tags, vec![tag("b", 0, 4), tag("i", 5, 9)]);
    assert_eq!(plain.redirect, None);

    let attrs = decode_payload(br#"["x", [["a", 0, 1, {"href": "y", "n": 3, "w": 0.5}]]]"#).unwrap();
    let attributes = &attrs.tags[0].attributes;
    assert_eq!(attributes.get("href"), Some(&AttrValue::Text("y".to_string())));
    assert_eq!(attributes.get("n"), Some(&AttrValue::Int(3)));
    assert_eq!(attributes.get("w"), Some(&AttrValue::Float(0.5)));

    let meta = decode_payload(br#"["See other", [], {"r": "other"}]"#).unwrap();
    assert_eq!(meta.redirect.as_deref(), Some("other"));

    let link = decode_payload(br#"["@@@LINK=target\r\n", []]"#).unwrap();
    assert_eq!(link.redirect.as_deref(), Some("target"));

    assert!(matches!(decode_payload(b"not json"), Err(DictError::InvalidFormat(_))));

    let raw = raw_payload(b"@@@LINK=elsewhere");
    assert_eq!(raw.text, "@@@LINK=elsewhere");
    assert_eq!(raw.redirect.as_deref(), Some("elsewhere"));
}

#[test]
fn test_payload_encoding_is_readable() {
    let tags = vec![tag("b", 0, 3)];
    let bytes = encode_payload("one two", &tags, Some("three")).unwrap();
    let payload = decode_payload(&bytes).unwrap();
    assert_eq!(payload.text, "one two");
    assert_eq!(payload.tags, tags);
    assert_eq!(payload.redirect.as_deref(), Some("three"));
}

#[test]
fn test_codec_chain_falls_back() {
    let body = encode_payload("compressed article", &[], None).unwrap();

    let zlib = compress(Codec::Zlib, &body).unwrap();
    let chain = CodecChain::new(vec![Codec::None, Codec::Lzo, Codec::Zlib]);
    let (payload, codec) = chain.decode(&zlib, decode_payload).unwrap();
    assert_eq!(codec, Codec::Zlib);
    assert_eq!(payload.text, "compressed article");

    let lzo = compress(Codec::Lzo, &body).unwrap();
    let chain = CodecChain::new(vec![Codec::None, Codec::Zlib, Codec::Lzo]);
    let (payload, codec) = chain.decode(&lzo, decode_payload).unwrap();
    assert_eq!(codec, Codec::Lzo);
    assert_eq!(payload.text, "compressed article");

    let (_, codec) = chain.decode(&body, decode_payload).unwrap();
    assert_eq!(codec, Codec::None);

    assert!(chain.decode(b"\x00\x01garbage", decode_payload).is_none());
}

#[test]
fn test_codec_chain_order() {
    assert_eq!(CodecChain::default().order(), &Codec::ALL);
    assert_eq!(
        CodecChain::with_preferred(Some(Codec::Lzo)).order(),
        &[Codec::Lzo, Codec::None, Codec::Zlib]
    );
    assert_eq!(
        CodecChain::new(vec![Codec::Zlib, Codec::Zlib]).order(),
        &[Codec::Zlib, Codec::None, Codec::Lzo]
    );
    assert_eq!(decompress(Codec::None, b"abc").unwrap(), b"abc");
    assert!(decompress(Codec::Zlib, b"abc").is_err());
}

#[test]
fn test_note_clamp() {
    let text = "head\nnote body\nnext line";
    let note = tag("note", 5, 24);
    assert_eq!(clamp_note_end(text, &note), 14);

    let short = tag("note", 5, 9);
    assert_eq!(clamp_note_end(text, &short), 9);

    let bold = tag("b", 5, 24);
    assert_eq!(clamp_note_end(text, &bold), 24);

    let last = tag("note", 15, 24);
    assert_eq!(clamp_note_end(text, &last), 24);

    let clamped = clamped_tags(text, &[note, bold]);
    assert_eq!(clamped[0].end, 14);
    assert_eq!(clamped[1].end, 24);
}
