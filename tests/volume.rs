mod common;

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions as FileOptions};

use lexivol::dict::types::models::AttrValue;
use lexivol::dict::volume::sibling_path;
use lexivol::dict::{IndexOrigin, SourceEntry, VolumeState};
use lexivol::{
    ArticlePointer, CancelToken, Codec, Collator, DictError, FormatVersion, OpenOptions, Strength,
    Tag, Volume, VolumeBuilder,
};

const QUERIES: &[&str] = &[
    "", "a", "ap", "APP", "app", "apple", "ban", "band", "caf", "café", "ro", "role", "a b", "ab",
    "z", "ze", "zeb", "q", "zzz", "-",
];

/// Words matching `query` at `strength`, in index order, computed from keys alone.
fn expected(query: &str, strength: Strength) -> Vec<String> {
    let collator = Collator::builtin();
    let mut sorted: Vec<&str> = common::WORDS.to_vec();
    sorted.sort_by_key(|w| collator.key(w, Strength::Quaternary));
    let prefix = collator.key(query, strength);
    sorted
        .into_iter()
        .filter(|w| collator.key(w, strength).starts_with(&prefix))
        .map(str::to_string)
        .collect()
}

#[test]
fn test_lookup_agrees_across_formats() {
    let dir = tempfile::tempdir().unwrap();
    for format in common::FORMATS {
        for eager in [None, Some(2)] {
            let mut builder = common::builder("Demo", format);
            if let Some(depth) = eager {
                builder = builder.short_index_depth(depth);
            }
            let name = format!("{}-{}.lxv", format, eager.is_some());
            let (path, _) = common::build(dir.path(), &name, builder);
            let volume = common::open(&path);
            assert_eq!(volume.format(), format);
            assert_eq!(volume.len(), common::WORDS.len() as u64);
            let origin = volume.short_index_origin();
            if eager.is_some() {
                assert_eq!(origin, IndexOrigin::Eager);
            } else {
                assert_eq!(origin, IndexOrigin::Empty);
            }
            for query in QUERIES {
                assert_eq!(
                    common::words(&volume, query),
                    expected(query, Strength::Primary),
                    "{} (eager {:?}): '{}'",
                    format,
                    eager,
                    query
                );
            }
        }
    }
}

#[test]
fn test_lookup_at_finer_strength() {
    let dir = tempfile::tempdir().unwrap();
    for format in common::FORMATS {
        let (path, _) = common::build(dir.path(), &format!("{}.lxv", format), common::builder("Demo", format));
        let volume = Volume::open(&path, OpenOptions::new().strength(Strength::Tertiary)).unwrap();
        for query in ["Ap", "app", "ro", "Ro", "rô", "café", "ab"] {
            assert_eq!(
                common::words(&volume, query),
                expected(query, Strength::Tertiary),
                "{}: '{}'",
                format,
                query
            );
        }
        let exact: Vec<String> = volume
            .lookup_exact("apple")
            .unwrap()
            .into_iter()
            .map(|e| e.word)
            .collect();
        assert_eq!(exact, vec!["apple"]);
    }
}

#[test]
fn test_unique_match_carries_its_pointer() {
    let dir = tempfile::tempdir().unwrap();
    for format in common::FORMATS {
        let (path, report) = common::build(dir.path(), &format!("{}.lxv", format), common::builder("Demo", format));
        let volume = common::open(&path);
        let found: Vec<_> = volume.lookup("zeb").unwrap().collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].word, "zebra");
        let (_, pointer) = report.entries.iter().find(|(w, _)| w == "zebra").unwrap();
        assert_eq!(&found[0].article, pointer);
        match format {
            FormatVersion::FixedRecord => {
                assert!(matches!(pointer, ArticlePointer::Local { file_no: 0, .. }))
            }
            _ => assert!(matches!(pointer, ArticlePointer::Global(_))),
        }
    }
}

#[test]
fn test_homographs() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _) = common::build(dir.path(), "demo.lxv", common::builder("Demo", FormatVersion::Linked));
    let volume = common::open(&path);
    let mut words: Vec<String> = volume
        .lookup_exact("APPLE")
        .unwrap()
        .into_iter()
        .map(|e| e.word)
        .collect();
    words.sort();
    assert_eq!(words, vec!["Apple", "apple"]);
    assert!(volume.lookup_exact("appl").unwrap().is_empty());
}

#[test]
fn test_articles_across_files() {
    let dir = tempfile::tempdir().unwrap();
    for format in common::FORMATS {
        for files in [1, 3] {
            let name = format!("{}-{}.lxv", format, files);
            let builder = common::builder("Demo", format).files(files).codec(Codec::Lzo);
            let (path, report) = common::build(dir.path(), &name, builder);
            assert_eq!(report.files.len(), files);
            if files > 1 {
                assert_eq!(report.files[1], sibling_path(&path, 0));
            }

            let volume = common::open(&path);
            assert_eq!(volume.file_paths().len(), files);
            for entry in volume.entries().unwrap() {
                let entry = entry.unwrap();
                let article = volume.read_article(&volume.handle(&entry)).unwrap();
                assert_eq!(article.title, entry.word);
                assert_eq!(article.text, common::text_for(&entry.word), "{} in {}", entry.word, name);
                assert_eq!(article.codec, Some(Codec::Lzo));
                assert!(!article.is_redirect());
            }
        }
    }
}

#[test]
fn test_tags_and_redirect_payloads() {
    let dir = tempfile::tempdir().unwrap();
    let mut href = BTreeMap::new();
    href.insert("href".to_string(), AttrValue::Text("#b".to_string()));
    let tags = vec![
        Tag {
            name: "b".to_string(),
            start: 0,
            end: 4,
            attributes: BTreeMap::new(),
        },
        Tag {
            name: "a".to_string(),
            start: 5,
            end: 9,
            attributes: href,
        },
    ];
    let builder = VolumeBuilder::new("Tags", "1")
        .entry(SourceEntry::new("tagged", "Bold link text").with_tags(tags.clone()))
        .entry(SourceEntry::new("linked", "@@@LINK=tagged"));
    let (path, _) = common::build(dir.path(), "tags.lxv", builder);
    let volume = common::open(&path);

    let entry = volume.lookup_exact("tagged").unwrap().remove(0);
    let article = volume.read_article(&volume.handle(&entry)).unwrap();
    assert_eq!(article.tags, tags);

    let entry = volume.lookup_exact("linked").unwrap().remove(0);
    let article = volume.read_article(&volume.handle(&entry)).unwrap();
    assert_eq!(article.redirect.as_deref(), Some("tagged"));
}

#[test]
fn test_article_cache_and_foreign_handles() {
    let dir = tempfile::tempdir().unwrap();
    let (one, _) = common::build(dir.path(), "one.lxv", common::builder("One", FormatVersion::FixedRecord));
    let (two, _) = common::build(dir.path(), "two.lxv", common::builder("Two", FormatVersion::FixedRecord));
    let one = common::open(&one);
    let two = common::open(&two);

    let entry = one.lookup_exact("banana").unwrap().remove(0);
    let handle = one.handle(&entry);
    let first = one.read_article(&handle).unwrap();
    let second = one.read_article(&handle).unwrap();
    assert_eq!(first, second);
    let stats = one.article_cache_stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.size, 1);

    assert!(matches!(two.read_article(&handle), Err(DictError::UnknownVolume(_))));
}

#[test]
fn test_article_cache_evicts_least_recent() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _) = common::build(dir.path(), "demo.lxv", common::builder("Demo", FormatVersion::Positional));
    let volume = Volume::open(&path, OpenOptions::new().article_cache_size(2)).unwrap();
    let handle = |word: &str| volume.handle(&volume.lookup_exact(word).unwrap().remove(0));
    let (apple, banana, zebra) = (handle("apple"), handle("banana"), handle("zebra"));

    for h in [&apple, &banana, &apple, &zebra, &apple, &banana] {
        assert_eq!(volume.read_article(h).unwrap().text, common::text_for(&h.title));
    }
    let stats = volume.article_cache_stats();
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 4);
    assert_eq!(stats.size, 2);

    let uncached = Volume::open(&path, OpenOptions::new().article_cache_size(0)).unwrap();
    let entry = uncached.lookup_exact("apple").unwrap().remove(0);
    uncached.read_article(&uncached.handle(&entry)).unwrap();
    uncached.read_article(&uncached.handle(&entry)).unwrap();
    assert_eq!(uncached.article_cache_stats().hits, 0);
    assert_eq!(uncached.article_cache_stats().size, 0);
}

#[test]
fn test_missing_sibling() {
    let dir = tempfile::tempdir().unwrap();
    let builder = common::builder("Demo", FormatVersion::Positional).files(2);
    let (path, _) = common::build(dir.path(), "demo.lxv", builder);
    fs::remove_file(sibling_path(&path, 0)).unwrap();
    assert!(matches!(
        Volume::open(&path, OpenOptions::new()),
        Err(DictError::Format(_))
    ));
}

#[test]
fn test_sibling_from_another_build() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    let (path, _) = common::build(
        first.path(),
        "demo.lxv",
        common::builder("Demo", FormatVersion::FixedRecord).files(2).timestamp(100),
    );
    let (other, _) = common::build(
        second.path(),
        "demo.lxv",
        common::builder("Demo", FormatVersion::FixedRecord).files(2).timestamp(200),
    );
    fs::copy(sibling_path(&other, 0), sibling_path(&path, 0)).unwrap();

    match Volume::open(&path, OpenOptions::new()) {
        Err(DictError::VolumeMismatch { expected, found, .. }) => {
            assert_eq!(expected, 100);
            assert_eq!(found, 200);
        }
        other => panic!("expected a mismatch, got {:?}", other.map(|v| v.len())),
    }
}

#[test]
fn test_verify_intact_volume() {
    let dir = tempfile::tempdir().unwrap();
    for format in common::FORMATS {
        let builder = common::builder("Demo", format).files(2);
        let (path, _) = common::build(dir.path(), &format!("{}.lxv", format), builder);
        let volume = common::open(&path);
        let progress: Vec<f64> = volume
            .verify()
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(progress.len(), common::WORDS.len());
        assert!(progress.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(progress.last(), Some(&1.0));
    }
}

#[test]
fn test_verify_empty_volume() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.lxv");
    lexivol::VolumeBuilder::new("Empty", "1").write(&path).unwrap();
    let volume = common::open(&path);
    assert!(volume.is_empty());
    let progress: Vec<_> = volume.verify().unwrap().collect();
    assert_eq!(progress.len(), 1);
    assert_eq!(*progress[0].as_ref().unwrap(), 1.0);
    assert!(common::words(&volume, "a").is_empty());
}

#[test]
fn test_verify_truncated_volume() {
    let dir = tempfile::tempdir().unwrap();
    for format in common::FORMATS {
        let (path, _) = common::build(dir.path(), &format!("{}.lxv", format), common::builder("Demo", format));
        let len = fs::metadata(&path).unwrap().len();
        FileOptions::new().write(true).open(&path).unwrap().set_len(len - 3).unwrap();

        let volume = common::open(&path);
        let results: Vec<_> = volume.verify().unwrap().collect();
        assert!(results.len() <= common::WORDS.len());
        assert!(results[..results.len() - 1].iter().all(|r| r.is_ok()));
        match results.last() {
            Some(Err(DictError::Verify { .. })) => {}
            other => panic!("{}: expected a verify failure, got {:?}", format, other),
        }
    }
}

#[test]
fn test_broken_chain_keeps_partial_results() {
    let dir = tempfile::tempdir().unwrap();
    let mut builder = VolumeBuilder::new("Chain", "1").format(FormatVersion::Linked);
    for i in 0..10 {
        let word = format!("w{:02}", i);
        let text = common::text_for(&word);
        builder = builder.add(word, text);
    }
    let (path, _) = common::build(dir.path(), "chain.lxv", builder);
    let index_offset = common::open(&path).metadata().index_offset.unwrap();

    // Every record is 21 bytes; send the fifth one's `next` past the index region.
    let mut bytes = fs::read(&path).unwrap();
    let at = (index_offset + 4 * 21) as usize;
    bytes[at..at + 4].copy_from_slice(&0x7FFF_FFFFu32.to_be_bytes());
    fs::write(&path, &bytes).unwrap();

    let volume = common::open(&path);
    let mut lookup = volume.lookup("w").unwrap();
    let words: Vec<String> = lookup.by_ref().map(|e| e.word).collect();
    assert_eq!(words, vec!["w00", "w01", "w02", "w03", "w04"]);
    assert!(matches!(lookup.error(), Some(DictError::IllegalRead { .. })));
    assert!(lookup.next().is_none());
}

#[test]
fn test_close() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _) = common::build(dir.path(), "demo.lxv", common::builder("Demo", FormatVersion::Linked).files(2));
    let volume = common::open(&path);
    let entry = volume.lookup_exact("zero").unwrap().remove(0);
    let handle = volume.handle(&entry);

    assert_eq!(volume.state(), VolumeState::Open);
    volume.close().unwrap();
    volume.close().unwrap();
    assert_eq!(volume.state(), VolumeState::Closed);
    assert!(matches!(volume.lookup("zero"), Err(DictError::Closed)));
    assert!(matches!(volume.read_article(&handle), Err(DictError::Closed)));
    assert!(matches!(volume.verify(), Err(DictError::Closed)));
}

#[test]
fn test_cancelled_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _) = common::build(dir.path(), "demo.lxv", common::builder("Demo", FormatVersion::Linked));
    let volume = common::open(&path);
    let token = CancelToken::new();
    token.cancel();
    let mut lookup = volume.lookup_with("zebra", token).unwrap();
    assert!(lookup.next().is_none());
    assert!(matches!(lookup.error(), Some(DictError::Cancelled)));
}
