mod common;

use std::fs;
use std::path::Path;
use std::thread;

use lexivol::dict::format::header::ShortTableLayout;
use lexivol::dict::index::cache_file::{self, IndexCacheFile};
use lexivol::dict::index::short::{ShortIndex, ShortIndexOptions};
use lexivol::dict::index::Start;
use lexivol::dict::utils::SharedFile;
use lexivol::dict::IndexOrigin;
use lexivol::{CancelToken, Collator, DictError, FormatVersion, OpenOptions, Result, Volume, VolumeBuilder};

fn numbered() -> VolumeBuilder {
    let mut builder = VolumeBuilder::new("Numbers", "3")
        .format(FormatVersion::Linked)
        .timestamp(42);
    for i in 0..40 {
        let word = format!("word{:02}", i);
        let text = common::text_for(&word);
        builder = builder.add(word, text);
    }
    builder.add("alpha", "first").add("omega", "last")
}

fn options(cache: &Path) -> OpenOptions {
    OpenOptions::new().cache_dir(cache).index_threshold(5)
}

fn standalone(threshold: u64) -> ShortIndex {
    ShortIndex::new(
        Collator::shared(),
        ShortIndexOptions {
            threshold,
            max_depth: 6,
            memo_capacity: 16,
            cache: None,
        },
    )
}

fn records(words: &[&str]) -> Vec<Result<(u64, String)>> {
    words
        .iter()
        .enumerate()
        .map(|(i, w)| Ok((i as u64, w.to_string())))
        .collect()
}

const PROBES: &[&str] = &["", "a", "alp", "w", "word", "word1", "word17", "word4", "o", "x", "wz"];

#[test]
fn test_eager_table_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    for format in common::FORMATS {
        let builder = common::builder("Demo", format).short_index_depth(3);
        let (path, _) = common::build(dir.path(), &format!("{}.lxv", format), builder);
        let volume = common::open(&path);
        assert_eq!(volume.short_index_origin(), IndexOrigin::Eager);
        assert!(matches!(volume.short_index_start("apple"), Start::Hint { depth: 3, .. }));
        assert!(matches!(volume.short_index_start("zeb"), Start::Hint { depth: 3, .. }));
        // Eager tables are never trusted to list every prefix.
        assert_eq!(volume.short_index_start("qqq"), Start::Beginning);
    }
}

#[test]
fn test_build_after_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let (path, _) = common::build(dir.path(), "numbers.lxv", numbered());
    let volume = Volume::open(&path, options(cache.path())).unwrap();
    assert_eq!(volume.short_index_origin(), IndexOrigin::Empty);

    let before = common::words(&volume, "word39");
    assert_eq!(before, vec!["word39"]);
    assert_eq!(volume.short_index_origin(), IndexOrigin::Empty);

    let after = common::words(&volume, "word3");
    assert_eq!(volume.short_index_origin(), IndexOrigin::Built);
    let expected: Vec<String> = (30..40).map(|i| format!("word{}", i)).collect();
    assert_eq!(after, expected);
    assert_eq!(common::words(&volume, "word39"), before);
    assert_eq!(common::words(&volume, "alpha"), vec!["alpha"]);

    assert!(matches!(volume.short_index_start("word17"), Start::Hint { depth: 6, .. }));
    assert!(cache_file::cache_path(cache.path(), volume.id()).is_file());
}

#[test]
fn test_known_misses_are_memoized() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _) = common::build(dir.path(), "numbers.lxv", numbered());
    let volume = Volume::open(&path, OpenOptions::new()).unwrap();
    assert!(volume.build_short_index(&CancelToken::new()).unwrap());
    assert!(!volume.build_short_index(&CancelToken::new()).unwrap());

    assert!(common::words(&volume, "xyz").is_empty());
    assert!(common::words(&volume, "xyz").is_empty());
    let stats = volume.cache_stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.size, 1);
}

#[test]
fn test_cache_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let (path, _) = common::build(dir.path(), "numbers.lxv", numbered());

    let first = Volume::open(&path, options(cache.path())).unwrap();
    assert!(first.build_short_index(&CancelToken::new()).unwrap());
    assert_eq!(first.short_index_origin(), IndexOrigin::Built);

    let second = Volume::open(&path, options(cache.path())).unwrap();
    assert_eq!(second.short_index_origin(), IndexOrigin::Cached);
    for probe in PROBES {
        assert_eq!(
            first.short_index_start(probe),
            second.short_index_start(probe),
            "'{}'",
            probe
        );
    }
    assert!(!second.build_short_index(&CancelToken::new()).unwrap());
    assert_eq!(common::words(&second, "word2").len(), 10);
}

#[test]
fn test_cache_for_other_volume_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let (path, _) = common::build(dir.path(), "numbers.lxv", numbered());

    let volume = Volume::open(&path, options(cache.path())).unwrap();
    volume.build_short_index(&CancelToken::new()).unwrap();
    let cache_path = cache_file::cache_path(cache.path(), volume.id());

    let mut stored = IndexCacheFile::read(&cache_path).unwrap().unwrap();
    stored.identity.title = "Other".to_string();
    stored.write(&cache_path).unwrap();
    let reopened = Volume::open(&path, options(cache.path())).unwrap();
    assert_eq!(reopened.short_index_origin(), IndexOrigin::Empty);

    // Rebuilding replaces the stale file.
    reopened.build_short_index(&CancelToken::new()).unwrap();
    let again = Volume::open(&path, options(cache.path())).unwrap();
    assert_eq!(again.short_index_origin(), IndexOrigin::Cached);

    let deeper = Volume::open(&path, options(cache.path()).max_prefix_depth(3)).unwrap();
    assert_eq!(deeper.short_index_origin(), IndexOrigin::Empty);
}

#[test]
fn test_corrupt_cache_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let (path, _) = common::build(dir.path(), "numbers.lxv", numbered());
    let volume = Volume::open(&path, options(cache.path())).unwrap();
    volume.build_short_index(&CancelToken::new()).unwrap();
    let cache_path = cache_file::cache_path(cache.path(), volume.id());

    let mut bytes = fs::read(&cache_path).unwrap();
    let middle = bytes.len() / 2;
    bytes[middle] ^= 0x5A;
    fs::write(&cache_path, &bytes).unwrap();
    assert!(matches!(IndexCacheFile::read(&cache_path), Err(DictError::Cache(_))));

    let reopened = Volume::open(&path, options(cache.path())).unwrap();
    assert_eq!(reopened.short_index_origin(), IndexOrigin::Empty);
    assert_eq!(common::words(&reopened, "omega"), vec!["omega"]);
}

#[test]
fn test_repeated_prefix_keeps_every_start() {
    let index = standalone(1000);
    let built = index
        .build(records(&["apple", "banana", "apricot"]), &CancelToken::new())
        .unwrap();
    assert!(built);
    let collator = Collator::builtin();
    let query = collator.key("ap", lexivol::Strength::Primary);
    assert_eq!(
        index.start(&query),
        Start::Hint {
            positions: vec![0, 2],
            depth: 1
        }
    );
}

#[test]
fn test_long_runs_split_deeper() {
    let index = standalone(1);
    index
        .build(records(&["aa", "ab", "ac", "b"]), &CancelToken::new())
        .unwrap();
    assert_eq!(index.origin(), IndexOrigin::Built);
    let collator = Collator::builtin();
    let start = |word: &str| index.start(&collator.key(word, lexivol::Strength::Primary));

    assert_eq!(start("ab"), Start::Hint { positions: vec![1], depth: 2 });
    assert_eq!(start("abc"), Start::Hint { positions: vec![1], depth: 2 });
    assert_eq!(start("ad"), Start::Hint { positions: vec![0], depth: 1 });
    assert_eq!(start("b"), Start::Hint { positions: vec![3], depth: 1 });
    assert_eq!(start(""), Start::Beginning);
    assert_eq!(start("c"), Start::Miss);
}

#[test]
fn test_cancelled_build_commits_nothing() {
    let index = standalone(1);
    let token = CancelToken::new();
    token.cancel();
    let result = index.build(records(&["aa", "ab"]), &token);
    assert!(matches!(result, Err(DictError::Cancelled)));
    assert_eq!(index.origin(), IndexOrigin::Empty);

    let failing = vec![Ok((0, "aa".to_string())), Err(DictError::Closed)];
    assert!(index.build(failing, &CancelToken::new()).is_err());
    assert_eq!(index.origin(), IndexOrigin::Empty);
}

#[test]
fn test_cancelled_lookup_build() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _) = common::build(dir.path(), "numbers.lxv", numbered());
    let volume = Volume::open(&path, OpenOptions::new().index_threshold(5)).unwrap();
    common::words(&volume, "word39");

    let token = CancelToken::new();
    token.cancel();
    assert!(matches!(volume.lookup_with("word1", token), Err(DictError::Cancelled)));
    assert_eq!(volume.short_index_origin(), IndexOrigin::Empty);

    assert_eq!(common::words(&volume, "word1").len(), 10);
    assert_eq!(volume.short_index_origin(), IndexOrigin::Built);
}

#[test]
fn test_single_builder() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _) = common::build(dir.path(), "numbers.lxv", numbered());
    let volume = Volume::open(&path, OpenOptions::new().index_threshold(5)).unwrap();

    let built: Vec<bool> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| volume.build_short_index(&CancelToken::new()).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(built.iter().filter(|b| **b).count(), 1);
    assert_eq!(volume.short_index_origin(), IndexOrigin::Built);
}

#[test]
fn test_eager_table_past_end_of_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("table.bin");
    fs::write(&path, [0u8; 64]).unwrap();
    let file = SharedFile::open(&path).unwrap();
    let index = standalone(1000);

    for count in [100, 1_000_000_000_000_000_000] {
        let layout = ShortTableLayout { offset: 8, count, depth: 1 };
        assert!(matches!(index.load_eager(&file, layout), Err(DictError::Format(_))));
    }
    let layout = ShortTableLayout { offset: 0, count: 1, depth: 1 << 62 };
    assert!(matches!(index.load_eager(&file, layout), Err(DictError::Format(_))));
    assert_eq!(index.origin(), IndexOrigin::Empty);

    let fits = ShortTableLayout { offset: 0, count: 4, depth: 1 };
    index.load_eager(&file, fits).unwrap();
    assert_eq!(index.origin(), IndexOrigin::Eager);
}
