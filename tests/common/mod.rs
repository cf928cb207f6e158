#![allow(dead_code)]

use std::path::{Path, PathBuf};

use lexivol::dict::{BuildReport, SourceEntry};
use lexivol::{FormatVersion, OpenOptions, Volume, VolumeBuilder};

pub const FORMATS: [FormatVersion; 3] = [
    FormatVersion::Linked,
    FormatVersion::Positional,
    FormatVersion::FixedRecord,
];

/// Headwords covering accents, case, punctuation and homographs.
pub const WORDS: &[&str] = &[
    "apple",
    "Apple",
    "application",
    "apply",
    "apricot",
    "banana",
    "band",
    "bandana",
    "café",
    "cafe",
    "cafeteria",
    "role",
    "Role",
    "rôle",
    "a b",
    "ab",
    "zebra",
    "zeal",
    "zero",
];

pub fn text_for(word: &str) -> String {
    format!("Definition of {}.", word)
}

pub fn corpus() -> Vec<SourceEntry> {
    WORDS.iter().map(|w| SourceEntry::new(*w, text_for(w))).collect()
}

pub fn builder(title: &str, format: FormatVersion) -> VolumeBuilder {
    VolumeBuilder::new(title, "1.0")
        .format(format)
        .language("en")
        .timestamp(1_700_000_000)
        .extend(corpus())
}

pub fn build(dir: &Path, name: &str, builder: VolumeBuilder) -> (PathBuf, BuildReport) {
    let path = dir.join(name);
    let report = builder.write(&path).unwrap();
    (path, report)
}

pub fn open(path: &Path) -> Volume {
    Volume::open(path, OpenOptions::new()).unwrap()
}

pub fn words(volume: &Volume, query: &str) -> Vec<String> {
    volume.lookup(query).unwrap().map(|e| e.word).collect()
}
