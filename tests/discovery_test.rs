mod test_utils;

use loudnorm_batch::{
    AudioFormat, Error, create_output_path, find_audio_files, find_single_file, mapped_output_path,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use test_utils::create_files;

fn relative(files: &[loudnorm_batch::AudioFile], root: &Path) -> Vec<PathBuf> {
    files
        .iter()
        .map(|f| f.relative_to(root).to_path_buf())
        .collect()
}

#[test]
fn discovery_filters_by_extension_and_sorts() {
    let dir = TempDir::new().unwrap();
    create_files(
        dir.path(),
        &[
            "sub/deeper/d.ogg",
            "a.wav",
            "z.txt",
            "B.MP3",
            "sub/c.Flac",
            "sub/readme.md",
            "clip.mp4",
            "voice.m4a",
            "old.wma",
            "raw.aac",
            "cover.jpg",
        ],
    );

    let files = find_audio_files(dir.path());
    let expected: Vec<PathBuf> = [
        "B.MP3",
        "a.wav",
        "clip.mp4",
        "old.wma",
        "raw.aac",
        "sub/c.Flac",
        "sub/deeper/d.ogg",
        "voice.m4a",
    ]
    .iter()
    .map(PathBuf::from)
    .collect();
    assert_eq!(relative(&files, dir.path()), expected);
    assert_eq!(files[0].format, AudioFormat::Mp3);
    assert_eq!(files[5].format, AudioFormat::Flac);
}

#[test]
fn discovery_of_empty_tree() {
    let dir = TempDir::new().unwrap();
    assert!(find_audio_files(dir.path()).is_empty());
}

#[test]
fn output_path_mirrors_tree_and_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("mp3s");
    let dest = dir.path().join("normalized");
    create_files(&source, &["sub/b.flac"]);
    let input = source.join("sub/b.flac");

    let first = create_output_path(&input, &source, &dest).unwrap();
    assert_eq!(first, dest.join("sub").join("b.mp3"));
    assert!(dest.join("sub").is_dir());
    assert!(!first.exists());

    let second = create_output_path(&input, &source, &dest).unwrap();
    assert_eq!(first, second);
    assert_eq!(mapped_output_path(&input, &source, &dest), Some(first));
}

#[test]
fn single_file_by_name_or_suffix() {
    let dir = TempDir::new().unwrap();
    create_files(dir.path(), &["a.wav", "sub/b.flac", "sub/ab.flac"]);

    let by_name = find_single_file(dir.path(), "b.flac", None).unwrap();
    assert_eq!(by_name.path, dir.path().join("sub/b.flac"));

    let by_suffix = find_single_file(dir.path(), "sub/b.flac", None).unwrap();
    assert_eq!(by_suffix.path, dir.path().join("sub/b.flac"));
}

#[test]
fn single_file_rejects_unsupported_extension() {
    let dir = TempDir::new().unwrap();
    create_files(dir.path(), &["notes.txt"]);
    assert!(matches!(
        find_single_file(dir.path(), "notes.txt", None),
        Err(Error::InvalidFileType(q)) if q == "notes.txt"
    ));
}

#[test]
fn single_file_not_found() {
    let dir = TempDir::new().unwrap();
    create_files(dir.path(), &["a.wav"]);
    assert!(matches!(
        find_single_file(dir.path(), "missing.mp3", None),
        Err(Error::FileNotFound { .. })
    ));
}

#[test]
fn duplicate_names_need_a_relative_path() {
    let dir = TempDir::new().unwrap();
    create_files(dir.path(), &["x/song.mp3", "y/song.mp3"]);

    match find_single_file(dir.path(), "song.mp3", None) {
        Err(Error::AmbiguousMatch { candidates, .. }) => {
            assert_eq!(
                candidates,
                vec![dir.path().join("x/song.mp3"), dir.path().join("y/song.mp3")]
            );
        }
        other => panic!("expected ambiguity, got {other:?}"),
    }

    let exact = find_single_file(dir.path(), "y/song.mp3", None).unwrap();
    assert_eq!(exact.path, dir.path().join("y/song.mp3"));
}

#[test]
fn source_name_finds_normalized_output() {
    let dir = TempDir::new().unwrap();
    create_files(dir.path(), &["sub/b.mp3"]);

    assert!(find_single_file(dir.path(), "b.flac", None).is_err());
    let found = find_single_file(dir.path(), "sub/b.flac", Some("mp3")).unwrap();
    assert_eq!(found.path, dir.path().join("sub/b.mp3"));
}

#[test]
fn discovery_skips_in_progress_outputs() {
    let dir = TempDir::new().unwrap();
    let name = format!("{}a1b2c3.mp3", loudnorm_batch::TEMP_FILE_PREFIX);
    create_files(dir.path(), &["a.mp3", &name]);
    let files = find_audio_files(dir.path());
    assert_eq!(relative(&files, dir.path()), vec![PathBuf::from("a.mp3")]);
    assert!(find_single_file(dir.path(), &name, None).is_err());
}
