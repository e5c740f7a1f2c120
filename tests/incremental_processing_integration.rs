use quotecast::incremental::{annotation_complete, needs_annotation, write_annotation, write_json_file};
use quotecast::{annotate_book, annotation_path, Annotator, ChapterReader, ReaderConfig, Roster};

#[path = "integration/fixtures/mod.rs"]
mod fixtures;
use fixtures::*;

#[path = "integration/mod.rs"]
mod test_utils;
use test_utils::TestFixture;

/// Book file in, one complete annotation per chapter out
#[tokio::test]
async fn test_book_file_round_trip_through_disk() {
    let fixture = TestFixture::new();
    let book_path = fixture.create_book_file("book.json", &book());

    let chapters = ChapterReader::new(ReaderConfig::default())
        .read_input(&book_path)
        .await
        .expect("Reading the book should succeed");
    assert_eq!(chapters.len(), 3);

    let annotator = Annotator::with_defaults().unwrap();
    let annotated = annotate_book(&annotator, &chapters);
    for chapter in &annotated.chapters {
        let path = write_annotation(&fixture.out_dir(), chapter).await.unwrap();
        assert_eq!(path, fixture.annotation_path(chapter.index));
        assert!(annotation_complete(&path).await);
    }

    let reread = fixture.read_annotation(1);
    assert_eq!(reread, annotated.chapters[1]);
}

/// Partial files are rewritten, complete ones skipped unless overwriting
#[tokio::test]
async fn test_partial_annotation_is_not_complete() {
    let fixture = TestFixture::new();
    let partial = fixture.create_partial_annotation(0, "{\"index\": 0,\n");
    assert_eq!(partial, annotation_path(&fixture.out_dir(), 0));

    assert!(!annotation_complete(&partial).await);
    assert!(needs_annotation(&partial, false).await);

    let annotator = Annotator::with_defaults().unwrap();
    let mut roster = Roster::new();
    let chapter = annotator.annotate_chapter(0, &arrival_chapter(), &mut roster);
    write_annotation(&fixture.out_dir(), &chapter).await.unwrap();

    assert!(!needs_annotation(&partial, false).await);
    assert!(needs_annotation(&partial, true).await);
}

/// Chapter directories are read in file-name order and earlier output is ignored
#[tokio::test]
async fn test_chapter_directory_input() {
    let fixture = TestFixture::new();
    let chapters_dir = fixture.root_path.join("chapters");
    fixture.create_file("chapters/010.json", &serde_json::to_string(&market_chapter()).unwrap());
    fixture.create_file("chapters/002.json", &serde_json::to_string(&arrival_chapter()).unwrap());
    fixture.create_file("chapters/broken.json", "{\"title\": ");
    fixture.create_file("chapters/chapter_0001_annotated.json", "{}\n");

    let chapters = ChapterReader::new(ReaderConfig::default())
        .read_input(&chapters_dir)
        .await
        .expect("Reading a directory should skip broken files");
    let titles: Vec<&str> = chapters.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, vec!["Arrival", "Market"]);

    let strict = ChapterReader::new(ReaderConfig { fail_fast: true });
    assert!(strict.read_input(&chapters_dir).await.is_err());
}

/// The roster file uses the documented `{canonical: [aliases]}` shape
#[tokio::test]
async fn test_roster_written_as_alias_map() {
    let fixture = TestFixture::new();
    let annotator = Annotator::with_defaults().unwrap();
    let book = annotate_book(&annotator, &[arrival_chapter()]);

    let roster_path = fixture.out_dir().join("book_roster.json");
    write_json_file(&roster_path, &book.roster).await.unwrap();

    let content = std::fs::read_to_string(&roster_path).unwrap();
    assert!(content.ends_with('\n'));
    let value: serde_json::Value = serde_json::from_str(&content).unwrap();
    let maria = value["Maria"].as_array().expect("Maria should map to an alias list");
    assert!(maria.iter().any(|alias| alias == "Maria"));

    let parsed: Roster = serde_json::from_str(&content).unwrap();
    assert_eq!(parsed, book.roster);
}
