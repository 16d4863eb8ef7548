use super::*;
use crate::sources::tests::write_pdf;
use tempfile::TempDir;

#[test]
fn one_segment_per_page_with_page_numbers() {
    let temp_dir = TempDir::new().expect("should create TempDir");
    let path = write_pdf(
        temp_dir.path(),
        "handbook.pdf",
        &["Alpha Beta Gamma", "Delta Epsilon Zeta"],
    );

    let segments = extract_pdf(&path).expect("should extract");

    assert_eq!(segments.len(), 2);
    assert!(segments[0].text.contains("Alpha Beta Gamma"));
    assert!(segments[1].text.contains("Delta Epsilon Zeta"));
    assert_eq!(segments[0].metadata.page, Some(1));
    assert_eq!(segments[1].metadata.page, Some(2));
    assert_eq!(
        segments[1].metadata.doc_name.as_deref(),
        Some("handbook.pdf")
    );
}

#[test]
fn blank_pages_are_skipped_but_numbering_is_kept() {
    let temp_dir = TempDir::new().expect("should create TempDir");
    let path = write_pdf(
        temp_dir.path(),
        "gaps.pdf",
        &["Cover text", "", "Closing text"],
    );

    let segments = extract_pdf(&path).expect("should extract");

    let pages: Vec<Option<u32>> = segments.iter().map(|s| s.metadata.page).collect();
    assert_eq!(pages, vec![Some(1), Some(3)]);
}

#[test]
fn unreadable_pdf_is_an_error() {
    let temp_dir = TempDir::new().expect("should create TempDir");
    let path = temp_dir.path().join("corrupt.pdf");
    std::fs::write(&path, b"%PDF-1.7\nnot really a pdf").expect("should write file");

    assert!(extract_pdf(&path).is_err());
}
