use super::*;
use crate::sources::tests::{word_body, write_docx, write_pdf};
use tempfile::TempDir;

#[test]
fn kind_from_extension() {
    assert_eq!(
        DocumentKind::from_path(Path::new("a/Report.PDF")),
        Some(DocumentKind::Pdf)
    );
    assert_eq!(
        DocumentKind::from_path(Path::new("notes.docx")),
        Some(DocumentKind::Word)
    );
    assert_eq!(DocumentKind::from_path(Path::new("legacy.doc")), None);
    assert_eq!(DocumentKind::from_path(Path::new("README")), None);
}

#[test]
fn pdf_signature_check() {
    let temp_dir = TempDir::new().expect("should create TempDir");
    let real = write_pdf(temp_dir.path(), "real.pdf", &["text"]);
    let fake = temp_dir.path().join("fake.pdf");
    fs::write(&fake, b"PK\x03\x04 not a pdf").expect("should write file");
    let short = temp_dir.path().join("short.pdf");
    fs::write(&short, b"%PD").expect("should write file");

    assert!(is_valid_pdf(&real));
    assert!(!is_valid_pdf(&fake));
    assert!(!is_valid_pdf(&short));
    assert!(!is_valid_pdf(&temp_dir.path().join("missing.pdf")));
}

#[test]
fn docx_archive_check() {
    let temp_dir = TempDir::new().expect("should create TempDir");
    let real = write_docx(temp_dir.path(), "real.docx", &word_body(&["hello"]));
    let fake = temp_dir.path().join("fake.docx");
    fs::write(&fake, b"%PDF-1.4 definitely not a zip").expect("should write file");

    assert!(is_valid_docx(&real));
    assert!(!is_valid_docx(&fake));
}

#[test]
fn invalid_files_are_excluded_from_listing() {
    let temp_dir = TempDir::new().expect("should create TempDir");
    let dir = temp_dir.path();
    write_docx(dir, "b.docx", &word_body(&["second"]));
    write_docx(dir, "a.docx", &word_body(&["first"]));
    write_pdf(dir, "z.pdf", &["last"]);
    fs::write(dir.join("garbage.pdf"), b"\x00\x01\x02 random bytes").expect("should write");
    fs::write(dir.join("garbage.docx"), b"random bytes").expect("should write");
    fs::write(dir.join("notes.txt"), b"ignored").expect("should write");

    let store = DocumentStore::new(dir);
    let (word, pdf) = store.get_doc_paths().expect("should list documents");

    assert_eq!(word, vec![dir.join("a.docx"), dir.join("b.docx")]);
    assert_eq!(pdf, vec![dir.join("z.pdf")]);
    assert_eq!(
        store.get_all_doc_paths().expect("should list documents"),
        vec![dir.join("a.docx"), dir.join("b.docx"), dir.join("z.pdf")]
    );
}

#[test]
fn missing_directory_lists_nothing() {
    let temp_dir = TempDir::new().expect("should create TempDir");
    let store = DocumentStore::new(temp_dir.path().join("does-not-exist"));

    assert!(
        store
            .get_all_doc_paths()
            .expect("should list documents")
            .is_empty()
    );
}

#[test]
fn add_copies_valid_documents() {
    let source_dir = TempDir::new().expect("should create TempDir");
    let store_dir = TempDir::new().expect("should create TempDir");
    let source = write_pdf(source_dir.path(), "upload.pdf", &["uploaded"]);

    let store = DocumentStore::new(store_dir.path().join("data"));
    let stored = store.add(&source).expect("should add document");

    assert_eq!(stored, store_dir.path().join("data").join("upload.pdf"));
    assert!(stored.exists());
    assert_eq!(
        store.get_all_doc_paths().expect("should list documents"),
        vec![stored]
    );
}

#[test]
fn add_rejects_invalid_documents() {
    let temp_dir = TempDir::new().expect("should create TempDir");
    let fake = temp_dir.path().join("fake.pdf");
    fs::write(&fake, b"nope").expect("should write");
    let text = temp_dir.path().join("notes.txt");
    fs::write(&text, b"nope").expect("should write");

    let store = DocumentStore::new(temp_dir.path().join("data"));
    assert!(matches!(store.add(&fake), Err(DocuError::Validation(_))));
    assert!(matches!(store.add(&text), Err(DocuError::Validation(_))));
}

#[test]
fn remove_deletes_only_stored_documents() {
    let temp_dir = TempDir::new().expect("should create TempDir");
    let dir = temp_dir.path().join("data");
    fs::create_dir_all(&dir).expect("should create dir");
    write_pdf(&dir, "keep.pdf", &["keep"]);
    write_pdf(&dir, "drop.pdf", &["drop"]);
    fs::write(temp_dir.path().join("outside.pdf"), b"%PDF-").expect("should write");

    let store = DocumentStore::new(&dir);
    store.remove("drop.pdf").expect("should remove");

    assert!(!dir.join("drop.pdf").exists());
    assert!(dir.join("keep.pdf").exists());
    assert!(store.remove("drop.pdf").is_err());
    assert!(store.remove("../outside.pdf").is_err());
    assert!(temp_dir.path().join("outside.pdf").exists());
}
