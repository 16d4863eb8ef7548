// Deterministic stand-ins for the external services, plus a PDF builder
// Shared by the unit tests and the integration tests under tests/, so only the public API is used

use lopdf::content::{Content, Operation};
use lopdf::{Object, Stream, dictionary};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

use docu_whisperer::answering::Generator;
use docu_whisperer::embeddings::Embedder;
use docu_whisperer::sources::web::browser::{PageRenderer, RenderError, RenderedPage};

pub(crate) const DIMENSION: usize = 512;

/// Hashes lowercase word tokens into a fixed bag-of-words vector
#[derive(Debug, Default)]
pub(crate) struct KeywordEmbedder {
    model: Option<String>,
    pub(crate) fail: AtomicBool,
    pub(crate) calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub(crate) fn with_model(model: &str) -> Self {
        Self {
            model: Some(model.to_string()),
            ..Self::default()
        }
    }

    pub(crate) fn failing() -> Self {
        let embedder = Self::default();
        embedder.fail.store(true, Ordering::SeqCst);
        embedder
    }

    pub(crate) fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; DIMENSION];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = token
                .to_lowercase()
                .bytes()
                .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| {
                    (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
                });
            let slot = (hash % DIMENSION as u64) as usize;
            vector[slot] += 1.0;
        }
        vector
    }
}

impl Embedder for KeywordEmbedder {
    fn embed_documents(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("embedding service unavailable (HTTP 503)");
        }
        Ok(texts.iter().map(|text| Self::vector(text)).collect())
    }

    fn model_name(&self) -> &str {
        self.model.as_deref().unwrap_or("keyword-test")
    }
}

const DEFAULT_ANSWER: &str = "Answer based on the provided context.";

/// Answers with a fixed text and records every prompt it receives
#[derive(Debug, Default)]
pub(crate) struct EchoGenerator {
    answer: Option<String>,
    pub(crate) fail: AtomicBool,
    pub(crate) prompts: Mutex<Vec<String>>,
}

impl EchoGenerator {
    pub(crate) fn replying(answer: &str) -> Self {
        Self {
            answer: Some(answer.to_string()),
            ..Self::default()
        }
    }

    pub(crate) fn failing() -> Self {
        let generator = Self::default();
        generator.fail.store(true, Ordering::SeqCst);
        generator
    }

    pub(crate) fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().ok()?.last().cloned()
    }
}

impl Generator for EchoGenerator {
    fn generate(&self, system: &str, user: &str) -> anyhow::Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(format!("{system}\n---\n{user}"));
        }
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("generation service unavailable (HTTP 500)");
        }
        Ok(self.answer.as_deref().unwrap_or(DEFAULT_ANSWER).to_string())
    }
}

/// What a fake page does when asked for its HTML
#[derive(Debug, Clone)]
pub(crate) enum FakeOutcome {
    Html(String),
    OpenTimeout,
    ExtractCrash,
}

/// Renderer that counts live pages so tests can check the browser was released
#[derive(Debug, Clone)]
pub(crate) struct FakeRenderer {
    outcome: FakeOutcome,
    pub(crate) live_pages: Arc<AtomicUsize>,
    pub(crate) opened: Arc<AtomicUsize>,
}

impl FakeRenderer {
    pub(crate) fn new(outcome: FakeOutcome) -> Self {
        Self {
            outcome,
            live_pages: Arc::new(AtomicUsize::new(0)),
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn serving(body_text: &str) -> Self {
        Self::new(FakeOutcome::Html(format!(
            "<html><body><p>{body_text}</p></body></html>"
        )))
    }

    pub(crate) fn live(&self) -> usize {
        self.live_pages.load(Ordering::SeqCst)
    }

    pub(crate) fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl PageRenderer for FakeRenderer {
    fn open(&self, url: &Url) -> Result<Box<dyn RenderedPage>, RenderError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        // A browser is launched before the timeout is detected
        self.live_pages.fetch_add(1, Ordering::SeqCst);
        let page = FakePage {
            url: url.clone(),
            outcome: self.outcome.clone(),
            live_pages: Arc::clone(&self.live_pages),
        };

        if matches!(self.outcome, FakeOutcome::OpenTimeout) {
            return Err(RenderError::Timeout {
                url: url.to_string(),
                seconds: 20,
            });
        }
        Ok(Box::new(page))
    }
}

struct FakePage {
    url: Url,
    outcome: FakeOutcome,
    live_pages: Arc<AtomicUsize>,
}

impl RenderedPage for FakePage {
    fn url(&self) -> &Url {
        &self.url
    }

    fn html(&self) -> Result<String, RenderError> {
        match &self.outcome {
            FakeOutcome::Html(html) => Ok(html.clone()),
            FakeOutcome::OpenTimeout | FakeOutcome::ExtractCrash => {
                Err(RenderError::Crash("renderer process exited".to_string()))
            }
        }
    }
}

impl Drop for FakePage {
    fn drop(&mut self) {
        self.live_pages.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Write a PDF with one line of text per page; an empty string makes a blank page
pub(crate) fn write_pdf(dir: &Path, name: &str, pages: &[&str]) -> PathBuf {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let mut operations = Vec::new();
        if !text.is_empty() {
            operations.extend([
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ]);
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("should encode page content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        kids.push(page_id.into());
    }

    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => pages.len() as i64,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let path = dir.join(name);
    doc.save(&path).expect("should save pdf");
    path
}
