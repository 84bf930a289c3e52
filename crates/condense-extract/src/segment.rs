//! Sentence and content-word segmentation
//!
//! A language-aware segmenter can be plugged in as the primary; the regex
//! segmenter is always available underneath it and never fails.

use crate::error::SegmentError;
use condense_telemetry::is_cjk;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;

/// CJK share of word-forming characters above which text counts as CJK
const CJK_RATIO_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Cjk,
    Other,
}

impl Language {
    /// Separator used to rejoin sentences of this language
    pub fn joiner(self) -> &'static str {
        match self {
            Language::Cjk => "",
            Language::Other => " ",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segmentation {
    pub language: Language,
    pub sentences: Vec<String>,
    pub words: Vec<String>,
}

pub trait Segmenter: Send + Sync {
    fn name(&self) -> &str;

    fn init(&mut self) -> Result<(), SegmentError> {
        Ok(())
    }

    fn shutdown(&mut self) {}

    fn segment(&self, text: &str) -> Result<Segmentation, SegmentError>;
}

pub fn detect_language(text: &str) -> Language {
    let mut cjk = 0usize;
    let mut word_forming = 0usize;
    for c in text.chars() {
        if is_cjk(c) {
            cjk += 1;
            word_forming += 1;
        } else if c.is_alphanumeric() || c == '_' {
            word_forming += 1;
        }
    }
    if word_forming > 0 && cjk as f64 / word_forming as f64 > CJK_RATIO_THRESHOLD {
        Language::Cjk
    } else {
        Language::Other
    }
}

static CJK_TERMINATOR_RE: OnceLock<Regex> = OnceLock::new();
static TERMINATOR_RE: OnceLock<Regex> = OnceLock::new();
static WORD_RE: OnceLock<Regex> = OnceLock::new();

/// Split text into trimmed, non-empty sentences. Terminators stay attached.
pub fn split_sentences(text: &str, language: Language) -> Vec<String> {
    let re = match language {
        Language::Cjk => CJK_TERMINATOR_RE.get_or_init(|| Regex::new(r"[。！？；]+").unwrap()),
        Language::Other => TERMINATOR_RE.get_or_init(|| Regex::new(r"[.!?;]+(?:\s|$)").unwrap()),
    };

    let mut sentences = Vec::new();
    for line in text.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut start = 0;
        for m in re.find_iter(&line) {
            push_sentence(&mut sentences, &line[start..m.end()]);
            start = m.end();
        }
        push_sentence(&mut sentences, &line[start..]);
    }
    sentences
}

fn push_sentence(sentences: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
}

/// Lowercased terms of at least two characters. CJK runs become character
/// bigrams since they carry no word boundaries.
pub fn terms(text: &str) -> Vec<String> {
    let re = WORD_RE.get_or_init(|| Regex::new(r"\w+").unwrap());
    let mut out = Vec::new();
    for m in re.find_iter(text) {
        let token = m.as_str().to_lowercase();
        let mut run = String::new();
        let mut run_is_cjk = false;
        for c in token.chars() {
            let c_is_cjk = is_cjk(c);
            if !run.is_empty() && c_is_cjk != run_is_cjk {
                flush_run(&mut out, &run, run_is_cjk);
                run.clear();
            }
            run_is_cjk = c_is_cjk;
            run.push(c);
        }
        flush_run(&mut out, &run, run_is_cjk);
    }
    out
}

fn flush_run(out: &mut Vec<String>, run: &str, cjk: bool) {
    let chars: Vec<char> = run.chars().collect();
    if chars.len() < 2 {
        return;
    }
    if cjk {
        out.extend(chars.windows(2).map(|pair| pair.iter().collect::<String>()));
    } else {
        out.push(run.to_string());
    }
}

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself",
    "him", "himself", "his", "how", "if", "in", "into", "is", "it", "its", "itself", "just", "me",
    "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once", "only",
    "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she", "should", "so",
    "some", "such", "than", "that", "the", "their", "theirs", "them", "themselves", "then",
    "there", "these", "they", "this", "those", "through", "to", "too", "under", "until", "up",
    "very", "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why",
    "will", "with", "would", "you", "your", "yours", "yourself", "yourselves",
];

const CHINESE_STOP_WORDS: &[&str] = &[
    "我们", "你们", "他们", "她们", "它们", "这个", "那个", "这些", "那些", "一个", "一些", "没有",
    "什么", "怎么", "为什么", "因为", "所以", "但是", "如果", "而且", "或者", "然后", "已经", "可以",
    "就是", "还是", "不是", "这样", "那样", "自己", "之后", "之前", "的话", "以及", "并且",
];

static STOP_WORDS: OnceLock<HashSet<&'static str>> = OnceLock::new();

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS
        .get_or_init(|| {
            ENGLISH_STOP_WORDS
                .iter()
                .chain(CHINESE_STOP_WORDS)
                .copied()
                .collect()
        })
        .contains(word)
}

/// Terms with stop words removed
pub fn content_words(text: &str) -> Vec<String> {
    terms(text).into_iter().filter(|w| !is_stop_word(w)).collect()
}

/// Punctuation-based segmenter
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexSegmenter;

impl Segmenter for RegexSegmenter {
    fn name(&self) -> &str {
        "regex"
    }

    fn segment(&self, text: &str) -> Result<Segmentation, SegmentError> {
        let language = detect_language(text);
        Ok(Segmentation {
            language,
            sentences: split_sentences(text, language),
            words: content_words(text),
        })
    }
}

/// Segmentation with an optional primary segmenter and a regex fallback
pub struct SegmentationService {
    primary: Option<Box<dyn Segmenter>>,
    primary_ready: bool,
    fallback: RegexSegmenter,
}

impl SegmentationService {
    /// Regex segmentation only
    pub fn new() -> Self {
        Self {
            primary: None,
            primary_ready: false,
            fallback: RegexSegmenter,
        }
    }

    pub fn with_primary(primary: Box<dyn Segmenter>) -> Self {
        Self {
            primary: Some(primary),
            primary_ready: false,
            fallback: RegexSegmenter,
        }
    }

    /// Bring up the primary segmenter. On failure the primary is dropped and
    /// the service keeps working on the regex fallback.
    pub fn init(&mut self) -> Result<(), SegmentError> {
        let Some(primary) = self.primary.as_mut() else {
            return Ok(());
        };
        match primary.init() {
            Ok(()) => {
                tracing::debug!(segmenter = primary.name(), "segmenter initialized");
                self.primary_ready = true;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "primary segmenter unavailable, using regex fallback");
                self.primary = None;
                self.primary_ready = false;
                Err(err)
            }
        }
    }

    pub fn shutdown(&mut self) {
        if let Some(primary) = self.primary.as_mut() {
            primary.shutdown();
        }
        self.primary_ready = false;
    }

    /// Whether segmentation currently goes through the primary segmenter
    pub fn has_primary(&self) -> bool {
        self.primary_ready && self.primary.is_some()
    }

    /// Segment text. Never fails; worst case the whole trimmed input is one
    /// sentence.
    pub fn segment(&self, text: &str) -> Segmentation {
        if let Some(primary) = self.primary.as_ref().filter(|_| self.primary_ready) {
            match primary.segment(text) {
                Ok(seg) if !seg.sentences.is_empty() => return seg,
                Ok(_) => tracing::debug!(segmenter = primary.name(), "empty segmentation, falling back"),
                Err(err) => tracing::warn!(error = %err, "segmenter failed, falling back to regex"),
            }
        }

        match self.fallback.segment(text) {
            Ok(seg) if !seg.sentences.is_empty() || text.trim().is_empty() => seg,
            _ => Segmentation {
                language: detect_language(text),
                sentences: vec![text.trim().to_string()],
                words: content_words(text),
            },
        }
    }
}

impl Default for SegmentationService {
    fn default() -> Self {
        Self::new()
    }
}
