//! `<context>` markup: rendering, strict parsing and pattern-based recovery
//!
//! All mutation happens on [`ContextDocument`]; this module only converts
//! between the tree and its text form. Every text-bearing element is written
//! on a single line with embedded line breaks encoded as character
//! references, so each rendered line is a complete element and a rendered
//! document re-parses to the same tree. Hand-written multi-line bodies are
//! dedented on parse.

use crate::error::ParseError;
use crate::types::{
    parse_timestamp, AgentRecord, BackgroundEntry, BackgroundFields, ContextDocument, HistoryEntry,
    PlanIteration, Role, SectionKind,
};
use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use std::sync::OnceLock;

pub const DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;
const INDENT: &str = "  ";

/// How a document was obtained from text
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    /// Well-formed markup
    Clean,
    /// Malformed markup; sections recovered by pattern extraction
    Recovered,
}

// --- Rendering ---

/// Render a document to the wire format
pub fn render(doc: &ContextDocument) -> String {
    let mut out = String::new();
    out.push_str(DECLARATION);
    out.push('\n');
    out.push_str("<context>\n");
    for kind in SectionKind::ALL {
        render_section(&mut out, doc, kind);
    }
    out.push_str("</context>\n");
    out
}

/// Render history entries as a bare `<entry>` list (no section wrapper)
pub fn render_history(entries: &[HistoryEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        write_history_entry(&mut out, 0, entry);
    }
    out
}

fn render_section(out: &mut String, doc: &ContextDocument, kind: SectionKind) {
    let tag = kind.tag();
    push_indent(out, 1);
    if doc.section_len(kind) == 0 {
        out.push_str(&format!("<{tag}></{tag}>\n"));
        return;
    }
    out.push_str(&format!("<{tag}>\n"));

    match kind {
        SectionKind::Background => {
            for entry in &doc.background {
                write_background(out, 2, entry);
            }
        }
        SectionKind::Plan => {
            for iteration in &doc.plan {
                write_plan_iteration(out, 2, iteration);
            }
        }
        SectionKind::SubApp => {
            for agent in &doc.sub_app {
                write_agent(out, 2, agent);
            }
        }
        SectionKind::History => {
            for entry in &doc.history {
                write_history_entry(out, 2, entry);
            }
        }
    }

    push_indent(out, 1);
    out.push_str(&format!("</{tag}>\n"));
}

fn write_background(out: &mut String, depth: usize, entry: &BackgroundEntry) {
    match entry {
        BackgroundEntry::Structured { fields, timestamp } => {
            let ts = timestamp.map(format_timestamp);
            let mut attrs = Vec::new();
            if let Some(ts) = ts.as_deref() {
                attrs.push(("timestamp", ts));
            }
            push_indent(out, depth);
            out.push_str(&open_tag("content", &attrs));
            out.push('\n');
            for (name, value) in fields.iter() {
                if let Some(value) = value {
                    write_text_element(out, depth + 1, name, &[], value);
                }
            }
            push_indent(out, depth);
            out.push_str("</content>\n");
        }
        BackgroundEntry::Raw {
            role,
            text,
            timestamp,
        } => {
            let ts = timestamp.map(format_timestamp);
            let mut attrs = vec![("role", role.as_str())];
            if let Some(ts) = ts.as_deref() {
                attrs.push(("timestamp", ts));
            }
            write_text_element(out, depth, "content", &attrs, text);
        }
    }
}

fn write_plan_iteration(out: &mut String, depth: usize, iteration: &PlanIteration) {
    let number = iteration.number.to_string();
    let ts = iteration.timestamp.map(format_timestamp);
    let mut attrs = vec![("number", number.as_str()), ("role", iteration.role.as_str())];
    if let Some(ts) = ts.as_deref() {
        attrs.push(("timestamp", ts));
    }

    push_indent(out, depth);
    out.push_str(&open_tag("plan_iteration", &attrs));
    out.push('\n');

    push_indent(out, depth + 1);
    if iteration.steps.is_empty() {
        out.push_str("<steps></steps>\n");
    } else {
        out.push_str("<steps>\n");
        for step in &iteration.steps {
            push_indent(out, depth + 2);
            out.push_str(&format!("<step>{}</step>\n", escape_body(step.trim())));
        }
        push_indent(out, depth + 1);
        out.push_str("</steps>\n");
    }

    push_indent(out, depth);
    out.push_str("</plan_iteration>\n");

    if let Some(call_ask) = &iteration.call_ask {
        write_text_element(out, depth, "call_ask", &[], call_ask);
    }
}

fn write_agent(out: &mut String, depth: usize, agent: &AgentRecord) {
    let ts = agent.timestamp.map(format_timestamp);
    let mut attrs = vec![("name", agent.name.as_str())];
    if let Some(ts) = ts.as_deref() {
        attrs.push(("timestamp", ts));
    }
    push_indent(out, depth);
    out.push_str(&open_tag("agent", &attrs));
    out.push('\n');
    write_text_element(out, depth + 1, "content", &[], &agent.content);
    push_indent(out, depth);
    out.push_str("</agent>\n");
}

fn write_history_entry(out: &mut String, depth: usize, entry: &HistoryEntry) {
    let ts = entry.timestamp.map(format_timestamp);
    let mut attrs = vec![("role", entry.role.as_str())];
    if let Some(ts) = ts.as_deref() {
        attrs.push(("timestamp", ts));
    }
    write_text_element(out, depth, "entry", &attrs, &entry.message);
}

/// `<name attrs>body</name>` on one line; line breaks in the body become `&#10;`
fn write_text_element(out: &mut String, depth: usize, name: &str, attrs: &[(&str, &str)], text: &str) {
    push_indent(out, depth);
    out.push_str(&open_tag(name, attrs));
    out.push_str(&escape_body(text.trim()));
    out.push_str(&format!("</{name}>\n"));
}

fn open_tag(name: &str, attrs: &[(&str, &str)]) -> String {
    let mut tag = format!("<{name}");
    for (key, value) in attrs {
        tag.push_str(&format!(" {}=\"{}\"", key, escape_attr(value)));
    }
    tag.push('>');
    tag
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Element text with line breaks encoded, so the element stays on one line
fn escape_body(text: &str) -> String {
    escape_text(text).replace('\r', "&#13;").replace('\n', "&#10;")
}

fn escape_attr(text: &str) -> String {
    escape_text(text).replace('"', "&quot;")
}

/// Decode the five predefined entities and numeric character references
pub fn unescape(raw: &str) -> Result<String, ParseError> {
    if !raw.contains('&') {
        return Ok(raw.to_string());
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let semi = after
            .find(';')
            .ok_or_else(|| ParseError::BadEntity(after.chars().take(10).collect()))?;
        let entity = &after[..semi];
        let decoded = match entity {
            "amp" => '&',
            "lt" => '<',
            "gt" => '>',
            "quot" => '"',
            "apos" => '\'',
            _ => {
                let code = if let Some(hex) = entity.strip_prefix("#x").or(entity.strip_prefix("#X")) {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse::<u32>().ok()
                } else {
                    None
                };
                code.and_then(char::from_u32)
                    .ok_or_else(|| ParseError::BadEntity(entity.to_string()))?
            }
        };
        out.push(decoded);
        rest = &after[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn unescape_lossy(raw: &str) -> String {
    unescape(raw).unwrap_or_else(|_| raw.to_string())
}

/// Strip surrounding blank lines and the common indentation of body lines.
///
/// A first line that directly follows the opening tag is trimmed on its own
/// and does not take part in the indentation computation.
pub fn dedent(raw: &str) -> String {
    let lines: Vec<&str> = raw.lines().collect();
    let inline_first = lines
        .first()
        .map(|l| !l.trim().is_empty() && !raw.starts_with(char::is_whitespace))
        .unwrap_or(false);

    let first = match lines.iter().position(|l| !l.trim().is_empty()) {
        Some(i) => i,
        None => return String::new(),
    };
    let last = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .unwrap_or(first);

    let body_start = if inline_first { first + 1 } else { first };
    let common = lines[body_start.min(last + 1)..=last]
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);

    let mut out = Vec::with_capacity(last - first + 1);
    for (i, line) in lines[first..=last].iter().enumerate() {
        let idx = first + i;
        if idx == first && inline_first {
            out.push(line.trim().to_string());
        } else if line.trim().is_empty() {
            out.push(String::new());
        } else {
            out.push(line[common..].trim_end().to_string());
        }
    }
    out.join("\n")
}

/// Element body as stored: dedented while still escaped, so encoded line
/// breaks survive, then decoded
fn body_text(raw: &str) -> String {
    unescape_lossy(&dedent(raw))
}

// --- Strict parsing ---

#[derive(Debug, Clone)]
enum Node {
    Element(Element),
    /// Character data, still escaped
    Text(String),
}

#[derive(Debug, Clone)]
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    /// Concatenated text of this element and all descendants
    fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) => e.collect_text(out),
            }
        }
    }
}

struct Reader<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(src: &'a str) -> Self {
        let pos = if src.starts_with('\u{feff}') { '\u{feff}'.len_utf8() } else { 0 };
        Self { src, pos }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn eof(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn expect(&mut self, s: &'static str) -> Result<(), ParseError> {
        if self.starts_with(s) {
            self.pos += s.len();
            Ok(())
        } else if self.eof() {
            Err(ParseError::UnexpectedEof(s))
        } else {
            Err(ParseError::Unexpected {
                pos: self.pos,
                expected: s,
            })
        }
    }

    /// Advance past the next occurrence of `end`
    fn skip_past(&mut self, end: &'static str) -> Result<&'a str, ParseError> {
        let rest = self.rest();
        let idx = rest.find(end).ok_or(ParseError::UnexpectedEof(end))?;
        self.pos += idx + end.len();
        Ok(&rest[..idx])
    }

    /// Skip whitespace, declarations, processing instructions and comments
    fn skip_misc(&mut self) -> Result<(), ParseError> {
        loop {
            self.skip_ws();
            if self.starts_with("<?") {
                self.skip_past("?>")?;
            } else if self.starts_with("<!--") {
                self.skip_past("-->")?;
            } else if self.starts_with("<!DOCTYPE") {
                self.skip_past(">")?;
            } else {
                return Ok(());
            }
        }
    }

    fn read_name(&mut self) -> Result<&'a str, ParseError> {
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|&(i, c)| {
                let ok = if i == 0 {
                    c.is_alphabetic() || c == '_' || c == ':'
                } else {
                    c.is_alphanumeric() || matches!(c, '_' | ':' | '.' | '-')
                };
                !ok
            })
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(if self.eof() {
                ParseError::UnexpectedEof("name")
            } else {
                ParseError::Unexpected {
                    pos: self.pos,
                    expected: "name",
                }
            });
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    fn read_element(&mut self) -> Result<Element, ParseError> {
        self.expect("<")?;
        let name = self.read_name()?.to_string();
        let mut attrs = Vec::new();

        loop {
            self.skip_ws();
            if self.starts_with("/>") {
                self.pos += 2;
                return Ok(Element {
                    name,
                    attrs,
                    children: Vec::new(),
                });
            }
            if self.starts_with(">") {
                self.pos += 1;
                break;
            }
            let key = self.read_name()?.to_string();
            self.skip_ws();
            self.expect("=")?;
            self.skip_ws();
            let quote = if self.starts_with("\"") {
                "\""
            } else if self.starts_with("'") {
                "'"
            } else {
                return Err(ParseError::Unexpected {
                    pos: self.pos,
                    expected: "quoted attribute value",
                });
            };
            self.pos += 1;
            let raw = self.skip_past(quote)?;
            attrs.push((key, unescape(raw)?));
        }

        let mut children = Vec::new();
        loop {
            if self.eof() {
                return Err(ParseError::UnexpectedEof("element content"));
            }
            if self.starts_with("</") {
                self.pos += 2;
                let found = self.read_name()?;
                self.skip_ws();
                self.expect(">")?;
                if found != name {
                    return Err(ParseError::MismatchedTag {
                        expected: name,
                        found: found.to_string(),
                    });
                }
                return Ok(Element {
                    name,
                    attrs,
                    children,
                });
            } else if self.starts_with("<!--") {
                self.skip_past("-->")?;
            } else if self.starts_with("<![CDATA[") {
                self.pos += "<![CDATA[".len();
                let data = self.skip_past("]]>")?;
                children.push(Node::Text(escape_text(data)));
            } else if self.starts_with("<?") {
                self.skip_past("?>")?;
            } else if self.starts_with("<") {
                children.push(Node::Element(self.read_element()?));
            } else {
                let rest = self.rest();
                let len = rest.find('<').unwrap_or(rest.len());
                let raw = &rest[..len];
                unescape(raw)?;
                children.push(Node::Text(raw.to_string()));
                self.pos += len;
            }
        }
    }
}

/// Parse well-formed markup into a document
///
/// Missing sections are treated as empty; unknown elements are ignored.
pub fn parse(text: &str) -> Result<ContextDocument, ParseError> {
    let mut reader = Reader::new(text);
    reader.skip_misc()?;
    if reader.eof() {
        return Err(ParseError::UnexpectedEof("root element"));
    }
    let root = reader.read_element()?;
    reader.skip_misc()?;
    if !reader.eof() {
        return Err(ParseError::TrailingContent(reader.pos));
    }
    if root.name != "context" {
        return Err(ParseError::UnknownRoot(root.name));
    }

    let mut doc = ContextDocument::new();
    for section in root.elements() {
        match section.name.parse::<SectionKind>() {
            Ok(SectionKind::Background) => doc.background.extend(background_from(section)),
            Ok(SectionKind::Plan) => doc.plan.extend(plan_from(section, doc.plan.len())),
            Ok(SectionKind::SubApp) => doc
                .sub_app
                .extend(section.elements().filter(|e| e.name == "agent").map(agent_from)),
            Ok(SectionKind::History) => doc
                .history
                .extend(section.elements().filter(|e| e.name == "entry").map(history_from)),
            Err(_) => {
                tracing::debug!(element = %section.name, "ignoring unknown element under <context>")
            }
        }
    }
    Ok(doc)
}

fn timestamp_attr(element: &Element) -> Option<DateTime<Utc>> {
    element.attr("timestamp").and_then(parse_timestamp)
}

fn background_from(section: &Element) -> Vec<BackgroundEntry> {
    section
        .elements()
        .filter(|e| e.name == "content")
        .map(|content| {
            let timestamp = timestamp_attr(content);
            let has_fields = content
                .elements()
                .any(|e| BackgroundFields::NAMES.contains(&e.name.as_str()));
            if has_fields {
                let mut fields = BackgroundFields::default();
                for field in content.elements() {
                    fields.set(&field.name, body_text(&field.text()));
                }
                BackgroundEntry::Structured { fields, timestamp }
            } else {
                BackgroundEntry::Raw {
                    role: content.attr("role").unwrap_or("system").to_string(),
                    text: body_text(&content.text()),
                    timestamp,
                }
            }
        })
        .collect()
}

fn plan_from(section: &Element, existing: usize) -> Vec<PlanIteration> {
    let mut iterations: Vec<PlanIteration> = Vec::new();
    for element in section.elements() {
        match element.name.as_str() {
            "plan_iteration" => {
                let number = element
                    .attr("number")
                    .and_then(|n| n.trim().parse::<u32>().ok())
                    .unwrap_or((existing + iterations.len() + 1) as u32);
                let steps = match element.child("steps") {
                    Some(steps) => {
                        let items: Vec<String> = steps
                            .elements()
                            .filter(|e| e.name == "step")
                            .map(|e| body_text(&e.text()))
                            .collect();
                        if items.is_empty() {
                            let text = body_text(&steps.text());
                            if text.is_empty() { Vec::new() } else { vec![text] }
                        } else {
                            items
                        }
                    }
                    None => Vec::new(),
                };
                iterations.push(PlanIteration {
                    number,
                    role: element.attr("role").unwrap_or("system").to_string(),
                    steps,
                    call_ask: None,
                    timestamp: timestamp_attr(element),
                });
            }
            "call_ask" => match iterations.last_mut() {
                Some(last) => last.call_ask = Some(body_text(&element.text())),
                None => tracing::debug!("dropping <call_ask> with no preceding iteration"),
            },
            other => tracing::debug!(element = other, "ignoring unknown element under <PLAN>"),
        }
    }
    iterations
}

fn agent_from(element: &Element) -> AgentRecord {
    let content = match element.child("content") {
        Some(content) => content.text(),
        None => element.text(),
    };
    AgentRecord {
        name: element.attr("name").unwrap_or("unknown").to_string(),
        content: body_text(&content),
        timestamp: timestamp_attr(element),
    }
}

fn history_from(element: &Element) -> HistoryEntry {
    HistoryEntry {
        role: Role::from(element.attr("role").unwrap_or("system")),
        message: body_text(&element.text()),
        timestamp: timestamp_attr(element),
    }
}

// --- Pattern-based recovery ---

static SECTION_MARKER_RE: OnceLock<Regex> = OnceLock::new();
static ATTR_RE: OnceLock<Regex> = OnceLock::new();
static ENTRY_RE: OnceLock<Regex> = OnceLock::new();
static AGENT_RE: OnceLock<Regex> = OnceLock::new();
static CONTENT_RE: OnceLock<Regex> = OnceLock::new();
static PLAN_ITERATION_RE: OnceLock<Regex> = OnceLock::new();
static STEP_RE: OnceLock<Regex> = OnceLock::new();
static STEPS_RE: OnceLock<Regex> = OnceLock::new();
static CALL_ASK_RE: OnceLock<Regex> = OnceLock::new();
static FIELD_RE: OnceLock<Regex> = OnceLock::new();

fn attrs_of(raw: &str) -> Vec<(String, String)> {
    let re = ATTR_RE.get_or_init(|| Regex::new(r#"([A-Za-z_][\w.-]*)\s*=\s*"([^"]*)""#).unwrap());
    re.captures_iter(raw)
        .map(|cap| (cap[1].to_string(), unescape_lossy(&cap[2])))
        .collect()
}

fn attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
}

/// Locate each section's body. A body ends at its closing tag, at the next
/// section marker, or at end of input (truncated documents).
fn section_bodies(text: &str) -> [Option<&str>; 4] {
    let re = SECTION_MARKER_RE.get_or_init(|| {
        Regex::new(r"<(/?)(BACKGROUND|PLAN|SUB_APP|HISTORY)\s*(/?)>").unwrap()
    });
    let markers: Vec<_> = re.captures_iter(text).collect();
    let mut bodies: [Option<&str>; 4] = [None; 4];

    for (slot, kind) in SectionKind::ALL.into_iter().enumerate() {
        let open = markers
            .iter()
            .position(|cap| cap[1].is_empty() && &cap[2] == kind.tag());
        let Some(idx) = open else { continue };
        let cap = &markers[idx];
        if !cap[3].is_empty() {
            bodies[slot] = Some("");
            continue;
        }
        let start = cap.get(0).map(|m| m.end()).unwrap_or(0);
        let end = markers
            .get(idx + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(text.len());
        bodies[slot] = Some(&text[start..end]);
    }
    bodies
}

/// Recover a document from malformed or truncated markup by extracting known
/// section boundaries and complete entries. Sections that cannot be located
/// come back empty; fails only when no section marker exists at all.
pub fn parse_lenient(text: &str) -> Result<ContextDocument, ParseError> {
    let bodies = section_bodies(text);
    if bodies.iter().all(Option::is_none) {
        return Err(ParseError::NoSections);
    }

    let mut doc = ContextDocument::new();
    for (kind, body) in SectionKind::ALL.into_iter().zip(bodies) {
        let Some(body) = body else { continue };
        match kind {
            SectionKind::Background => doc.background = recover_background(body),
            SectionKind::Plan => doc.plan = recover_plan(body),
            SectionKind::SubApp => doc.sub_app = recover_agents(body),
            SectionKind::History => doc.history = recover_history(body),
        }
    }
    Ok(doc)
}

/// Strict parse, falling back to pattern recovery
pub fn parse_best_effort(text: &str) -> Result<(ContextDocument, ParseStatus), ParseError> {
    match parse(text) {
        Ok(doc) => Ok((doc, ParseStatus::Clean)),
        Err(err) => {
            tracing::warn!(error = %err, "markup is malformed, recovering sections by pattern");
            parse_lenient(text).map(|doc| (doc, ParseStatus::Recovered))
        }
    }
}

/// Project `<entry role=..>` markup (with or without a section wrapper) onto
/// history entries
pub fn parse_history_fragment(text: &str) -> Vec<HistoryEntry> {
    recover_history(text)
}

/// First `<agent>` record found in a markup fragment
pub fn parse_agent_fragment(text: &str) -> Option<AgentRecord> {
    recover_agents(text).into_iter().next()
}

fn recover_history(body: &str) -> Vec<HistoryEntry> {
    let re = ENTRY_RE.get_or_init(|| Regex::new(r"(?s)<entry\b([^>]*)>(.*?)</entry>").unwrap());
    re.captures_iter(body)
        .map(|cap| {
            let attrs = attrs_of(&cap[1]);
            HistoryEntry {
                role: Role::from(attr(&attrs, "role").unwrap_or("system")),
                message: body_text(&cap[2]),
                timestamp: attr(&attrs, "timestamp").and_then(parse_timestamp),
            }
        })
        .collect()
}

fn recover_agents(body: &str) -> Vec<AgentRecord> {
    let agent_re = AGENT_RE.get_or_init(|| Regex::new(r"(?s)<agent\b([^>]*)>(.*?)</agent>").unwrap());
    let content_re =
        CONTENT_RE.get_or_init(|| Regex::new(r"(?s)<content\b([^>]*)>(.*?)</content>").unwrap());
    agent_re
        .captures_iter(body)
        .map(|cap| {
            let attrs = attrs_of(&cap[1]);
            let inner = &cap[2];
            let content = content_re
                .captures(inner)
                .map(|c| c.get(2).map(|m| m.as_str()).unwrap_or(""))
                .unwrap_or(inner);
            AgentRecord {
                name: attr(&attrs, "name").unwrap_or("unknown").to_string(),
                content: body_text(content),
                timestamp: attr(&attrs, "timestamp").and_then(parse_timestamp),
            }
        })
        .collect()
}

fn recover_plan(body: &str) -> Vec<PlanIteration> {
    let iteration_re = PLAN_ITERATION_RE
        .get_or_init(|| Regex::new(r"(?s)<plan_iteration\b([^>]*)>(.*?)</plan_iteration>").unwrap());
    let step_re = STEP_RE.get_or_init(|| Regex::new(r"(?s)<step>(.*?)</step>").unwrap());
    let steps_re = STEPS_RE.get_or_init(|| Regex::new(r"(?s)<steps>(.*?)</steps>").unwrap());
    let call_ask_re =
        CALL_ASK_RE.get_or_init(|| Regex::new(r"(?s)<call_ask>(.*?)</call_ask>").unwrap());

    let mut iterations = Vec::new();
    let mut ends = Vec::new();
    for cap in iteration_re.captures_iter(body) {
        let attrs = attrs_of(&cap[1]);
        let inner = &cap[2];
        let mut steps: Vec<String> = step_re.captures_iter(inner).map(|s| body_text(&s[1])).collect();
        if steps.is_empty() {
            if let Some(s) = steps_re.captures(inner) {
                let text = body_text(&s[1]);
                if !text.is_empty() {
                    steps.push(text);
                }
            }
        }
        let number = attr(&attrs, "number")
            .and_then(|n| n.trim().parse::<u32>().ok())
            .unwrap_or(iterations.len() as u32 + 1);
        iterations.push(PlanIteration {
            number,
            role: attr(&attrs, "role").unwrap_or("system").to_string(),
            steps,
            call_ask: None,
            timestamp: attr(&attrs, "timestamp").and_then(parse_timestamp),
        });
        ends.push(cap.get(0).map(|m| m.end()).unwrap_or(0));
    }

    for cap in call_ask_re.captures_iter(body) {
        let start = cap.get(0).map(|m| m.start()).unwrap_or(0);
        if let Some(idx) = ends.iter().rposition(|&end| end <= start) {
            iterations[idx].call_ask = Some(body_text(&cap[1]));
        }
    }
    iterations
}

fn recover_background(body: &str) -> Vec<BackgroundEntry> {
    let content_re =
        CONTENT_RE.get_or_init(|| Regex::new(r"(?s)<content\b([^>]*)>(.*?)</content>").unwrap());
    let field_re = FIELD_RE.get_or_init(|| {
        Regex::new(
            r"(?s)<(system_prompt|task|knowledge|external_knowledge)>(.*?)</(?:system_prompt|task|knowledge|external_knowledge)>",
        )
        .unwrap()
    });

    content_re
        .captures_iter(body)
        .map(|cap| {
            let attrs = attrs_of(&cap[1]);
            let inner = &cap[2];
            let timestamp = attr(&attrs, "timestamp").and_then(parse_timestamp);
            let mut fields = BackgroundFields::default();
            let mut found = false;
            for field in field_re.captures_iter(inner) {
                found |= fields.set(&field[1], body_text(&field[2]));
            }
            if found {
                BackgroundEntry::Structured { fields, timestamp }
            } else {
                BackgroundEntry::Raw {
                    role: attr(&attrs, "role").unwrap_or("system").to_string(),
                    text: body_text(inner),
                    timestamp,
                }
            }
        })
        .collect()
}
