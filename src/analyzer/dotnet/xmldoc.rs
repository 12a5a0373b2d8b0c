//! Compiler-generated XML documentation lookup.
//!
//! The documentation artifact is derived from the binary's own path
//! (`Foo.dll` → `Foo.xml`). A missing file simply omits documentation; a
//! malformed one degrades to absent text plus a diagnostic.
//!
//! Member ids are matched by *prefix* (`M:Declaring.Member`), not by full
//! signature: when several overloads share a name the resolver may attach
//! the wrong overload's text. Known, carried-over limitation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::warn;

/// Per-request resolver; each doc file is loaded at most once.
#[derive(Default)]
pub struct XmlDocResolver {
    cache: HashMap<PathBuf, Option<Vec<(String, String)>>>,
}

impl XmlDocResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Documentation text for the first member id starting with
    /// `id_prefix`, plus an optional degraded-condition diagnostic.
    pub fn lookup(
        &mut self,
        assembly_path: &Path,
        id_prefix: &str,
    ) -> (Option<String>, Option<String>) {
        if assembly_path.file_name().is_none() {
            return (None, None);
        }
        let doc_path = assembly_path.with_extension("xml");
        if !self.cache.contains_key(&doc_path) {
            let (entries, diagnostic) = load_doc_file(&doc_path);
            self.cache.insert(doc_path.clone(), entries);
            if let Some(diagnostic) = diagnostic {
                return (self.find(&doc_path, id_prefix), Some(diagnostic));
            }
        }
        (self.find(&doc_path, id_prefix), None)
    }

    fn find(&self, doc_path: &Path, id_prefix: &str) -> Option<String> {
        let entries = self.cache.get(doc_path)?.as_ref()?;
        entries
            .iter()
            .find(|(id, _)| id.starts_with(id_prefix))
            .map(|(_, text)| text.clone())
    }
}

fn load_doc_file(path: &Path) -> (Option<Vec<(String, String)>>, Option<String>) {
    if !path.exists() {
        // Absent documentation is not an error.
        return (None, None);
    }
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "documentation artifact unreadable");
            return (
                None,
                Some(format!("documentation unreadable '{}': {e}", path.display())),
            );
        }
    };
    match parse_members(&content) {
        Ok(members) => (Some(members), None),
        Err(reason) => {
            warn!(path = %path.display(), reason, "documentation artifact malformed");
            (
                None,
                Some(format!("documentation malformed '{}': {reason}", path.display())),
            )
        }
    }
}

/// Extract `(id, text)` pairs from `<member name="...">` elements.
pub fn parse_members(content: &str) -> Result<Vec<(String, String)>, String> {
    let mut reader = Reader::from_str(content);
    let mut members = Vec::new();
    let mut current: Option<(String, String)> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"member" => {
                let name = e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.local_name().as_ref() == b"name")
                    .map(|a| String::from_utf8_lossy(&a.value).into_owned());
                if let Some(name) = name {
                    current = Some((name, String::new()));
                }
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"member" => {
                if let Some((id, text)) = current.take() {
                    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
                    members.push((id, normalized));
                }
            }
            Ok(Event::Text(t)) => {
                if let Some((_, text)) = current.as_mut() {
                    let piece = t
                        .unescape()
                        .map(|c| c.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(t.as_ref()).into_owned());
                    text.push(' ');
                    text.push_str(&piece);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
    }
    Ok(members)
}
