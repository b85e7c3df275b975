use crate::Graph;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use stemma_data::{NodeId, Options};
use tracing::debug;

/// One ranked search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: NodeId,
    /// Value of the configured display field, the result caption
    pub display_name: String,
    pub score: f64,
    pub matched_field: String,
    /// Byte ranges of the query occurrences within the matched field's
    /// original text, for highlighting
    pub matched_spans: Vec<(usize, usize)>,
    /// Values of the requested return fields, where indexed
    pub retrieved: HashMap<String, String>,
}

/// One indexed (node, field) value
#[derive(Debug, Clone)]
struct Entry {
    id: NodeId,
    /// Store insertion order, the tie-break for equal scores
    order: usize,
    field: String,
    /// Original field text; spans refer into this
    text: String,
    /// Lowercase-folded text, scanned during queries
    folded: String,
    /// Byte offset into `text` for every byte of `folded`
    offsets: Vec<usize>,
    weight: f64,
}

/// Weighted full-text index over the configured record fields
///
/// Read-only during query evaluation; rebuilt from scratch whenever the
/// store generation moves, which the facade checks before every query.
#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    entries: Vec<Entry>,
    display: HashMap<NodeId, String>,
    generation: u64,
}

impl SearchIndex {
    /// Index every configured field of every node in the graph
    pub fn build(graph: &Graph, options: &Options) -> Self {
        let mut entries = Vec::new();
        let mut display = HashMap::new();
        let display_field = options.display_field();

        for (order, node) in graph.iter().enumerate() {
            for field in &options.search_fields {
                let Some(text) = field_text(node.record.fields.get(field)) else {
                    continue;
                };
                if Some(field.as_str()) == display_field {
                    display.insert(node.id().clone(), text.clone());
                }
                let (folded, offsets) = fold(&text);
                entries.push(Entry {
                    id: node.id().clone(),
                    order,
                    field: field.clone(),
                    text,
                    folded,
                    offsets,
                    weight: options.search_weight(field),
                });
            }
        }
        debug!(entries = entries.len(), "search index built");
        Self {
            entries,
            display,
            generation: graph.generation(),
        }
    }

    /// Store generation this index was built from
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Rank nodes against a free-text query
    ///
    /// `text` may carry an `abbr:term` prefix resolving through the
    /// configured abbreviation map (or a full field name) to restrict the
    /// search to one field; `fields_in` restricts it further. Results come
    /// in descending score order, ties in store order, capped at the
    /// configured limit.
    pub fn query(
        &self,
        options: &Options,
        text: &str,
        fields_in: Option<&[String]>,
        fields_out: Option<&[String]>,
    ) -> Vec<SearchHit> {
        let (restricted, term) = resolve_abbreviation(options, text);
        let needle = fold(term.trim()).0;
        if needle.is_empty() {
            return Vec::new();
        }

        // Best-scoring entry per node
        let mut best: HashMap<NodeId, (f64, usize, &Entry)> = HashMap::new();
        for entry in &self.entries {
            if let Some(field) = restricted {
                if entry.field != field {
                    continue;
                }
            }
            if let Some(fields) = fields_in {
                if !fields.contains(&entry.field) {
                    continue;
                }
            }
            let Some(factor) = match_factor(&entry.folded, &needle) else {
                continue;
            };
            let mut score = entry.weight * factor;
            // Leading match on the caption field leans the ranking toward
            // the result the user most likely means
            if Some(entry.field.as_str()) == options.display_field()
                && entry.folded.starts_with(&needle)
            {
                score *= 1.5;
            }
            match best.get(&entry.id) {
                Some(&(top, _, _)) if top >= score => {}
                _ => {
                    best.insert(entry.id.clone(), (score, entry.order, entry));
                }
            }
        }

        let mut ranked: Vec<(f64, usize, &Entry)> = best.into_values().collect();
        ranked.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        if options.search_result_limit > 0 {
            ranked.truncate(options.search_result_limit);
        }

        ranked
            .into_iter()
            .map(|(score, order, entry)| SearchHit {
                id: entry.id.clone(),
                display_name: self.display.get(&entry.id).cloned().unwrap_or_default(),
                score,
                matched_field: entry.field.clone(),
                matched_spans: spans(entry, &needle),
                retrieved: self.retrieve(order, fields_out),
            })
            .collect()
    }

    fn retrieve(&self, order: usize, fields_out: Option<&[String]>) -> HashMap<String, String> {
        let Some(fields) = fields_out else {
            return HashMap::new();
        };
        self.entries
            .iter()
            .filter(|entry| entry.order == order && fields.contains(&entry.field))
            .map(|entry| (entry.field.clone(), entry.text.clone()))
            .collect()
    }
}

/// Resolve a leading `abbr:` through the abbreviation map or a literal
/// field name; anything else is part of the query text
fn resolve_abbreviation<'a>(options: &'a Options, text: &'a str) -> (Option<&'a str>, &'a str) {
    if let Some((prefix, rest)) = text.split_once(':') {
        if let Some(field) = options.search_fields_abbreviation.get(prefix) {
            return (Some(field.as_str()), rest);
        }
        if options.search_fields.iter().any(|f| f == prefix) {
            return (Some(prefix), rest);
        }
    }
    (None, text)
}

/// Score factor for the best occurrence of `needle` in a folded value
fn match_factor(folded: &str, needle: &str) -> Option<f64> {
    if folded.starts_with(needle) {
        Some(2.0)
    } else {
        let index = folded.find(needle)?;
        let word_start = folded[..index]
            .chars()
            .next_back()
            .is_some_and(|c| !c.is_alphanumeric());
        Some(if word_start { 1.5 } else { 1.0 })
    }
}

/// Non-overlapping occurrences of `needle`, as byte ranges into the
/// original text
fn spans(entry: &Entry, needle: &str) -> Vec<(usize, usize)> {
    let mut found = Vec::new();
    let mut from = 0;
    while let Some(at) = entry.folded[from..].find(needle) {
        let start = from + at;
        let end = start + needle.len();
        let orig_start = entry.offsets.get(start).copied().unwrap_or(0);
        let orig_end = entry
            .offsets
            .get(end)
            .copied()
            .unwrap_or(entry.text.len());
        found.push((orig_start, orig_end));
        from = end;
    }
    found
}

/// Lowercase-fold text, mapping every folded byte back to the byte offset
/// of the original character it came from
fn fold(text: &str) -> (String, Vec<usize>) {
    let mut folded = String::with_capacity(text.len());
    let mut offsets = Vec::with_capacity(text.len());
    for (offset, ch) in text.char_indices() {
        for low in ch.to_lowercase() {
            let before = folded.len();
            folded.push(low);
            offsets.extend(std::iter::repeat(offset).take(folded.len() - before));
        }
    }
    (folded, offsets)
}

/// Field values are JSON; anything non-null renders to text
fn field_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
