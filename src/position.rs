//! Position Mapper
//!
//! Records original→generated correspondences for successful rewrites and
//! folds them into the generator's source map as token names.

use std::collections::HashMap;

use oxc_sourcemap::SourceMapBuilder;
use serde::{Deserialize, Serialize};

use crate::types::SourceLocation;

/// Byte offset → (1-based line, 0-based UTF-16 column).
#[derive(Debug, Clone)]
pub struct LineIndex<'s> {
    source: &'s str,
    line_starts: Vec<usize>,
}

impl<'s> LineIndex<'s> {
    pub fn new(source: &'s str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .char_indices()
                .filter(|(_, c)| *c == '\n')
                .map(|(i, _)| i + 1),
        );
        LineIndex {
            source,
            line_starts,
        }
    }

    pub fn location(&self, offset: u32) -> SourceLocation {
        let offset = (offset as usize).min(self.source.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(next) => next - 1,
        };
        let line_start = self.line_starts[line];
        let column = self
            .source
            .get(line_start..offset)
            .map(|prefix| prefix.encode_utf16().count())
            .unwrap_or(0);
        SourceLocation::new(line as u32 + 1, column as u32)
    }

    /// Text of the 1-based `line`, without its terminator.
    pub fn line_text(&self, line: u32) -> &'s str {
        let idx = (line.max(1) - 1) as usize;
        let Some(&start) = self.line_starts.get(idx) else {
            return "";
        };
        let end = self
            .line_starts
            .get(idx + 1)
            .map(|next| next - 1)
            .unwrap_or(self.source.len());
        self.source[start..end].trim_end_matches('\r')
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionMapping {
    pub original: SourceLocation,
    /// Coordinates in the rewritten tree. Rewrites are in place, so these
    /// equal `original` until code generation renumbers them.
    pub generated: SourceLocation,
    /// `<webConstruct>-><platformConstruct>`
    pub name: String,
}

#[derive(Debug, Default)]
pub struct PositionMapper {
    entries: Vec<PositionMapping>,
}

impl PositionMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, at: SourceLocation, web_construct: &str, platform_construct: &str) {
        self.entries.push(PositionMapping {
            original: at,
            generated: at,
            name: format!("{}->{}", web_construct, platform_construct),
        });
    }

    pub fn entries(&self) -> &[PositionMapping] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<PositionMapping> {
        self.entries
    }

    /// Re-emit the generator's tokens as a source map, attaching each recorded
    /// name to the tokens that start at its original position.
    pub fn finalize<I>(&self, tokens: I, filename: &str, source_text: &str) -> String
    where
        I: IntoIterator<Item = RawToken>,
    {
        let mut builder = SourceMapBuilder::default();
        builder.set_file(filename);
        let source_id = builder.add_source_and_content(filename, source_text);

        let mut names: HashMap<(u32, u32), u32> = HashMap::new();
        for entry in &self.entries {
            let name_id = builder.add_name(&entry.name);
            names
                .entry((entry.original.line - 1, entry.original.column))
                .or_insert(name_id);
        }

        for token in tokens {
            let name_id = if token.mapped {
                names.get(&(token.src_line, token.src_col)).copied()
            } else {
                None
            };
            builder.add_token(
                token.dst_line,
                token.dst_col,
                token.src_line,
                token.src_col,
                token.mapped.then_some(source_id),
                name_id,
            );
        }

        builder.into_sourcemap().to_json_string()
    }
}

/// One generator token, 0-based on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawToken {
    pub dst_line: u32,
    pub dst_col: u32,
    pub src_line: u32,
    pub src_col: u32,
    /// Whether the token points into the source at all.
    pub mapped: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_index_locations() {
        let index = LineIndex::new("a\nbc\n  d");
        assert_eq!(index.location(0), SourceLocation::new(1, 0));
        assert_eq!(index.location(3), SourceLocation::new(2, 1));
        assert_eq!(index.location(7), SourceLocation::new(3, 2));
        assert_eq!(index.line_text(2), "bc");
        assert_eq!(index.line_text(9), "");
    }

    #[test]
    fn test_columns_count_utf16_units() {
        // "é" is two UTF-8 bytes but one UTF-16 unit; "😀" is four and two.
        let source = "é😀x";
        let index = LineIndex::new(source);
        let x = source.find('x').unwrap() as u32;
        assert_eq!(index.location(x), SourceLocation::new(1, 3));
    }

    #[test]
    fn test_mapper_names_entries() {
        let mut mapper = PositionMapper::new();
        mapper.record(SourceLocation::new(3, 4), "DOMContentLoaded", "app.record.index.show");
        let entry = &mapper.entries()[0];
        assert_eq!(entry.name, "DOMContentLoaded->app.record.index.show");
        assert_eq!(entry.original, entry.generated);
    }

    #[test]
    fn test_finalize_attaches_names() {
        let mut mapper = PositionMapper::new();
        mapper.record(SourceLocation::new(2, 0), "/api/records", "records.get");
        let tokens = vec![
            RawToken { dst_line: 0, dst_col: 0, src_line: 0, src_col: 0, mapped: true },
            RawToken { dst_line: 1, dst_col: 0, src_line: 1, src_col: 0, mapped: true },
        ];
        let json = mapper.finalize(tokens, "app.js", "a;\nfetch('/api/records');");
        let map: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(map["file"], "app.js");
        assert_eq!(map["sources"][0], "app.js");
        assert_eq!(map["names"][0], "/api/records->records.get");
        assert!(map["mappings"].as_str().unwrap().contains(';'));

        let decoded = oxc_sourcemap::SourceMap::from_json_string(&json).unwrap();
        let named: Vec<(u32, u32)> = decoded
            .get_tokens()
            .filter(|token| token.get_name_id().is_some())
            .map(|token| (token.get_src_line(), token.get_src_col()))
            .collect();
        assert_eq!(named, vec![(1, 0)]);
    }
}
