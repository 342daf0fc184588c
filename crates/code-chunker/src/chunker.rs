use crate::config::ChunkerConfig;
use crate::contextual_imports::{extract_imports_from_lines, filter_relevant_imports};
use crate::error::Result;
use crate::language::Language;
use crate::types::{Chunk, Symbol, SymbolKind};

/// One file handed to the chunker.
#[derive(Debug, Clone, Copy)]
pub struct SourceFile<'a> {
    pub repo_name: &'a str,
    pub file_path: &'a str,
    pub language: Language,
    pub text: &'a str,
}

/// Groups symbol boundaries into token-budgeted chunks.
///
/// Chunk bodies are contiguous, adjacent line ranges in source order, so the
/// bodies of a file's chunks concatenate back to the file text.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(ChunkerConfig::default())
    }
}

impl Chunker {
    /// Create a chunker. An invalid budget falls back to the defaults.
    pub fn new(config: ChunkerConfig) -> Self {
        if let Err(err) = config.validate() {
            log::warn!("{err}; using default chunker configuration");
            return Self {
                config: ChunkerConfig::default(),
            };
        }
        Self { config }
    }

    pub fn try_new(config: ChunkerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub const fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Deterministic, language-independent token estimate.
    #[must_use]
    pub fn estimate_tokens(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.config.chars_per_token)
    }

    /// Chunk one file given its symbols. Empty input yields no chunks.
    pub fn chunk(&self, file: &SourceFile<'_>, symbols: &[Symbol]) -> Vec<Chunk> {
        if file.text.trim().is_empty() {
            return Vec::new();
        }

        let lines = SourceLines::new(file.text);
        let tree = SymbolTree::build(symbols, lines.len());
        let mut out = ChunkSink::new(self, file, &lines);

        if tree.top.is_empty() {
            out.raw_split(1, lines.len());
            return out.finish();
        }

        let units = self.plan_units(&lines, &tree);
        let prelude_imports = self.prelude_imports(file.language, &lines, &tree);
        let mut window = Window::default();

        for unit in units {
            let unit_tokens = self.tokens_for_chars(lines.chars(unit.start, unit.end));

            if unit_tokens > self.config.max_chunk_tokens {
                out.flush(&mut window, &tree);
                match unit.symbol {
                    Some(idx) if tree.top[idx].kind.is_class_like() && !tree.children[idx].is_empty() => {
                        self.split_class(&mut out, &tree, idx, unit, &prelude_imports);
                    }
                    Some(idx) => out.single_symbol(unit.start, unit.end, &tree.top[idx]),
                    None => out.raw_split(unit.start, unit.end),
                }
                continue;
            }

            if let Some(start) = window.start {
                let merged = self.tokens_for_chars(lines.chars(start, unit.end));
                let both_substantial = unit.symbol.is_some()
                    && !window.symbols.is_empty()
                    && window.tokens >= self.config.min_chunk_tokens
                    && unit_tokens >= self.config.min_chunk_tokens;
                if merged > self.config.max_chunk_tokens || both_substantial {
                    out.flush(&mut window, &tree);
                }
            }

            window.push(unit);
            if let Some(start) = window.start {
                window.tokens = self.tokens_for_chars(lines.chars(start, unit.end));
            }
        }
        out.flush(&mut window, &tree);

        out.finish()
    }

    fn tokens_for_chars(&self, chars: usize) -> usize {
        chars.div_ceil(self.config.chars_per_token)
    }

    /// Splits the file into adjacent units: one unit per top-level symbol
    /// (carrying the gap text before it), loose gaps that could not ride
    /// along, and trailing text.
    fn plan_units(&self, lines: &SourceLines<'_>, tree: &SymbolTree) -> Vec<Unit> {
        let mut units = Vec::with_capacity(tree.top.len() + 2);
        let mut cursor = 1;

        for (idx, sym) in tree.top.iter().enumerate() {
            if sym.start_line > cursor {
                let gap_tokens = self.tokens_for_chars(lines.chars(cursor, sym.start_line - 1));
                let with_gap = self.tokens_for_chars(lines.chars(cursor, sym.end_line));
                let own = self.tokens_for_chars(lines.chars(sym.start_line, sym.end_line));
                // Gap text, the prelude included, rides with the following
                // symbol unless it is oversized on its own or would push an
                // in-budget symbol over the bound.
                let keep_gap_with_symbol = gap_tokens <= self.config.max_chunk_tokens
                    && (with_gap <= self.config.max_chunk_tokens || own > self.config.max_chunk_tokens);

                if keep_gap_with_symbol {
                    units.push(Unit::symbol(cursor, sym.end_line, idx));
                    cursor = sym.end_line + 1;
                    continue;
                }
                units.push(Unit::loose(cursor, sym.start_line - 1));
            }
            units.push(Unit::symbol(sym.start_line, sym.end_line, idx));
            cursor = sym.end_line + 1;
        }

        if cursor <= lines.len() {
            units.push(Unit::loose(cursor, lines.len()));
        }
        units
    }

    fn prelude_imports(&self, language: Language, lines: &SourceLines<'_>, tree: &SymbolTree) -> Vec<String> {
        if !self.config.include_imports {
            return Vec::new();
        }
        let Some(first) = tree.top.first() else {
            return Vec::new();
        };
        let prelude: Vec<&str> = (1..first.start_line).map(|n| lines.line(n)).collect();
        extract_imports_from_lines(language, &prelude, usize::MAX)
    }

    /// Splits an oversized class-like symbol by its direct children: a header
    /// chunk, then method chunks carrying the duplicated class header.
    fn split_class(
        &self,
        out: &mut ChunkSink<'_, '_>,
        tree: &SymbolTree,
        idx: usize,
        unit: Unit,
        prelude_imports: &[String],
    ) {
        let class = &tree.top[idx];
        let children = &tree.children[idx];
        let lines = out.lines;
        let first_child_start = children[0].start_line;

        // Header: everything before the first method, prelude included.
        if first_child_start > unit.start {
            out.single_symbol(unit.start, first_child_start - 1, class);
        }

        let header_context = self.class_context(lines, class, first_child_start);
        let mut cursor = first_child_start;
        let mut group: Vec<(usize, usize, &Symbol)> = Vec::new();
        let mut group_context: Option<String> = None;

        for (pos, child) in children.iter().enumerate() {
            let start = cursor;
            let end = if pos + 1 == children.len() {
                unit.end
            } else {
                child.end_line
            };
            if end < start {
                continue;
            }
            cursor = end + 1;

            let body_chars = lines.chars(start, end);
            let body_tokens = self.tokens_for_chars(body_chars);
            let context = self.method_context(
                out.file.language,
                &header_context,
                prelude_imports,
                &lines.text(start, end),
            );
            let context = context.filter(|ctx| {
                body_tokens > self.config.max_chunk_tokens
                    || self.tokens_for_chars(ctx.chars().count() + body_chars)
                        <= self.config.max_chunk_tokens
            });

            if let Some(&(group_start, _, _)) = group.first() {
                let ctx_chars = group_context.as_ref().map_or(0, |c| c.chars().count());
                let merged = self.tokens_for_chars(ctx_chars + lines.chars(group_start, end));
                if merged > self.config.max_chunk_tokens || body_tokens > self.config.max_chunk_tokens {
                    out.method_group(&group, group_context.take(), class);
                    group.clear();
                }
            }

            if group.is_empty() {
                group_context = context;
            }
            group.push((start, end, child));

            if body_tokens > self.config.max_chunk_tokens {
                out.method_group(&group, group_context.take(), class);
                group.clear();
            }
        }

        if !group.is_empty() {
            out.method_group(&group, group_context.take(), class);
        }
    }

    /// The class declaration duplicated into method chunks. A header too large
    /// to duplicate is reduced to the declaration line.
    fn class_context(&self, lines: &SourceLines<'_>, class: &Symbol, first_child_start: usize) -> String {
        if !self.config.include_parent_context {
            return String::new();
        }
        let header_end = first_child_start.saturating_sub(1).max(class.start_line);
        let header = lines.text(class.start_line, header_end);
        if self.estimate_tokens(&header) * 3 <= self.config.max_chunk_tokens {
            header
        } else {
            lines.text(class.start_line, class.start_line)
        }
    }

    fn method_context(
        &self,
        language: Language,
        header: &str,
        prelude_imports: &[String],
        body: &str,
    ) -> Option<String> {
        let imports = filter_relevant_imports(
            language,
            prelude_imports,
            body,
            self.config.max_imports_per_chunk,
        );
        if imports.is_empty() && header.is_empty() {
            return None;
        }
        let mut context = String::new();
        for import in imports {
            context.push_str(&import);
            context.push('\n');
        }
        context.push_str(header);
        if !context.ends_with('\n') {
            context.push('\n');
        }
        Some(context)
    }
}

/// A contiguous line range, optionally owned by a top-level symbol.
#[derive(Debug, Clone, Copy)]
struct Unit {
    start: usize,
    end: usize,
    symbol: Option<usize>,
}

impl Unit {
    const fn symbol(start: usize, end: usize, idx: usize) -> Self {
        Self {
            start,
            end,
            symbol: Some(idx),
        }
    }

    const fn loose(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            symbol: None,
        }
    }
}

#[derive(Debug, Default)]
struct Window {
    start: Option<usize>,
    end: usize,
    symbols: Vec<usize>,
    tokens: usize,
}

impl Window {
    fn push(&mut self, unit: Unit) {
        if self.start.is_none() {
            self.start = Some(unit.start);
        }
        self.end = unit.end;
        if let Some(idx) = unit.symbol {
            self.symbols.push(idx);
        }
    }
}

/// Top-level symbols in source order with their direct children.
struct SymbolTree {
    top: Vec<Symbol>,
    children: Vec<Vec<Symbol>>,
}

impl SymbolTree {
    fn build(symbols: &[Symbol], line_count: usize) -> Self {
        let mut sorted: Vec<Symbol> = symbols
            .iter()
            .filter(|s| s.start_line >= 1 && s.start_line <= line_count)
            .map(|s| {
                let mut s = s.clone();
                s.end_line = s.end_line.clamp(s.start_line, line_count);
                s
            })
            .collect();
        // Stable: equal ranges keep parser order.
        sorted.sort_by(|a, b| {
            a.start_line
                .cmp(&b.start_line)
                .then(b.end_line.cmp(&a.end_line))
        });
        sorted.dedup_by(|b, a| a.start_line == b.start_line && a.end_line == b.end_line && a.name == b.name);

        let mut top: Vec<Symbol> = Vec::new();
        let mut children: Vec<Vec<Symbol>> = Vec::new();

        for mut sym in sorted {
            if let (Some(last), Some(kids)) = (top.last(), children.last_mut()) {
                if last.contains(&sym) {
                    // Direct children only: skip symbols nested in a sibling.
                    if !kids.iter().any(|k: &Symbol| k.contains(&sym)) {
                        kids.push(sym);
                    }
                    continue;
                }
                if sym.start_line <= last.end_line {
                    // Partial overlap: keep the part after the previous symbol.
                    sym.start_line = last.end_line + 1;
                    if sym.start_line > sym.end_line {
                        continue;
                    }
                }
            }
            top.push(sym);
            children.push(Vec::new());
        }

        Self { top, children }
    }
}

/// Line-addressable view of the file (1-based, inclusive ranges). Lines keep
/// their terminators so ranges concatenate to the original text.
struct SourceLines<'a> {
    lines: Vec<&'a str>,
    prefix_chars: Vec<usize>,
}

impl<'a> SourceLines<'a> {
    fn new(text: &'a str) -> Self {
        let lines: Vec<&str> = text.split_inclusive('\n').collect();
        let mut prefix_chars = Vec::with_capacity(lines.len() + 1);
        prefix_chars.push(0);
        let mut total = 0;
        for line in &lines {
            total += line.chars().count();
            prefix_chars.push(total);
        }
        Self {
            lines,
            prefix_chars,
        }
    }

    fn len(&self) -> usize {
        self.lines.len()
    }

    fn line(&self, n: usize) -> &'a str {
        self.lines[n - 1]
    }

    fn chars(&self, start: usize, end: usize) -> usize {
        if start > end {
            return 0;
        }
        self.prefix_chars[end] - self.prefix_chars[start - 1]
    }

    fn text(&self, start: usize, end: usize) -> String {
        if start > end {
            return String::new();
        }
        self.lines[start - 1..end].concat()
    }
}

/// Collects chunks for one file.
struct ChunkSink<'c, 'a> {
    chunker: &'c Chunker,
    file: &'c SourceFile<'a>,
    lines: &'c SourceLines<'a>,
    chunks: Vec<Chunk>,
}

impl<'c, 'a> ChunkSink<'c, 'a> {
    fn new(chunker: &'c Chunker, file: &'c SourceFile<'a>, lines: &'c SourceLines<'a>) -> Self {
        Self {
            chunker,
            file,
            lines,
            chunks: Vec::new(),
        }
    }

    fn finish(self) -> Vec<Chunk> {
        self.chunks
    }

    fn push(
        &mut self,
        start: usize,
        end: usize,
        text: String,
        leading_context: Option<String>,
        symbols: Vec<&Symbol>,
        parent: Option<&str>,
    ) {
        let first = symbols.first();
        self.chunks.push(Chunk {
            repo_name: self.file.repo_name.to_string(),
            file_path: self.file.file_path.to_string(),
            start_line: start,
            end_line: end,
            symbol_name: first.map(|s| s.name.clone()),
            symbol_kind: first.map(|s| match (parent, s.kind) {
                (Some(_), SymbolKind::Function) => SymbolKind::Method,
                (_, kind) => kind,
            }),
            parent_symbol: parent.map(str::to_string),
            symbols: symbols.iter().map(|s| s.name.clone()).collect(),
            language: self.file.language,
            token_estimate: self.chunker.estimate_tokens(&text),
            leading_context,
            text,
        });
    }

    fn flush(&mut self, window: &mut Window, tree: &SymbolTree) {
        let Some(start) = window.start else {
            return;
        };
        let symbols: Vec<&Symbol> = window.symbols.iter().map(|&i| &tree.top[i]).collect();
        let text = self.lines.text(start, window.end);
        self.push(start, window.end, text, None, symbols, None);
        *window = Window::default();
    }

    fn single_symbol(&mut self, start: usize, end: usize, symbol: &Symbol) {
        let text = self.lines.text(start, end);
        self.push(start, end, text, None, vec![symbol], symbol.parent_symbol.as_deref());
    }

    fn method_group(&mut self, group: &[(usize, usize, &Symbol)], context: Option<String>, class: &Symbol) {
        let (Some(&(start, _, _)), Some(&(_, end, _))) = (group.first(), group.last()) else {
            return;
        };
        let body = self.lines.text(start, end);
        let text = match &context {
            Some(ctx) => format!("{ctx}{body}"),
            None => body,
        };
        let symbols = group.iter().map(|&(_, _, s)| s).collect();
        self.push(start, end, text, context, symbols, Some(&class.name));
    }

    /// Budget-only split with no symbol metadata. Lines are never cut, so a
    /// single line longer than the budget becomes its own oversized chunk and
    /// chunk identities (which key on the start line) stay unique.
    fn raw_split(&mut self, start: usize, end: usize) {
        let max_chars = self.chunker.config.max_chunk_tokens * self.chunker.config.chars_per_token;
        let mut piece_start: Option<usize> = None;

        for n in start..=end {
            if let Some(s) = piece_start {
                if self.lines.chars(s, n) > max_chars {
                    let text = self.lines.text(s, n - 1);
                    self.push(s, n - 1, text, None, Vec::new(), None);
                    piece_start = Some(n);
                }
            } else {
                piece_start = Some(n);
            }
        }

        if let Some(s) = piece_start {
            let text = self.lines.text(s, end);
            self.push(s, end, text, None, Vec::new(), None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn file<'a>(text: &'a str) -> SourceFile<'a> {
        SourceFile {
            repo_name: "repo",
            file_path: "src/lib.py",
            language: Language::Python,
            text,
        }
    }

    fn bodies(chunks: &[Chunk]) -> String {
        chunks.iter().map(Chunk::body).collect()
    }

    #[test]
    fn empty_file_yields_nothing() {
        let chunker = Chunker::default();
        assert!(chunker.chunk(&file(""), &[]).is_empty());
        assert!(chunker.chunk(&file("  \n\n"), &[]).is_empty());
    }

    #[test]
    fn token_estimate_is_ceil_of_chars() {
        let chunker = Chunker::default();
        assert_eq!(chunker.estimate_tokens(""), 0);
        assert_eq!(chunker.estimate_tokens("abcd"), 1);
        assert_eq!(chunker.estimate_tokens("abcde"), 2);
    }

    #[test]
    fn symbolless_file_splits_by_budget() {
        let text: String = (0..40).map(|i| format!("value_{i:02} = {i:04}\n")).collect();
        let chunker = Chunker::new(ChunkerConfig::bare(0, 20));
        let chunks = chunker.chunk(&file(&text), &[]);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.symbol_name.is_none()));
        assert!(chunks.iter().all(|c| c.token_estimate <= 20));
        assert_eq!(bodies(&chunks), text);
    }

    #[test]
    fn overlong_line_stays_whole() {
        let text = format!("short\n{}\nshort\n", "x".repeat(100));
        let chunker = Chunker::new(ChunkerConfig::bare(0, 10));
        let chunks = chunker.chunk(&file(&text), &[]);

        let ranges: Vec<(usize, usize)> = chunks.iter().map(|c| (c.start_line, c.end_line)).collect();
        assert_eq!(ranges, vec![(1, 1), (2, 2), (3, 3)]);
        assert_eq!(chunks[1].token_estimate, 26);
        assert_eq!(bodies(&chunks), text);
    }

    #[test]
    fn small_symbols_merge_and_prelude_attaches_to_first_chunk() {
        let text = "import os\n\ndef a():\n    return 1\n\ndef b():\n    return 2\n";
        let symbols = vec![
            Symbol::new("a", SymbolKind::Function, 3, 4),
            Symbol::new("b", SymbolKind::Function, 6, 7),
        ];
        let chunks = Chunker::default().chunk(&file(text), &symbols);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 7);
        assert_eq!(chunks[0].symbol_name.as_deref(), Some("a"));
        assert_eq!(chunks[0].symbols, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn prelude_rides_with_oversized_first_symbol() {
        let body: String = (0..30).map(|i| format!("    total += {i}  # step\n")).collect();
        let text = format!("import os\nimport sys\ndef big():\n    total = 0\n{body}    return total\n");
        let end = text.lines().count();
        let symbols = vec![Symbol::new("big", SymbolKind::Function, 3, end)];
        let chunks = Chunker::new(ChunkerConfig::bare(10, 100)).chunk(&file(&text), &symbols);

        assert_eq!(chunks.len(), 1);
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, end));
        assert_eq!(chunks[0].symbol_name.as_deref(), Some("big"));
        assert!(chunks[0].token_estimate > 100);
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn prelude_stays_alone_when_it_would_push_a_fitting_symbol_over_budget() {
        // 21 prelude chars (6 tokens) + a 396-char symbol (99 tokens).
        let text = format!("import os\nimport sys\ndef f():\n    return \"{}\"\n", "x".repeat(373));
        let symbols = vec![Symbol::new("f", SymbolKind::Function, 3, 4)];
        let chunks = Chunker::new(ChunkerConfig::bare(10, 100)).chunk(&file(&text), &symbols);

        let ranges: Vec<(usize, usize)> = chunks.iter().map(|c| (c.start_line, c.end_line)).collect();
        assert_eq!(ranges, vec![(1, 2), (3, 4)]);
        assert!(chunks[0].symbol_name.is_none());
        assert_eq!(chunks[1].symbol_name.as_deref(), Some("f"));
        assert!(chunks.iter().all(|c| c.token_estimate <= 100));
        assert_eq!(bodies(&chunks), text);
    }

    #[test]
    fn nested_symbols_are_not_top_level() {
        let symbols = vec![
            Symbol::new("User", SymbolKind::Class, 1, 10),
            Symbol::new("save", SymbolKind::Method, 3, 5).with_parent("User"),
            Symbol::new("inner", SymbolKind::Function, 4, 4),
            Symbol::new("load", SymbolKind::Method, 6, 9).with_parent("User"),
            Symbol::new("helper", SymbolKind::Function, 12, 14),
        ];
        let tree = SymbolTree::build(&symbols, 14);
        assert_eq!(tree.top.len(), 2);
        let kids: Vec<&str> = tree.children[0].iter().map(|s| s.name.as_str()).collect();
        assert_eq!(kids, vec!["save", "load"]);
    }

    #[test]
    fn out_of_range_symbols_are_clamped_or_dropped() {
        let symbols = vec![
            Symbol::new("ghost", SymbolKind::Function, 50, 60),
            Symbol::new("tail", SymbolKind::Function, 2, 99),
        ];
        let tree = SymbolTree::build(&symbols, 4);
        assert_eq!(tree.top.len(), 1);
        assert_eq!(tree.top[0].end_line, 4);
    }
}
