// src/script/unit.rs

//! Merged compilation unit built from every registered script
//!
//! The unit is a header of deduplicated `using` lines followed by each
//! script's body in registration order. Each body's position is recorded so
//! a unit line reported by the toolchain can be traced back to the script
//! and the line in that script's own text.

use super::parser::ScriptParser;

/// Where one script's body sits inside the unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentSpan {
    /// 1-based unit line of the body's first line
    pub start_line: usize,
    /// Number of body lines
    pub line_count: usize,
    /// Line index in the script where its body begins
    pub body_offset: usize,
}

impl FragmentSpan {
    fn contains(&self, unit_line: usize) -> bool {
        unit_line >= self.start_line && unit_line < self.start_line + self.line_count
    }
}

/// Source handed to the toolchain
#[derive(Debug, Clone, Default)]
pub struct CompilationUnit {
    source: String,
    imports: Vec<String>,
    spans: Vec<FragmentSpan>,
    declared_types: Vec<String>,
}

impl CompilationUnit {
    /// Merge scripts, in the given order, into one unit
    pub fn build<'a, I>(scripts: I) -> Self
    where
        I: IntoIterator<Item = &'a ScriptParser>,
    {
        let scripts: Vec<&ScriptParser> = scripts.into_iter().collect();

        let mut imports: Vec<String> = Vec::new();
        for script in &scripts {
            for import in script.imports() {
                if !imports.contains(&import) {
                    imports.push(import);
                }
            }
        }

        let mut source = String::new();
        for import in &imports {
            source.push_str("using ");
            source.push_str(import);
            source.push_str(";\n");
        }

        let mut next_line = imports.len() + 1;
        let mut spans = Vec::with_capacity(scripts.len());
        let mut declared_types = Vec::new();

        for script in &scripts {
            let body_offset = script.body_start_index();
            let line_count = script.line_count().saturating_sub(body_offset);
            source.push_str(&script.body_without_imports());

            spans.push(FragmentSpan {
                start_line: next_line,
                line_count,
                body_offset,
            });
            next_line += line_count;

            if let Some(name) = script.qualified_class_name()
                && !declared_types.contains(&name)
            {
                declared_types.push(name);
            }
        }

        Self {
            source,
            imports,
            spans,
            declared_types,
        }
    }

    /// Full unit text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Deduplicated imports in first-seen order
    pub fn imports(&self) -> &[String] {
        &self.imports
    }

    pub fn spans(&self) -> &[FragmentSpan] {
        &self.spans
    }

    /// Qualified names of the classes the scripts declare
    pub fn declared_types(&self) -> &[String] {
        &self.declared_types
    }

    /// Number of lines in the unit
    pub fn line_count(&self) -> usize {
        self.source.lines().count()
    }

    /// Map a 1-based unit line to `(script index, 1-based script line)`
    ///
    /// Lines in the import header belong to no script.
    pub fn locate(&self, unit_line: usize) -> Option<(usize, usize)> {
        self.spans
            .iter()
            .position(|span| span.contains(unit_line))
            .map(|index| {
                let span = &self.spans[index];
                (index, unit_line - span.start_line + 1 + span.body_offset)
            })
    }
}
