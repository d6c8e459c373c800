// src/script/parser.rs

//! Line-oriented structural scanner for manager scripts
//!
//! This is a heuristic scanner, not a grammar. It keeps the script as a list
//! of lines and uses per-line patterns to find:
//!
//! - The import block (`using X;` lines at the top of the script)
//! - The class name and namespace
//! - Field declarations with their attributes (`[Link] Soil mySoil;`)
//! - Method call sites on declared instances (`mySoil.Add(a, b);`)
//!
//! Partial or malformed scripts never cause an error. A query that finds
//! nothing returns an empty list or `None`.

use crate::error::Result;
use regex::{Captures, NoExpand, Regex, RegexBuilder};
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

/// Indentation used for regenerated declarations
const MEMBER_INDENT: &str = "        ";

/// Tabs are normalized to this many spaces
const TAB_AS_SPACES: &str = "    ";

/// Tokens that can never be a declaration's type or instance name
const RESERVED_WORDS: &[&str] = &["as", "return", "get", "set", "using"];

/// Class skeleton appended when a declaration is added to a script without a class
const CLASS_SKELETON: &[&str] = &[
    "namespace Models",
    "{",
    "    [Serializable]",
    "    public class Script : Model",
    "    {",
    "    }",
    "}",
];

/// `using X;`, `using static X;` or `using A = B;` on a cleaned line
static IMPORT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^using\s+(?P<name>(?:static\s+)?[\w.]+(?:\s*=\s*[\w.]+)?)\s*;?$")
        .expect("import pattern is valid")
});

/// Field declaration: optional attribute, optional visibility, type, name, optional null initializer
static DECLARATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?P<attr>\[.+\]\s+)?(?P<access>public\s+|private\s+)?(?P<type>[\w.]+)\s+(?P<name>\w+)\s*(?:=\s*null)?;",
    )
    .expect("declaration pattern is valid")
});

/// An attribute alone on its line
static ATTRIBUTE_LINE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?P<attr>\[.+\])\s*$").expect("attribute pattern is valid"));

static CLASS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bclass\s+(?P<name>\w+)").expect("class pattern is valid"));

static NAMESPACE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^namespace\s+(?P<name>[\w.]+)").expect("namespace pattern is valid")
});

/// Any `instance.method(args)` call on a line
static CALL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<instance>\w+)\.(?P<method>\w+)\s*\((?P<args>.*)\)")
        .expect("call pattern is valid")
});

/// A field or event declared in a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// Line holding the declaration itself; `None` for declarations not yet written
    pub line_index: Option<usize>,
    /// Attributes in source order, e.g. `[Link]`
    pub attributes: Vec<String>,
    pub type_name: String,
    pub instance_name: String,
    pub is_private: bool,
    pub is_event: bool,
    /// Attributes sit on their own lines above the declaration
    pub attributes_on_previous_lines: bool,
}

impl Declaration {
    /// Create a private declaration with no attributes
    pub fn new(type_name: impl Into<String>, instance_name: impl Into<String>) -> Self {
        Self {
            line_index: None,
            attributes: Vec::new(),
            type_name: type_name.into(),
            instance_name: instance_name.into(),
            is_private: true,
            is_event: false,
            attributes_on_previous_lines: true,
        }
    }

    /// Add an attribute such as `[Link]`
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attributes.push(attribute.into());
        self
    }

    /// Make the declaration public
    pub fn public(mut self) -> Self {
        self.is_private = false;
        self
    }

    /// Whether this declaration's type is `type_name` or ends with `.type_name`
    pub fn has_type(&self, type_name: &str) -> bool {
        type_matches(&self.type_name, type_name)
    }

    /// Number of lines this declaration occupies in the script
    fn line_span(&self) -> usize {
        if self.attributes_on_previous_lines {
            self.attributes.len() + 1
        } else {
            1
        }
    }

    /// Render the declaration as script lines
    fn render(&self) -> Vec<String> {
        let mut rendered = Vec::new();
        let mut line = String::from(MEMBER_INDENT);

        if self.attributes_on_previous_lines {
            for attribute in &self.attributes {
                rendered.push(format!("{}{}", MEMBER_INDENT, attribute));
            }
        } else if !self.attributes.is_empty() {
            line.push_str(&self.attributes.join(" "));
            line.push(' ');
        }

        if self.is_event {
            line.push_str("public event ");
        } else if self.is_private {
            line.push_str("private ");
        } else {
            line.push_str("public ");
        }
        line.push_str(&self.type_name);
        line.push(' ');
        line.push_str(&self.instance_name);
        line.push(';');
        rendered.push(line);

        rendered
    }
}

/// A call of a method on a declared instance, e.g. `mySolutes.Add(a, b);`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    pub line_index: usize,
    pub instance_name: String,
    pub method_name: String,
    pub arguments: Vec<String>,
}

/// Options for regex based replacement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegexOptions {
    pub case_insensitive: bool,
    pub multi_line: bool,
    pub dot_matches_new_line: bool,
    pub ignore_whitespace: bool,
}

impl RegexOptions {
    fn build(&self, pattern: &str) -> Result<Regex> {
        Ok(RegexBuilder::new(pattern)
            .case_insensitive(self.case_insensitive)
            .multi_line(self.multi_line)
            .dot_matches_new_line(self.dot_matches_new_line)
            .ignore_whitespace(self.ignore_whitespace)
            .build()?)
    }
}

/// Structural model of one script
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptParser {
    lines: Vec<String>,
    /// The parsed text ended with a newline
    trailing_newline: bool,
}

impl ScriptParser {
    /// Parse a script
    pub fn new(script: &str) -> Self {
        let mut parser = Self::default();
        parser.parse(script);
        parser
    }

    /// Number of lines in the script
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Whether the script has no lines at all
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The script lines
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// The script text, or `None` for an empty script
    ///
    /// An unedited script reproduces the parsed text, apart from tabs which
    /// were expanded to spaces.
    pub fn to_script(&self) -> Option<String> {
        if self.lines.is_empty() {
            return None;
        }

        let mut script = self.lines.join("\n");
        if self.trailing_newline {
            script.push('\n');
        }
        Some(script)
    }

    /// Names of all imports in the import block, in order
    pub fn imports(&self) -> Vec<String> {
        let Some((start, end)) = self.find_import_block() else {
            return Vec::new();
        };

        self.lines[start..=end]
            .iter()
            .filter_map(|line| {
                IMPORT_PATTERN
                    .captures(&clean(line))
                    .map(|caps| caps["name"].to_string())
            })
            .collect()
    }

    /// Replace the import block with the given imports
    ///
    /// Duplicates are dropped, keeping the first occurrence. A script without
    /// an import block gets one at the top.
    pub fn set_imports<I, S>(&mut self, imports: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let insert_at = match self.find_import_block() {
            Some((start, end)) => {
                self.lines.drain(start..=end);
                start
            }
            None => 0,
        };

        let mut seen: Vec<String> = Vec::new();
        for import in imports {
            let import = import.as_ref().trim();
            if !import.is_empty() && !seen.iter().any(|s| s == import) {
                seen.push(import.to_string());
            }
        }

        if seen.is_empty() {
            return;
        }
        if self.lines.is_empty() {
            self.trailing_newline = true;
        }

        for (offset, import) in seen.iter().enumerate() {
            self.lines.insert(insert_at + offset, format!("using {};", import));
        }
    }

    /// Add an import if it is not already present
    pub fn add_import(&mut self, import: &str) {
        let mut imports = self.imports();
        imports.push(import.to_string());
        self.set_imports(imports);
    }

    /// Line index where the script body (everything after the imports) starts
    pub fn body_start_index(&self) -> usize {
        match self.find_import_block() {
            Some((_, end)) => end + 1,
            None => 0,
        }
    }

    /// Everything except the import block, each line newline-terminated
    pub fn body_without_imports(&self) -> String {
        let mut body = String::new();
        for line in &self.lines[self.body_start_index()..] {
            body.push_str(line);
            body.push('\n');
        }
        body
    }

    /// Name of the first class declared in the script
    pub fn class_name(&self) -> Option<String> {
        self.lines.iter().find_map(|line| {
            CLASS_PATTERN
                .captures(&clean(line))
                .map(|caps| caps["name"].to_string())
        })
    }

    /// Name of the first namespace declared in the script
    pub fn namespace(&self) -> Option<String> {
        self.lines.iter().find_map(|line| {
            NAMESPACE_PATTERN
                .captures(&clean(line))
                .map(|caps| caps["name"].to_string())
        })
    }

    /// The class name qualified with the namespace, if any
    pub fn qualified_class_name(&self) -> Option<String> {
        let class_name = self.class_name()?;
        Some(match self.namespace() {
            Some(namespace) => format!("{}.{}", namespace, class_name),
            None => class_name,
        })
    }

    /// All field declarations in the script, in line order
    pub fn declarations(&self) -> Vec<Declaration> {
        let mut found = Vec::new();

        for (index, raw) in self.lines.iter().enumerate() {
            let line = clean(raw);
            let Some(caps) = DECLARATION_PATTERN.captures(&line) else {
                continue;
            };

            let type_name = &caps["type"];
            let instance_name = &caps["name"];
            if RESERVED_WORDS.contains(&type_name) || RESERVED_WORDS.contains(&instance_name) {
                continue;
            }

            let is_event = line.contains("event");
            let is_public = caps
                .name("access")
                .is_some_and(|access| access.as_str().trim_end() == "public");

            let mut declaration = Declaration {
                line_index: Some(index),
                attributes: Vec::new(),
                type_name: type_name.to_string(),
                instance_name: instance_name.to_string(),
                is_private: !is_event && !is_public,
                is_event,
                attributes_on_previous_lines: true,
            };

            if let Some(attribute) = caps.name("attr") {
                declaration.attributes.push(attribute.as_str().trim().to_string());
                declaration.attributes_on_previous_lines = false;
            } else {
                declaration.attributes = self.attributes_above(index);
            }

            found.push(declaration);
        }

        found
    }

    /// Replace every declaration in the script with `declarations`
    ///
    /// Existing declarations (with their previous-line attributes) are
    /// removed, then the new ones are written, in order, right after the
    /// opening brace of the class.
    pub fn set_declarations(&mut self, declarations: &[Declaration]) {
        let existing = self.declarations();
        for declaration in existing.iter().rev() {
            let Some(end) = declaration.line_index else {
                continue;
            };
            let begin = (end + 1).saturating_sub(declaration.line_span());
            self.lines.drain(begin..=end);
        }

        let insert_at = match self.find_start_of_class() {
            Some(index) => index,
            None => {
                debug!("No class found in script, adding class skeleton");
                if self.lines.is_empty() {
                    self.trailing_newline = true;
                }
                self.lines.extend(CLASS_SKELETON.iter().map(|line| line.to_string()));
                match self.find_start_of_class() {
                    Some(index) => index,
                    None => return,
                }
            }
        };

        let rendered = declarations.iter().flat_map(Declaration::render);
        for (offset, line) in rendered.enumerate() {
            self.lines.insert(insert_at + offset, line);
        }
    }

    /// Add a declaration unless one with the same instance name exists
    ///
    /// Returns true if the declaration was added.
    pub fn add_declaration<I, S>(&mut self, type_name: &str, instance_name: &str, attributes: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut declarations = self.declarations();
        if declarations.iter().any(|d| d.instance_name == instance_name) {
            return false;
        }

        let mut declaration = Declaration::new(type_name, instance_name);
        declaration.attributes = attributes.into_iter().map(Into::into).collect();
        declarations.push(declaration);
        self.set_declarations(&declarations);
        true
    }

    /// Remove the declaration with the given instance name
    ///
    /// Returns true if a declaration was removed.
    pub fn remove_declaration(&mut self, instance_name: &str) -> bool {
        let mut declarations = self.declarations();
        let Some(position) = declarations.iter().position(|d| d.instance_name == instance_name) else {
            return false;
        };

        declarations.remove(position);
        self.set_declarations(&declarations);
        true
    }

    /// Find calls of `method_name` on instances declared as `instance_type`
    ///
    /// Arguments are split on every comma; commas inside nested calls or
    /// string literals are not recognized.
    pub fn find_method_calls(&self, instance_type: &str, method_name: &str) -> Vec<MethodCall> {
        let pattern = format!(
            r"(?P<instance>\w+)\.{}\s*\((?P<args>.*)\)",
            regex::escape(method_name)
        );
        let Ok(call_pattern) = Regex::new(&pattern) else {
            return Vec::new();
        };

        let needle = format!(".{}", method_name);
        let declarations = self.declarations();
        let mut calls = Vec::new();

        for (index, line) in self.lines.iter().enumerate() {
            if !line.contains(&needle) {
                continue;
            }
            let Some(caps) = call_pattern.captures(line) else {
                continue;
            };

            let instance_name = &caps["instance"];
            let declared = declarations
                .iter()
                .find(|d| d.instance_name == instance_name);
            if !declared.is_some_and(|d| d.has_type(instance_type)) {
                continue;
            }

            calls.push(MethodCall {
                line_index: index,
                instance_name: instance_name.to_string(),
                method_name: method_name.to_string(),
                arguments: split_arguments(&caps["args"]),
            });
        }

        calls
    }

    /// Rewrite the call on `call.line_index` to match `call`
    ///
    /// Text before and after the call on that line is kept.
    pub fn set_method_call(&mut self, call: &MethodCall) {
        let Some(line) = self.lines.get_mut(call.line_index) else {
            return;
        };

        let rendered = format!(
            "{}.{}({})",
            call.instance_name,
            call.method_name,
            call.arguments.join(", ")
        );

        let span = CALL_PATTERN
            .captures_iter(line)
            .find(|caps| caps["instance"] == *call.instance_name)
            .and_then(|caps| caps.get(0))
            .map(|m| m.range());

        match span {
            Some(range) => line.replace_range(range, &rendered),
            None => {
                let indent = line.len() - line.trim_start().len();
                *line = format!("{}{};", " ".repeat(indent), rendered);
            }
        }
    }

    /// Replace every occurrence of `search` with `replacement`, line by line
    ///
    /// Returns true if anything was replaced. A `None` or empty search string
    /// changes nothing.
    pub fn replace(&mut self, search: Option<&str>, replacement: &str, case_sensitive: bool) -> bool {
        let Some(search) = search.filter(|s| !s.is_empty()) else {
            return false;
        };

        let mut replaced = false;
        if case_sensitive {
            for line in &mut self.lines {
                let mut from = 0;
                while let Some(found) = line[from..].find(search) {
                    let at = from + found;
                    line.replace_range(at..at + search.len(), replacement);
                    from = at + replacement.len();
                    replaced = true;
                }
            }
        } else {
            let Ok(pattern) = RegexBuilder::new(&regex::escape(search))
                .case_insensitive(true)
                .build()
            else {
                return false;
            };
            for line in &mut self.lines {
                if pattern.is_match(line) {
                    *line = pattern.replace_all(line, NoExpand(replacement)).into_owned();
                    replaced = true;
                }
            }
        }

        replaced
    }

    /// Index of the first line containing `search`
    pub fn line_index_of(&self, search: &str, case_sensitive: bool) -> Option<usize> {
        if search.is_empty() {
            return None;
        }
        if case_sensitive {
            self.lines.iter().position(|line| line.contains(search))
        } else {
            let search = search.to_lowercase();
            self.lines
                .iter()
                .position(|line| line.to_lowercase().contains(&search))
        }
    }

    /// Regex search and replace over the whole script
    ///
    /// The replacement may reference capture groups (`$1`, `${name}`).
    /// Returns true if the script changed.
    pub fn replace_regex(
        &mut self,
        pattern: Option<&str>,
        replacement: &str,
        options: RegexOptions,
    ) -> Result<bool> {
        self.replace_regex_with(pattern, |caps: &Captures<'_>| {
            let mut expanded = String::new();
            caps.expand(replacement, &mut expanded);
            expanded
        }, options)
    }

    /// Regex search and replace with a function computing each replacement
    pub fn replace_regex_with<F>(
        &mut self,
        pattern: Option<&str>,
        mut replacer: F,
        options: RegexOptions,
    ) -> Result<bool>
    where
        F: FnMut(&Captures<'_>) -> String,
    {
        let Some(pattern) = pattern else {
            return Ok(false);
        };
        let Some(old_script) = self.to_script() else {
            return Ok(false);
        };

        let regex = options.build(pattern)?;
        let new_script = regex.replace_all(&old_script, |caps: &Captures<'_>| replacer(caps));
        if new_script == old_script {
            return Ok(false);
        }

        let new_script = new_script.into_owned();
        self.parse(&new_script);
        Ok(true)
    }

    fn parse(&mut self, script: &str) {
        self.lines.clear();
        self.trailing_newline = script.ends_with('\n');

        let body = script.strip_suffix('\n').unwrap_or(script);
        if script.is_empty() {
            return;
        }
        self.lines = body
            .split('\n')
            .map(|line| line.replace('\t', TAB_AS_SPACES))
            .collect();
    }

    /// First and last line of the import block
    ///
    /// The block starts at the first import line and runs until the first
    /// line that is neither an import nor blank (comments count as blank).
    fn find_import_block(&self) -> Option<(usize, usize)> {
        let mut block: Option<(usize, usize)> = None;

        for (index, line) in self.lines.iter().enumerate() {
            let line = clean(line);
            if IMPORT_PATTERN.is_match(&line) {
                block = Some(match block {
                    Some((start, _)) => (start, index),
                    None => (index, index),
                });
            } else if !line.is_empty() && block.is_some() {
                break;
            }
        }

        block
    }

    /// Line after the opening brace of the first class, whatever its visibility
    fn find_start_of_class(&self) -> Option<usize> {
        let class_line = self
            .lines
            .iter()
            .position(|line| CLASS_PATTERN.is_match(&clean(line)))?;
        let brace_line = self.lines[class_line..]
            .iter()
            .position(|line| clean(line).contains('{'))?;
        Some(class_line + brace_line + 1)
    }

    /// Attribute-only lines directly above `index`, in source order
    fn attributes_above(&self, index: usize) -> Vec<String> {
        let mut attributes: Vec<String> = self.lines[..index]
            .iter()
            .rev()
            .map_while(|line| {
                ATTRIBUTE_LINE_PATTERN
                    .captures(&clean(line))
                    .map(|caps| caps["attr"].to_string())
            })
            .collect();
        attributes.reverse();
        attributes
    }
}

impl fmt::Display for ScriptParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_script().unwrap_or_default())
    }
}

/// Whether `declared` names `expected`, either exactly or as a dotted suffix
pub fn type_matches(declared: &str, expected: &str) -> bool {
    declared == expected
        || declared
            .strip_suffix(expected)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Trim a line and strip any `//` comment
fn clean(line: &str) -> String {
    let line = line.trim();
    match line.find("//") {
        Some(position) => line[..position].trim_end().to_string(),
        None => line.to_string(),
    }
}

fn split_arguments(arguments: &str) -> Vec<String> {
    if arguments.trim().is_empty() {
        return Vec::new();
    }
    arguments.split(',').map(|a| a.trim().to_string()).collect()
}
