//! Line scanner recovering code structure from source text
//!
//! The scanner does not parse. It removes comments and string contents
//! (triple-quoted blocks included), then recovers `def`/`class` and loop
//! blocks from indentation. Lines inside open brackets or after a trailing
//! backslash are continuations and never open or close a block.

/// One source line after comment and string stripping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLine {
    /// 1-based line number
    pub number: u32,
    /// Code with comments removed and string contents emptied
    pub code: String,
    pub indent: usize,
    /// Inside the body of a `for`/`while` loop
    pub in_loop: bool,
}

impl CodeLine {
    pub fn is_blank(&self) -> bool {
        self.code.trim().is_empty()
    }
}

/// A `def` block; `header..end` indexes into [`SourceStructure::lines`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionBlock {
    pub name: String,
    /// Enclosing class when the function is a method
    pub class: Option<String>,
    pub decorators: Vec<String>,
    pub header: usize,
    pub end: usize,
}

impl FunctionBlock {
    pub fn line_number(&self) -> u32 {
        self.header as u32 + 1
    }

    pub fn is_test(&self) -> bool {
        self.name.starts_with("test")
    }

    pub fn is_setup(&self) -> bool {
        matches!(
            self.name.as_str(),
            "setUp" | "setUpClass" | "setup" | "setup_method" | "setup_function" | "setup_module"
        )
    }

    pub fn is_teardown(&self) -> bool {
        matches!(
            self.name.as_str(),
            "tearDown"
                | "tearDownClass"
                | "teardown"
                | "teardown_method"
                | "teardown_function"
                | "teardown_module"
        )
    }

    /// Qualified name as the harness reports it (`Class.method` or `name`)
    pub fn decorated_with(&self, re: &regex::Regex) -> bool {
        self.decorators.iter().any(|d| re.is_match(d))
    }

    pub fn qualified_name(&self) -> String {
        match &self.class {
            Some(class) => format!("{}.{}", class, self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassBlock {
    pub name: String,
    pub header: usize,
}

/// Scanned source: stripped lines plus recovered blocks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStructure {
    pub lines: Vec<CodeLine>,
    pub functions: Vec<FunctionBlock>,
    pub classes: Vec<ClassBlock>,
    /// Whether blocks were recovered; false for languages without a scanner
    pub structured: bool,
}

impl SourceStructure {
    pub fn tests(&self) -> impl Iterator<Item = &FunctionBlock> {
        self.functions.iter().filter(|f| f.is_test())
    }

    pub fn has_tests(&self) -> bool {
        self.tests().next().is_some()
    }

    /// Lines of a function, header included
    pub fn body(&self, function: &FunctionBlock) -> &[CodeLine] {
        let end = function.end.min(self.lines.len());
        &self.lines[function.header.min(end)..end]
    }
}

#[derive(Debug, Clone, Copy)]
enum OpenKind {
    Function(usize),
    Class(usize),
    Loop,
}

#[derive(Debug, Clone, Copy)]
struct OpenBlock {
    kind: OpenKind,
    indent: usize,
}

/// Scan Python source
pub fn scan_python(source: &str) -> SourceStructure {
    let mut structure = SourceStructure {
        structured: true,
        ..Default::default()
    };
    let mut stack: Vec<OpenBlock> = Vec::new();
    let mut decorators: Vec<String> = Vec::new();
    let mut triple: Option<char> = None;
    let mut depth: i32 = 0;
    let mut continued = false;

    for (idx, raw) in source.lines().enumerate() {
        let continuation = depth > 0 || continued || triple.is_some();
        let code = strip_python_line(raw, &mut triple);
        let indent = indent_width(raw);
        let trimmed = code.trim();

        if !trimmed.is_empty() && !continuation {
            while let Some(top) = stack.last() {
                if top.indent < indent {
                    break;
                }
                close(&mut structure, *top, idx);
                stack.pop();
            }
        }

        let in_loop = stack.iter().any(|b| matches!(b.kind, OpenKind::Loop));
        structure.lines.push(CodeLine {
            number: idx as u32 + 1,
            code: code.clone(),
            indent,
            in_loop,
        });

        if !trimmed.is_empty() && !continuation {
            let header = trimmed.strip_prefix("async ").unwrap_or(trimmed).trim_start();
            if trimmed.starts_with('@') {
                decorators.push(trimmed.to_string());
            } else if let Some(name) = header.strip_prefix("def ").map(identifier) {
                let class = match stack.last() {
                    Some(OpenBlock {
                        kind: OpenKind::Class(c),
                        ..
                    }) => Some(structure.classes[*c].name.clone()),
                    _ => None,
                };
                structure.functions.push(FunctionBlock {
                    name,
                    class,
                    decorators: std::mem::take(&mut decorators),
                    header: idx,
                    end: idx + 1,
                });
                stack.push(OpenBlock {
                    kind: OpenKind::Function(structure.functions.len() - 1),
                    indent,
                });
            } else if let Some(name) = header.strip_prefix("class ").map(identifier) {
                decorators.clear();
                structure.classes.push(ClassBlock {
                    name,
                    header: idx,
                });
                stack.push(OpenBlock {
                    kind: OpenKind::Class(structure.classes.len() - 1),
                    indent,
                });
            } else if header.starts_with("for ") || header.starts_with("while ") {
                decorators.clear();
                stack.push(OpenBlock {
                    kind: OpenKind::Loop,
                    indent,
                });
            } else {
                decorators.clear();
            }
        }

        depth = (depth + bracket_delta(&code)).max(0);
        continued = code.trim_end().ends_with('\\');
    }

    let total = structure.lines.len();
    while let Some(top) = stack.pop() {
        close(&mut structure, top, total);
    }
    structure
}

/// Scan source without structure recovery, removing `#` comments
pub fn scan_plain(source: &str) -> SourceStructure {
    let lines = source
        .lines()
        .enumerate()
        .map(|(idx, raw)| CodeLine {
            number: idx as u32 + 1,
            code: strip_hash_comment(raw),
            indent: indent_width(raw),
            in_loop: false,
        })
        .collect();
    SourceStructure {
        lines,
        ..Default::default()
    }
}

fn close(structure: &mut SourceStructure, block: OpenBlock, end: usize) {
    match block.kind {
        OpenKind::Function(i) => structure.functions[i].end = end,
        OpenKind::Class(_) | OpenKind::Loop => {}
    }
}

fn identifier(rest: &str) -> String {
    rest.trim_start()
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

fn indent_width(raw: &str) -> usize {
    let mut width = 0;
    for c in raw.chars() {
        match c {
            ' ' => width += 1,
            '\t' => width = (width / 8 + 1) * 8,
            _ => break,
        }
    }
    width
}

fn bracket_delta(code: &str) -> i32 {
    code.chars().fold(0, |acc, c| match c {
        '(' | '[' | '{' => acc + 1,
        ')' | ']' | '}' => acc - 1,
        _ => acc,
    })
}

/// Strip one Python line; `triple` carries an open triple-quoted string
fn strip_python_line(raw: &str, triple: &mut Option<char>) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(raw.len());
    let mut i = 0;

    if let Some(q) = *triple {
        match find_triple(&chars, 0, q) {
            Some(end) => {
                push_quotes(&mut out, q, 3);
                *triple = None;
                i = end + 3;
            }
            None => return out,
        }
    }

    while i < chars.len() {
        let c = chars[i];
        match c {
            '#' => break,
            '"' | '\'' if chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c) => {
                push_quotes(&mut out, c, 3);
                match find_triple(&chars, i + 3, c) {
                    Some(end) => {
                        push_quotes(&mut out, c, 3);
                        i = end + 3;
                    }
                    None => {
                        *triple = Some(c);
                        break;
                    }
                }
            }
            '"' | '\'' => {
                out.push(c);
                let mut j = i + 1;
                while j < chars.len() && chars[j] != c {
                    j += if chars[j] == '\\' { 2 } else { 1 };
                }
                if j < chars.len() {
                    out.push(c);
                }
                i = j + 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

fn find_triple(chars: &[char], from: usize, q: char) -> Option<usize> {
    let mut j = from;
    while j + 2 < chars.len() {
        if chars[j] == '\\' {
            j += 2;
            continue;
        }
        if chars[j] == q && chars[j + 1] == q && chars[j + 2] == q {
            return Some(j);
        }
        j += 1;
    }
    None
}

fn push_quotes(out: &mut String, q: char, n: usize) {
    for _ in 0..n {
        out.push(q);
    }
}

/// Shell-style comment removal: `#` at line start or after whitespace,
/// outside quotes
fn strip_hash_comment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut quote: Option<char> = None;
    let mut prev = ' ';
    for c in raw.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == '#' && prev.is_whitespace() => break,
            None => {}
        }
        out.push(c);
        prev = c;
    }
    out
}
