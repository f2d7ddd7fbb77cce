//! Literal values and top-level assignments of control file text.
//!
//! Control files are Python source; only the module-level `NAME = <literal>`
//! assignments matter here. Values are decoded into `serde_json::Value`
//! (strings, integers, floats, booleans, `None`, lists/tuples, dicts) and
//! anything else is reported as an error for the caller to judge.

use serde_json::{Map, Number, Value};

/// One top-level assignment, value still unparsed
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Assignment {
    pub name: String,
    pub source: String,
    /// 1-based line the assignment starts on
    pub line: usize,
}

/// Collect every unindented `NAME = value` assignment, joining continuation
/// lines of bracketed values and triple-quoted strings.
pub(crate) fn assignments(text: &str) -> Vec<Assignment> {
    let lines: Vec<&str> = text.lines().collect();
    let mut found = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        let Some((name, rest)) = split_assignment(line) else {
            // Skip over the body of any multi-line construct so that its
            // contents are never mistaken for assignments.
            i += 1 + continuation_lines(&lines[i..]);
            continue;
        };
        let extra = continuation_lines(&lines[i..]);
        let mut source = rest.to_string();
        for next in &lines[i + 1..=i + extra] {
            source.push('\n');
            source.push_str(next);
        }
        found.push(Assignment {
            name: name.to_string(),
            source,
            line: i + 1,
        });
        i += 1 + extra;
    }
    found
}

fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let first = line.chars().next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    let name_end = line
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(line.len());
    let rest = line[name_end..].trim_start();
    let value = rest.strip_prefix('=')?;
    if value.starts_with('=') {
        return None;
    }
    Some((&line[..name_end], value))
}

/// Number of lines after `lines[0]` that belong to the same logical line
fn continuation_lines(lines: &[&str]) -> usize {
    let mut scanner = Scanner::default();
    for (idx, line) in lines.iter().enumerate() {
        scanner.feed(line);
        if scanner.complete() {
            return idx;
        }
    }
    lines.len().saturating_sub(1)
}

#[derive(Default)]
struct Scanner {
    depth: usize,
    quote: Option<(char, bool)>,
    backslash_continues: bool,
}

impl Scanner {
    fn feed(&mut self, line: &str) {
        self.backslash_continues = false;
        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            match self.quote {
                Some((q, triple)) => {
                    if c == '\\' {
                        i += 2;
                        continue;
                    }
                    if c == q {
                        if !triple {
                            self.quote = None;
                        } else if chars.get(i + 1) == Some(&q) && chars.get(i + 2) == Some(&q) {
                            self.quote = None;
                            i += 3;
                            continue;
                        }
                    }
                }
                None => match c {
                    '#' => break,
                    '\'' | '"' => {
                        let triple = chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c);
                        self.quote = Some((c, triple));
                        if triple {
                            i += 3;
                            continue;
                        }
                    }
                    '(' | '[' | '{' => self.depth += 1,
                    ')' | ']' | '}' => self.depth = self.depth.saturating_sub(1),
                    _ => {}
                },
            }
            i += 1;
        }
        // A single-quoted string never spans lines
        if matches!(self.quote, Some((_, false))) {
            self.quote = None;
        }
        if self.quote.is_none() && line.trim_end().ends_with('\\') {
            self.backslash_continues = true;
        }
    }

    fn complete(&self) -> bool {
        self.depth == 0 && self.quote.is_none() && !self.backslash_continues
    }
}

/// Parse a complete literal expression
pub(crate) fn parse(source: &str) -> Result<Value, String> {
    let mut parser = Parser {
        chars: source.chars().collect(),
        pos: 0,
    };
    let value = parser.value()?;
    parser.skip_blank();
    if parser.pos < parser.chars.len() {
        return Err(format!(
            "unexpected trailing input at column {}",
            parser.pos + 1
        ));
    }
    Ok(value)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    /// Whitespace, newlines, comments and backslash line joins
    fn skip_blank(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                '#' => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.pos += 1;
                    }
                }
                '\\' if self.peek_at(1) == Some('\n') => self.pos += 2,
                c if c.is_whitespace() => self.pos += 1,
                _ => break,
            }
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), String> {
        self.skip_blank();
        match self.peek() {
            Some(c) if c == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(c) => Err(format!("expected '{expected}', found '{c}'")),
            None => Err(format!("expected '{expected}', found end of input")),
        }
    }

    fn value(&mut self) -> Result<Value, String> {
        self.skip_blank();
        let Some(c) = self.peek() else {
            return Err("missing value".to_string());
        };
        match c {
            '\'' | '"' => self.strings(),
            'r' | 'R' | 'u' | 'U' | 'b' | 'B' if matches!(self.peek_at(1), Some('\'' | '"')) => {
                self.strings()
            }
            '[' => {
                self.pos += 1;
                Ok(Value::Array(self.sequence(']')?.0))
            }
            '(' => {
                self.pos += 1;
                let (items, trailing_comma) = self.sequence(')')?;
                // `(x)` is just a parenthesised value, `(x,)` a tuple
                if items.len() == 1 && !trailing_comma {
                    Ok(items.into_iter().next().unwrap_or(Value::Null))
                } else {
                    Ok(Value::Array(items))
                }
            }
            '{' => {
                self.pos += 1;
                self.dict()
            }
            '-' | '+' | '0'..='9' | '.' => self.number(),
            c if c.is_ascii_alphabetic() || c == '_' => self.keyword(),
            other => Err(format!("unexpected character '{other}'")),
        }
    }

    fn keyword(&mut self) -> Result<Value, String> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "True" => Ok(Value::Bool(true)),
            "False" => Ok(Value::Bool(false)),
            "None" => Ok(Value::Null),
            _ => Err(format!("'{word}' is not a literal")),
        }
    }

    fn number(&mut self) -> Result<Value, String> {
        let start = self.pos;
        if matches!(self.peek(), Some('-' | '+')) {
            self.pos += 1;
        }
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
        {
            self.pos += 1;
        }
        let raw: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        if let Ok(int) = raw.parse::<i64>() {
            return Ok(Value::Number(int.into()));
        }
        raw.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| format!("invalid number '{raw}'"))
    }

    /// One or more adjacent string literals, concatenated
    fn strings(&mut self) -> Result<Value, String> {
        let mut out = self.string()?;
        loop {
            let save = self.pos;
            self.skip_blank();
            let next_is_string = match self.peek() {
                Some('\'' | '"') => true,
                Some('r' | 'R' | 'u' | 'U' | 'b' | 'B') => {
                    matches!(self.peek_at(1), Some('\'' | '"'))
                }
                _ => false,
            };
            if !next_is_string {
                self.pos = save;
                return Ok(Value::String(out));
            }
            out.push_str(&self.string()?);
        }
    }

    fn string(&mut self) -> Result<String, String> {
        let mut raw = false;
        if let Some(prefix) = self.peek().filter(|c| c.is_ascii_alphabetic()) {
            raw = prefix.eq_ignore_ascii_case(&'r');
            self.pos += 1;
        }
        let Some(quote) = self.peek() else {
            return Err("unterminated string".to_string());
        };
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut out = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err("unterminated string".to_string());
            };
            if c == quote {
                if !triple {
                    self.pos += 1;
                    return Ok(out);
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.pos += 3;
                    return Ok(out);
                }
            }
            if c == '\n' && !triple {
                return Err("unterminated string".to_string());
            }
            if c == '\\' {
                let Some(next) = self.peek_at(1) else {
                    return Err("unterminated string".to_string());
                };
                self.pos += 2;
                if raw {
                    out.push('\\');
                    out.push(next);
                    continue;
                }
                match next {
                    '\n' => {}
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '0' => out.push('\0'),
                    '\\' | '\'' | '"' => out.push(next),
                    other => {
                        out.push('\\');
                        out.push(other);
                    }
                }
                continue;
            }
            out.push(c);
            self.pos += 1;
        }
    }

    /// Comma separated values up to `close`; returns whether a trailing comma
    /// was present
    fn sequence(&mut self, close: char) -> Result<(Vec<Value>, bool), String> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        loop {
            self.skip_blank();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok((items, trailing_comma));
            }
            items.push(self.value()?);
            self.skip_blank();
            match self.peek() {
                Some(',') => {
                    self.pos += 1;
                    trailing_comma = true;
                }
                Some(c) if c == close => {
                    self.pos += 1;
                    return Ok((items, false));
                }
                Some(c) => return Err(format!("expected ',' or '{close}', found '{c}'")),
                None => return Err(format!("missing '{close}'")),
            }
        }
    }

    fn dict(&mut self) -> Result<Value, String> {
        let mut map = Map::new();
        loop {
            self.skip_blank();
            if self.peek() == Some('}') {
                self.pos += 1;
                return Ok(Value::Object(map));
            }
            let key = match self.value()? {
                Value::String(s) => s,
                Value::Null => return Err("dict key cannot be None".to_string()),
                other => other.to_string(),
            };
            self.expect(':')?;
            let value = self.value()?;
            map.insert(key, value);
            self.skip_blank();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some('}') => {}
                Some(c) => return Err(format!("expected ',' or '}}', found '{c}'")),
                None => return Err("missing '}'".to_string()),
            }
        }
    }
}

/// Render a value back as Python literal source
pub(crate) fn to_python(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(to_python).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Object(map) => {
            let inner: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", quote(k), to_python(v)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalars() {
        assert_eq!(parse("'dummy_Pass'").unwrap(), json!("dummy_Pass"));
        assert_eq!(parse(r#""bvt, smoke""#).unwrap(), json!("bvt, smoke"));
        assert_eq!(parse("-3").unwrap(), json!(-3));
        assert_eq!(parse("2.5").unwrap(), json!(2.5));
        assert_eq!(parse("True").unwrap(), json!(true));
        assert_eq!(parse("None").unwrap(), Value::Null);
        assert_eq!(parse("'a' 'b'  # trailing comment").unwrap(), json!("ab"));
    }

    #[test]
    fn test_containers() {
        assert_eq!(parse("[1, 'two', None,]").unwrap(), json!([1, "two", null]));
        assert_eq!(parse("('x',)").unwrap(), json!(["x"]));
        assert_eq!(parse("('x')").unwrap(), json!("x"));
        assert_eq!(
            parse("{'owner': 'me', 'labels': ['a', 'b'], 1: True}").unwrap(),
            json!({"owner": "me", "labels": ["a", "b"], "1": true})
        );
    }

    #[test]
    fn test_escapes_and_raw_strings() {
        assert_eq!(parse(r"'it\'s\n'").unwrap(), json!("it's\n"));
        assert_eq!(parse(r"r'\d+'").unwrap(), json!(r"\d+"));
    }

    #[test]
    fn test_rejects_expressions() {
        assert!(parse("foo()").is_err());
        assert!(parse("'a' + 'b'").is_err());
        assert!(parse("[1, 2").is_err());
        assert!(parse("'open").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn test_multiline_assignments() {
        let text = "\
AUTHOR = 'me'
DOC = \"\"\"
NAME = 'not an assignment'
\"\"\"
BUG_TEMPLATE = {
    'owner': 'x',
    'labels': ['a'],
}
def run(machine):
    NAME = 'indented'
if NAME == 'x':
    pass
NAME = 'real'
";
        let found = assignments(text);
        let names: Vec<&str> = found.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["AUTHOR", "DOC", "BUG_TEMPLATE", "NAME"]);
        assert_eq!(
            parse(&found[2].source).unwrap(),
            json!({"owner": "x", "labels": ["a"]})
        );
        assert_eq!(found[3].line, 13);
        assert_eq!(parse(&found[3].source).unwrap(), json!("real"));
    }

    #[test]
    fn test_to_python() {
        let value = json!({"key": "it's", "n": 3, "flags": [true, null]});
        assert_eq!(
            to_python(&value),
            r"{'key': 'it\'s', 'n': 3, 'flags': [True, None]}"
        );
    }
}
