//! Restricted YAML reader for the `.ze_info` metadata grammar.
//!
//! Supports exactly what the metadata producers emit: nested mappings with
//! two-space style indentation, block sequences (`- item`), inline flow
//! lists of scalars (`[1, 2, 3]`), single- and double-quoted scalars and
//! `#` comments. Anchors, aliases, multi-document streams and multi-line
//! scalars are out of grammar and rejected with a line-numbered error.

use std::fmt;

/// Parse failure with the 1-based source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YamlError {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for YamlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "could not parse line {} : {}", self.line, self.message)
    }
}

fn err(line: usize, message: impl Into<String>) -> YamlError {
    YamlError {
        line,
        message: message.into(),
    }
}

/// A scalar token, quotes preserved in `text` and stripped by [`Scalar::value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scalar<'d> {
    pub text: &'d str,
    pub line: usize,
}

impl<'d> Scalar<'d> {
    /// The scalar with surrounding quotes removed.
    pub fn value(&self) -> &'d str {
        let t = self.text;
        if t.len() >= 2
            && ((t.starts_with('\'') && t.ends_with('\''))
                || (t.starts_with('"') && t.ends_with('"')))
        {
            &t[1..t.len() - 1]
        } else {
            t
        }
    }

    pub fn as_u32(&self) -> Result<u32, YamlError> {
        parse_int::<u32>(self.value(), self.line)
    }

    pub fn as_u64(&self) -> Result<u64, YamlError> {
        parse_int::<u64>(self.value(), self.line)
    }

    pub fn as_i32(&self) -> Result<i32, YamlError> {
        let v = self.value();
        v.parse::<i32>()
            .map_err(|_| err(self.line, format!("expected integer, got : [{v}]")))
    }

    pub fn as_bool(&self) -> Result<bool, YamlError> {
        match self.value() {
            "true" | "True" => Ok(true),
            "false" | "False" => Ok(false),
            other => Err(err(self.line, format!("expected boolean, got : [{other}]"))),
        }
    }
}

fn parse_int<T>(v: &str, line: usize) -> Result<T, YamlError>
where
    T: TryFrom<u64>,
{
    let parsed = if let Some(hex) = v.strip_prefix("0x").or_else(|| v.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        v.parse::<u64>().ok()
    };
    parsed
        .and_then(|raw| T::try_from(raw).ok())
        .ok_or_else(|| err(line, format!("expected integer, got : [{v}]")))
}

/// One `key: value` entry of a mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry<'d> {
    pub key: &'d str,
    pub value: Value<'d>,
    pub line: usize,
}

/// A parsed node.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<'d> {
    Scalar(Scalar<'d>),
    Sequence(Vec<Value<'d>>),
    Mapping(Vec<Entry<'d>>),
}

impl<'d> Value<'d> {
    pub fn as_scalar(&self) -> Option<&Scalar<'d>> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value<'d>]> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&[Entry<'d>]> {
        match self {
            Value::Mapping(entries) => Some(entries),
            _ => None,
        }
    }

    /// Source line of the node (first line for collections; 0 if empty).
    pub fn line(&self) -> usize {
        match self {
            Value::Scalar(s) => s.line,
            Value::Sequence(items) => items.first().map_or(0, Value::line),
            Value::Mapping(entries) => entries.first().map_or(0, |e| e.line),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Line<'d> {
    indent: usize,
    /// Content with indentation and comments stripped.
    text: &'d str,
    number: usize,
    /// Byte offset of the line start within the original document.
    offset: usize,
}

/// Strips a trailing comment, honoring quoted spans.
fn strip_comment(text: &str) -> &str {
    let mut quote: Option<char> = None;
    for (i, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (None, '\'') | (None, '"') => quote = Some(c),
            (None, '#') => return &text[..i],
            _ => {}
        }
    }
    text
}

fn logical_lines(text: &str) -> Result<Vec<Line<'_>>, YamlError> {
    let mut lines = Vec::new();
    let mut offset = 0usize;
    for (idx, raw) in text.split('\n').enumerate() {
        let number = idx + 1;
        let line_offset = offset;
        offset += raw.len() + 1;
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        let indent = raw.len() - raw.trim_start_matches(' ').len();
        let content = &raw[indent..];
        if content.starts_with('\t') {
            return Err(err(number, "tab indentation is not allowed"));
        }
        let content = strip_comment(content).trim_end();
        if content.is_empty() || content == "---" {
            continue;
        }
        lines.push(Line {
            indent,
            text: content,
            number,
            offset: line_offset,
        });
    }
    Ok(lines)
}

/// Parses a document into its root value (a mapping for well-formed
/// metadata). An empty document parses to an empty mapping.
pub fn parse(text: &str) -> Result<Value<'_>, YamlError> {
    let lines = logical_lines(text)?;
    if lines.is_empty() {
        return Ok(Value::Mapping(Vec::new()));
    }
    let mut pos = 0;
    let root_indent = lines[0].indent;
    let value = parse_block(&lines, &mut pos, root_indent)?;
    if pos != lines.len() {
        let line = lines[pos];
        return Err(err(line.number, format!("unexpected indentation at : [{}]", line.text)));
    }
    Ok(value)
}

/// Byte offset of the top-level entry with the given key, for callers that
/// re-parse a tail of the document later.
pub fn top_level_key_offset(text: &str, key: &str) -> Option<usize> {
    let lines = logical_lines(text).ok()?;
    let root_indent = lines.first()?.indent;
    lines
        .iter()
        .find(|l| {
            l.indent == root_indent
                && l.text
                    .strip_prefix(key)
                    .is_some_and(|rest| rest.starts_with(':'))
        })
        .map(|l| l.offset)
}

fn is_dash(text: &str) -> bool {
    text == "-" || text.starts_with("- ")
}

fn parse_block<'d>(
    lines: &[Line<'d>],
    pos: &mut usize,
    indent: usize,
) -> Result<Value<'d>, YamlError> {
    if is_dash(lines[*pos].text) {
        parse_sequence(lines, pos, indent)
    } else {
        parse_mapping(lines, pos, indent, None)
    }
}

fn parse_sequence<'d>(
    lines: &[Line<'d>],
    pos: &mut usize,
    indent: usize,
) -> Result<Value<'d>, YamlError> {
    let mut items = Vec::new();
    while *pos < lines.len() {
        let line = lines[*pos];
        if line.indent != indent || !is_dash(line.text) {
            break;
        }
        *pos += 1;
        let rest = line.text[1..].trim_start();
        if rest.is_empty() {
            // Item body on the following, deeper-indented lines.
            if *pos < lines.len() && lines[*pos].indent > indent {
                let inner = lines[*pos].indent;
                items.push(parse_block(lines, pos, inner)?);
            } else {
                return Err(err(line.number, "empty sequence item"));
            }
            continue;
        }
        // Offset of the content after "- ", so nested keys line up with it.
        let item_indent = indent + (line.text.len() - rest.len());
        if split_key(rest).is_some() {
            let first = Line {
                indent: item_indent,
                text: rest,
                number: line.number,
                offset: line.offset,
            };
            items.push(parse_mapping(lines, pos, item_indent, Some(first))?);
        } else {
            items.push(parse_scalar_or_flow(rest, line.number)?);
        }
    }
    Ok(Value::Sequence(items))
}

/// Splits `key: value` / `key:`; returns `None` for plain scalars.
fn split_key(text: &str) -> Option<(&str, &str)> {
    if text.starts_with('\'') || text.starts_with('"') {
        return None;
    }
    let colon = text.find(':')?;
    let after = &text[colon + 1..];
    if !after.is_empty() && !after.starts_with(' ') {
        return None;
    }
    Some((text[..colon].trim_end(), after.trim()))
}

fn parse_mapping<'d>(
    lines: &[Line<'d>],
    pos: &mut usize,
    indent: usize,
    first: Option<Line<'d>>,
) -> Result<Value<'d>, YamlError> {
    let mut entries = Vec::new();
    let mut pending = first;
    loop {
        let line = match pending.take() {
            Some(line) => line,
            None => {
                let Some(&line) = lines.get(*pos) else { break };
                if line.indent != indent || is_dash(line.text) {
                    break;
                }
                *pos += 1;
                line
            }
        };
        let Some((key, after)) = split_key(line.text) else {
            return Err(err(line.number, format!("expected key : value, got : [{}]", line.text)));
        };
        if key.is_empty() {
            return Err(err(line.number, "empty mapping key"));
        }
        let value = if after.is_empty() {
            match lines.get(*pos) {
                Some(next)
                    if next.indent > indent || (next.indent == indent && is_dash(next.text)) =>
                {
                    let inner = next.indent;
                    parse_block(lines, pos, inner)?
                }
                _ => Value::Mapping(Vec::new()),
            }
        } else {
            parse_scalar_or_flow(after, line.number)?
        };
        entries.push(Entry {
            key,
            value,
            line: line.number,
        });
    }
    Ok(Value::Mapping(entries))
}

fn parse_scalar_or_flow<'d>(text: &'d str, number: usize) -> Result<Value<'d>, YamlError> {
    if let Some(inner) = text.strip_prefix('[') {
        let Some(inner) = inner.strip_suffix(']') else {
            return Err(err(number, format!("unterminated flow sequence : [{text}]")));
        };
        let items = inner
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Value::Scalar(Scalar { text: s, line: number }))
            .collect();
        return Ok(Value::Sequence(items));
    }
    Ok(Value::Scalar(Scalar { text, line: number }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(value: &Value<'_>) -> Vec<(String, Value<'static>)> {
        // Convenience for assertions on owned copies.
        value
            .as_mapping()
            .unwrap()
            .iter()
            .map(|e| (e.key.to_string(), deep_clone(&e.value)))
            .collect()
    }

    fn deep_clone(v: &Value<'_>) -> Value<'static> {
        match v {
            Value::Scalar(s) => Value::Scalar(Scalar {
                text: Box::leak(s.text.to_string().into_boxed_str()),
                line: s.line,
            }),
            Value::Sequence(items) => Value::Sequence(items.iter().map(deep_clone).collect()),
            Value::Mapping(entries) => Value::Mapping(
                entries
                    .iter()
                    .map(|e| Entry {
                        key: Box::leak(e.key.to_string().into_boxed_str()),
                        value: deep_clone(&e.value),
                        line: e.line,
                    })
                    .collect(),
            ),
        }
    }

    #[test]
    fn parses_nested_mappings_and_sequences() {
        let doc = "\
version: '1.39'
kernels:
  - name: scale
    execution_env:
      simd_size: 16
      grf_count: 128
  - name: offset
    execution_env:
      simd_size: 32
";
        let root = parse(doc).unwrap();
        let top = mapping(&root);
        assert_eq!(top[0].0, "version");
        assert_eq!(top[0].1.as_scalar().unwrap().value(), "1.39");
        let kernels = top[1].1.as_sequence().unwrap();
        assert_eq!(kernels.len(), 2);
        let first = kernels[0].as_mapping().unwrap();
        assert_eq!(first[0].key, "name");
        assert_eq!(first[0].value.as_scalar().unwrap().value(), "scale");
        let env = first[1].value.as_mapping().unwrap();
        assert_eq!(env[0].key, "simd_size");
        assert_eq!(env[0].value.as_scalar().unwrap().as_u32().unwrap(), 16);
    }

    #[test]
    fn parses_flow_and_block_scalar_lists() {
        let doc = "\
sizes: [256, 2, 1]
dims:
  - 4
  - 5
";
        let root = parse(doc).unwrap();
        let top = root.as_mapping().unwrap();
        let flow = top[0].value.as_sequence().unwrap();
        assert_eq!(flow.len(), 3);
        assert_eq!(flow[0].as_scalar().unwrap().as_u32().unwrap(), 256);
        let block = top[1].value.as_sequence().unwrap();
        assert_eq!(block.len(), 2);
        assert_eq!(block[1].as_scalar().unwrap().as_u32().unwrap(), 5);
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let doc = "\
# header comment
version: '1.39'   # trailing

kernels:
";
        let root = parse(doc).unwrap();
        let top = root.as_mapping().unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].value.as_scalar().unwrap().value(), "1.39");
        assert!(matches!(&top[1].value, Value::Mapping(m) if m.is_empty()));
    }

    #[test]
    fn hash_inside_quotes_is_not_a_comment() {
        let doc = "note: 'a # b'\n";
        let root = parse(doc).unwrap();
        let top = root.as_mapping().unwrap();
        assert_eq!(top[0].value.as_scalar().unwrap().value(), "a # b");
    }

    #[test]
    fn sequence_at_key_indent_is_accepted() {
        let doc = "\
payload_arguments:
- arg_type: local_size
  offset: 0
- arg_type: work_dimensions
  offset: 12
";
        let root = parse(doc).unwrap();
        let args = root.as_mapping().unwrap()[0].value.as_sequence().unwrap();
        assert_eq!(args.len(), 2);
        let second = args[1].as_mapping().unwrap();
        assert_eq!(second[1].value.as_scalar().unwrap().as_u32().unwrap(), 12);
    }

    #[test]
    fn tabs_and_bad_indent_are_errors() {
        assert!(parse("\tkey: 1\n").is_err());
        let doc = "\
kernels:
  - name: a
 bad: 1
";
        let error = parse(doc).unwrap_err();
        assert_eq!(error.line, 3);
    }

    #[test]
    fn scalar_conversions() {
        let s = |text| Scalar { text, line: 1 };
        assert_eq!(s("0x20").as_u32().unwrap(), 32);
        assert_eq!(s("'8'").as_u32().unwrap(), 8);
        assert_eq!(s("true").as_bool().unwrap(), true);
        assert_eq!(s("-1").as_i32().unwrap(), -1);
        assert!(s("eight").as_u32().is_err());
        assert!(s("2").as_bool().is_err());
    }

    #[test]
    fn top_level_offsets_allow_tail_reparsing() {
        let doc = "\
version: '1.39'
kernels:
  - name: a
kernels_misc_info:
  - name: a
";
        let offset = top_level_key_offset(doc, "kernels_misc_info").unwrap();
        let tail = &doc[offset..];
        assert!(tail.starts_with("kernels_misc_info:"));
        let reparsed = parse(tail).unwrap();
        assert_eq!(reparsed.as_mapping().unwrap()[0].key, "kernels_misc_info");
    }
}
