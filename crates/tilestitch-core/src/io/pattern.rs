use regex::Regex;

use crate::error::{Result, StitchError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Field {
    Row,
    Col,
    Channel,
    Zstack,
}

impl Field {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "row" => Some(Self::Row),
            "col" => Some(Self::Col),
            "channel" => Some(Self::Channel),
            "zstack" => Some(Self::Zstack),
            _ => None,
        }
    }

    fn group(self) -> &'static str {
        match self {
            Self::Row => "row",
            Self::Col => "col",
            Self::Channel => "channel",
            Self::Zstack => "zstack",
        }
    }
}

#[derive(Clone, Debug)]
enum Segment {
    Literal(String),
    Field { field: Field, width: Option<usize> },
}

/// Fields extracted from one matching tile file name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileName {
    pub row: usize,
    pub col: usize,
    pub channel: String,
    pub zstack: Option<usize>,
}

/// A tile naming pattern such as `Row1_Well2_{channel}_zstack3_r{row:03}_c{col:03}.tif`.
///
/// `{row}`, `{col}` and `{zstack}` match decimal numbers; a `:0N` format spec
/// pins them to exactly N zero-padded digits. `{channel}` matches any
/// non-empty text.
#[derive(Clone, Debug)]
pub struct FilePattern {
    source: String,
    segments: Vec<Segment>,
    regex: Regex,
}

impl FilePattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        let invalid = |reason: &str| StitchError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = pattern.chars();
        while let Some(ch) = chars.next() {
            match ch {
                '{' => {
                    let mut inner = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        inner.push(c);
                    }
                    if !closed {
                        return Err(invalid("unterminated '{'"));
                    }
                    let (name, spec) = match inner.split_once(':') {
                        Some((n, s)) => (n, Some(s)),
                        None => (inner.as_str(), None),
                    };
                    let field = Field::parse(name)
                        .ok_or_else(|| invalid(&format!("unknown field '{name}'")))?;
                    let width = match spec {
                        Some(s) => Some(
                            s.trim_start_matches('0')
                                .parse::<usize>()
                                .map_err(|_| invalid(&format!("bad format spec '{s}'")))?,
                        ),
                        None => None,
                    };
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field { field, width });
                }
                '}' => return Err(invalid("unmatched '}'")),
                _ => literal.push(ch),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        let mut seen: Vec<Field> = Vec::new();
        for seg in &segments {
            if let Segment::Field { field, .. } = seg {
                if seen.contains(field) {
                    return Err(invalid(&format!("field '{}' used twice", field.group())));
                }
                seen.push(*field);
            }
        }
        for required in [Field::Row, Field::Col, Field::Channel] {
            if !seen.contains(&required) {
                return Err(invalid(&format!("missing '{{{}}}' field", required.group())));
            }
        }

        let mut expr = String::from("^");
        for seg in &segments {
            match seg {
                Segment::Literal(text) => expr.push_str(&regex::escape(text)),
                Segment::Field { field, width } => {
                    let body = match (field, width) {
                        (Field::Channel, _) => ".+?".to_string(),
                        (_, Some(n)) => format!("\\d{{{n}}}"),
                        (_, None) => "\\d+".to_string(),
                    };
                    expr.push_str(&format!("(?P<{}>{})", field.group(), body));
                }
            }
        }
        expr.push('$');

        Ok(Self {
            source: pattern.to_string(),
            segments,
            regex: Regex::new(&expr)?,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match a bare file name against the pattern.
    pub fn match_name(&self, name: &str) -> Option<TileName> {
        let caps = self.regex.captures(name)?;
        let number = |g: &str| caps.name(g).and_then(|m| m.as_str().parse::<usize>().ok());
        Some(TileName {
            row: number("row")?,
            col: number("col")?,
            channel: caps.name("channel")?.as_str().to_string(),
            zstack: number("zstack"),
        })
    }

    /// Render the file name of one tile. Missing z-stack values render as 0.
    pub fn format(&self, row: usize, col: usize, channel: &str, zstack: Option<usize>) -> String {
        let mut out = String::new();
        for seg in &self.segments {
            match seg {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field { field, width } => {
                    let value = match field {
                        Field::Channel => {
                            out.push_str(channel);
                            continue;
                        }
                        Field::Row => row,
                        Field::Col => col,
                        Field::Zstack => zstack.unwrap_or(0),
                    };
                    match width {
                        Some(w) => out.push_str(&format!("{:0width$}", value, width = *w)),
                        None => out.push_str(&value.to_string()),
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_phenix_name() {
        let p = FilePattern::parse("Row1_Well2_{channel}_zstack3_r{row:03}_c{col:03}.tif").unwrap();
        let m = p.match_name("Row1_Well2_Alexa488_zstack3_r004_c012.tif").unwrap();
        assert_eq!(m.row, 4);
        assert_eq!(m.col, 12);
        assert_eq!(m.channel, "Alexa488");
        assert!(p.match_name("Row1_Well2_Alexa488_zstack3_r4_c012.tif").is_none());
        assert!(p.match_name("Row1_Well3_Alexa488_zstack3_r004_c012.tif").is_none());
    }

    #[test]
    fn test_format_round_trips_match() {
        let p = FilePattern::parse("T_{channel}_z{zstack:02}_r{row:03}_c{col:03}.tif").unwrap();
        let name = p.format(2, 7, "DAPI", Some(1));
        assert_eq!(name, "T_DAPI_z01_r002_c007.tif");
        let m = p.match_name(&name).unwrap();
        assert_eq!((m.row, m.col, m.zstack), (2, 7, Some(1)));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let p = FilePattern::parse("a.b+_{channel}_r{row}_c{col}.tif").unwrap();
        assert!(p.match_name("a.b+_DAPI_r1_c2.tif").is_some());
        assert!(p.match_name("axbb_DAPI_r1_c2.tif").is_none());
    }

    #[test]
    fn test_rejects_bad_patterns() {
        assert!(FilePattern::parse("r{row}_c{col}.tif").is_err());
        assert!(FilePattern::parse("{channel}_r{row}_c{col}_{well}.tif").is_err());
        assert!(FilePattern::parse("{channel}_r{row_c{col}.tif").is_err());
        assert!(FilePattern::parse("{channel}_r{row}_c{col}_{row}.tif").is_err());
    }
}
