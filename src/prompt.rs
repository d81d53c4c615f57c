use std::io::{BufRead, Write};

#[derive(Debug, PartialEq, Eq)]
pub enum Reply {
    Line(String),
    Eof,
}

/// Print `question` without a trailing newline and read one line of reply.
pub fn ask(out: &mut dyn Write, input: &mut dyn BufRead, question: &str) -> std::io::Result<Reply> {
    write!(out, "{}", question)?;
    out.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 { return Ok(Reply::Eof); }
    let trimmed = line.strip_suffix('\n').unwrap_or(&line);
    let trimmed = trimmed.strip_suffix('\r').unwrap_or(trimmed);
    Ok(Reply::Line(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_one_line() {
        let mut out = Vec::new();
        let mut input = "yes\nno\n".as_bytes();
        assert_eq!(ask(&mut out, &mut input, "Continue? ").unwrap(), Reply::Line("yes".into()));
        assert_eq!(String::from_utf8(out).unwrap(), "Continue? ");
    }

    #[test]
    fn eof_is_distinct_from_empty_reply() {
        let mut out = Vec::new();
        assert_eq!(ask(&mut out, &mut "".as_bytes(), "?").unwrap(), Reply::Eof);
        assert_eq!(ask(&mut out, &mut "\n".as_bytes(), "?").unwrap(), Reply::Line(String::new()));
    }
}
